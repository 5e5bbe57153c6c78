// Scripted input: timed host events read from a JSON file and replayed from
// their own thread, standing in for a window system's input callbacks.
//
// [
//   { "at": 0,   "event": "resize", "width": 1280, "height": 720 },
//   { "at": 100, "event": "cursor", "x": 10, "y": 20 },
//   { "at": 150, "event": "keydown", "code": 65, "char": "a" },
//   { "at": 900, "event": "shutdown" }
// ]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use luma_runtime::{Event, EventSender};
use serde::Deserialize;

use crate::shell::Shell;

/// Longest single sleep, so a stop request is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InputKind {
    Resize { width: u32, height: u32 },
    Cursor { x: f64, y: f64 },
    MouseDown,
    MouseUp,
    KeyDown {
        code: u32,
        #[serde(rename = "char", default)]
        ch: Option<char>,
    },
    KeyUp {
        code: u32,
        #[serde(rename = "char", default)]
        ch: Option<char>,
    },
    FileDrop { paths: Vec<String> },
    Shutdown,
}

/// One input, `at` milliseconds after the run starts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimedInput {
    #[serde(default)]
    pub at: u64,
    #[serde(flatten)]
    pub kind: InputKind,
}

impl InputKind {
    /// Runtime event for this input. Cursor moves stay on the host side.
    pub fn to_event(&self) -> Option<Event> {
        Some(match self {
            Self::Resize { width, height } => Event::Resize { width: *width, height: *height },
            Self::Cursor { .. } => return None,
            Self::MouseDown => Event::MouseDown,
            Self::MouseUp => Event::MouseUp,
            Self::KeyDown { code, ch } => Event::KeyDown { code: *code, ch: *ch },
            Self::KeyUp { code, ch } => Event::KeyUp { code: *code, ch: *ch },
            Self::FileDrop { paths } => Event::FileDrop(paths.clone()),
            Self::Shutdown => Event::ShutdownRequest,
        })
    }
}

/// Parse an input script, sorted by time (stable for equal times).
pub fn parse_inputs(json: &str) -> Result<Vec<TimedInput>, serde_json::Error> {
    let mut inputs: Vec<TimedInput> = serde_json::from_str(json)?;
    inputs.sort_by_key(|i| i.at);
    Ok(inputs)
}

pub fn load_inputs(path: &Path) -> Result<Vec<TimedInput>, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    parse_inputs(&json).map_err(|e| format!("invalid input file {}: {}", path.display(), e))
}

/// Replay `inputs` against `sender` until done or `stop` is set.
pub fn spawn_replay(
    inputs: Vec<TimedInput>,
    sender: EventSender,
    shell: Arc<Shell>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<usize>> {
    thread::Builder::new()
        .name("luma-input".to_string())
        .spawn(move || replay(&inputs, &sender, &shell, &stop, Instant::now()))
}

fn replay(inputs: &[TimedInput], sender: &EventSender, shell: &Shell, stop: &AtomicBool, start: Instant) -> usize {
    let mut sent = 0;
    for input in inputs {
        let due = start + Duration::from_millis(input.at);
        loop {
            if stop.load(Ordering::SeqCst) {
                return sent;
            }
            let now = Instant::now();
            if now >= due {
                break;
            }
            thread::sleep((due - now).min(SLEEP_SLICE));
        }

        match &input.kind {
            InputKind::Resize { width, height } => shell.resize(*width, *height),
            InputKind::Cursor { x, y } => shell.move_cursor(*x, *y),
            _ => {}
        }
        let Some(event) = input.kind.to_event() else {
            continue;
        };
        log::debug!("input +{}ms: {}", input.at, event.tag());
        if let Err(e) = sender.send(event) {
            log::debug!("input replay stopped: {}", e);
            return sent;
        }
        sent += 1;
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_sort() {
        let inputs = parse_inputs(
            r#"[
                { "at": 50, "event": "mouseup" },
                { "at": 10, "event": "keydown", "code": 65, "char": "a" },
                { "event": "resize", "width": 640, "height": 480 },
                { "at": 10, "event": "filedrop", "paths": ["/tmp/a.png"] }
            ]"#,
        )
        .unwrap();
        assert_eq!(inputs[0].kind, InputKind::Resize { width: 640, height: 480 });
        assert_eq!(inputs[1].kind, InputKind::KeyDown { code: 65, ch: Some('a') });
        assert!(matches!(inputs[2].kind, InputKind::FileDrop { .. }));
        assert_eq!(inputs[3].at, 50);
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(parse_inputs(r#"[{ "event": "teleport" }]"#).is_err());
    }

    #[test]
    fn test_event_mapping() {
        assert_eq!(InputKind::Shutdown.to_event(), Some(Event::ShutdownRequest));
        assert_eq!(InputKind::Cursor { x: 1.0, y: 2.0 }.to_event(), None);
        assert_eq!(
            InputKind::KeyUp { code: 16, ch: None }.to_event(),
            Some(Event::KeyUp { code: 16, ch: None })
        );
    }
}
