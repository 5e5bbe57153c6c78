//! Host input/lifecycle events and the handle host threads use to send them.
//!
//! Argument shapes passed to the script event callback are part of the
//! script contract:
//!
//! | Event      | Callback arguments             |
//! |------------|--------------------------------|
//! | Resize     | `"resize", width, height`      |
//! | MouseDown  | `"mousedown"`                  |
//! | MouseUp    | `"mouseup"`                    |
//! | KeyDown    | `"keydown", code, char`        |
//! | KeyUp      | `"keyup", code, char`          |
//! | FileDrop   | `"filedrop", {path, ...}`      |
//!
//! `ShutdownRequest` is never forwarded; it runs the host quit hook.

use std::sync::Arc;

use mlua::{IntoLuaMulti, Lua, MultiValue};

use crate::error::RuntimeError;
use crate::queue::BoundedQueue;

/// An event produced by the host shell.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Resize { width: u32, height: u32 },
    MouseDown,
    MouseUp,
    KeyDown { code: u32, ch: Option<char> },
    KeyUp { code: u32, ch: Option<char> },
    FileDrop(Vec<String>),
    ShutdownRequest,
}

impl Event {
    /// Type tag passed as the first callback argument.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "resize",
            Self::MouseDown => "mousedown",
            Self::MouseUp => "mouseup",
            Self::KeyDown { .. } => "keydown",
            Self::KeyUp { .. } => "keyup",
            Self::FileDrop(_) => "filedrop",
            Self::ShutdownRequest => "shutdown",
        }
    }

    /// Build the positional callback arguments. `None` for events that are
    /// handled by the host instead of script.
    pub(crate) fn to_args(&self, lua: &Lua) -> mlua::Result<Option<MultiValue>> {
        let tag = self.tag();
        let args = match self {
            Self::Resize { width, height } => (tag, *width, *height).into_lua_multi(lua)?,
            Self::MouseDown | Self::MouseUp => tag.into_lua_multi(lua)?,
            Self::KeyDown { code, ch } | Self::KeyUp { code, ch } => {
                (tag, *code, ch.map(|c| c.to_string())).into_lua_multi(lua)?
            }
            Self::FileDrop(paths) => {
                let list = lua.create_sequence_from(paths.iter().map(|p| p.as_str()))?;
                (tag, list).into_lua_multi(lua)?
            }
            Self::ShutdownRequest => return Ok(None),
        };
        Ok(Some(args))
    }
}

pub type EventQueue = BoundedQueue<Event>;

/// Cloneable handle for host threads. Sending blocks while the event queue is
/// full and fails once the runtime is shutting down.
#[derive(Clone)]
pub struct EventSender {
    queue: Arc<EventQueue>,
}

impl EventSender {
    pub(crate) fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    pub fn send(&self, event: Event) -> Result<(), RuntimeError> {
        self.queue.push(event).map_err(RuntimeError::from)
    }

    pub fn resize(&self, width: u32, height: u32) -> Result<(), RuntimeError> {
        self.send(Event::Resize { width, height })
    }

    pub fn mouse_down(&self) -> Result<(), RuntimeError> {
        self.send(Event::MouseDown)
    }

    pub fn mouse_up(&self) -> Result<(), RuntimeError> {
        self.send(Event::MouseUp)
    }

    pub fn key_down(&self, code: u32, ch: Option<char>) -> Result<(), RuntimeError> {
        self.send(Event::KeyDown { code, ch })
    }

    pub fn key_up(&self, code: u32, ch: Option<char>) -> Result<(), RuntimeError> {
        self.send(Event::KeyUp { code, ch })
    }

    pub fn file_drop(&self, paths: Vec<String>) -> Result<(), RuntimeError> {
        self.send(Event::FileDrop(paths))
    }

    pub fn request_shutdown(&self) -> Result<(), RuntimeError> {
        self.send(Event::ShutdownRequest)
    }
}
