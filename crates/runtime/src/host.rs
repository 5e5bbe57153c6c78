//! Hooks the host shell exposes to the runtime.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callbacks into the application shell.
///
/// Called from whichever thread holds engine access, so implementations must
/// not block on the runtime.
pub trait Host: Send + Sync {
    /// Begin the quit procedure (close the window, stop the frame loop).
    fn request_quit(&self);
}

/// Host that only records quit requests. Used by headless shells and tests.
#[derive(Default, Clone)]
pub struct QuitFlag {
    quit: Arc<AtomicBool>,
}

impl QuitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}

impl Host for QuitFlag {
    fn request_quit(&self) {
        log::info!(target: "luma::host", "quit requested");
        self.quit.store(true, Ordering::SeqCst);
    }
}

/// Process facts exposed to scripts as `process.argv`, `process.cwd`,
/// `process.execPath`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessInfo {
    pub argv: Vec<String>,
    pub cwd: String,
    pub exec_path: String,
}

impl ProcessInfo {
    /// Collect from the current process. Missing values become empty strings.
    pub fn from_env() -> Self {
        Self {
            argv: env::args().collect(),
            cwd: env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            exec_path: env::current_exe()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    pub fn with_argv(mut self, argv: Vec<String>) -> Self {
        self.argv = argv;
        self
    }
}
