//! Script output buffer behind `print` and `log`.

use std::sync::Arc;

use mlua::{Lua, MultiValue, Table};
use parking_lot::Mutex;

use crate::bindings::BindingProvider;
use crate::format::lua_value_to_string;

/// Default number of buffered lines before output is dropped.
pub const DEFAULT_CONSOLE_LINES: usize = 5000;

struct ConsoleState {
    lines: Vec<String>,
    truncated: bool,
}

/// Lines written by script, waiting for the host to collect them.
pub struct Console {
    state: Mutex<ConsoleState>,
    max_lines: usize,
}

/// Output collected by `Runtime::take_console`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsoleOutput {
    pub lines: Vec<String>,
    /// Some output was dropped because the buffer was full.
    pub truncated: bool,
}

impl Console {
    pub fn new(max_lines: usize) -> Self {
        Self {
            state: Mutex::new(ConsoleState { lines: Vec::new(), truncated: false }),
            max_lines,
        }
    }

    pub fn push(&self, line: String) {
        log::info!(target: "luma::script", "{}", line);
        let mut state = self.state.lock();
        if state.lines.len() < self.max_lines {
            state.lines.push(line);
        } else if !state.truncated {
            state.truncated = true;
            log::warn!(target: "luma::script", "console buffer full, dropping output");
        }
    }

    /// Take everything buffered so far and reset.
    pub fn take(&self) -> ConsoleOutput {
        let mut state = self.state.lock();
        let lines = std::mem::take(&mut state.lines);
        let truncated = std::mem::replace(&mut state.truncated, false);
        ConsoleOutput { lines, truncated }
    }

    pub fn len(&self) -> usize {
        self.state.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_LINES)
    }
}

/// Installs `print` and `log` writing into a shared console.
pub(crate) struct ConsoleBindings {
    pub console: Arc<Console>,
}

impl BindingProvider for ConsoleBindings {
    fn name(&self) -> &str {
        "console"
    }

    fn install(&self, lua: &Lua, target: &Table) -> mlua::Result<()> {
        let console = self.console.clone();
        let print = lua.create_function(move |_, args: MultiValue| {
            console.push(join_args(args));
            Ok(())
        })?;
        target.set("print", print.clone())?;
        target.set("log", print)?;
        Ok(())
    }
}

fn join_args(args: MultiValue) -> String {
    args.iter()
        .map(lua_value_to_string)
        .collect::<Vec<_>>()
        .join("\t")
}
