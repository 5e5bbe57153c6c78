//! Host-supplied script bindings.
//!
//! A `BindingProvider` installs functions or values onto a table. Global
//! providers run once against the globals before bootstrap; capability
//! providers are keyed by native module name and run against that module's
//! environment each time the module body executes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mlua::{Lua, Table};

use crate::host::Host;

/// Installs host functionality into a script table.
pub trait BindingProvider: Send + Sync {
    /// Provider name. For capability providers, the native module it extends.
    fn name(&self) -> &str;

    /// Install bindings onto `target`.
    fn install(&self, lua: &Lua, target: &Table) -> mlua::Result<()>;
}

/// Closure-backed provider.
pub struct FnBindings<F> {
    name: String,
    install: F,
}

impl<F> BindingProvider for FnBindings<F>
where
    F: Fn(&Lua, &Table) -> mlua::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn install(&self, lua: &Lua, target: &Table) -> mlua::Result<()> {
        (self.install)(lua, target)
    }
}

/// Wrap a closure as a shareable provider.
pub fn bindings<F>(name: impl Into<String>, install: F) -> Arc<dyn BindingProvider>
where
    F: Fn(&Lua, &Table) -> mlua::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnBindings { name: name.into(), install })
}

// =============================================================================
// Overlays
// =============================================================================

/// Diagnostic overlay switches. Scripts flip them, the host reads them.
#[derive(Debug, Default)]
pub struct Overlays {
    console: AtomicBool,
    stats: AtomicBool,
    frame_rate: AtomicBool,
}

impl Overlays {
    pub fn new(console: bool, stats: bool, frame_rate: bool) -> Self {
        Self {
            console: AtomicBool::new(console),
            stats: AtomicBool::new(stats),
            frame_rate: AtomicBool::new(frame_rate),
        }
    }

    pub fn console(&self) -> bool {
        self.console.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> bool {
        self.stats.load(Ordering::Relaxed)
    }

    pub fn frame_rate(&self) -> bool {
        self.frame_rate.load(Ordering::Relaxed)
    }

    /// Flip the console overlay, returning the new state.
    pub fn toggle_console(&self) -> bool {
        !self.console.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn toggle_stats(&self) -> bool {
        !self.stats.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn toggle_frame_rate(&self) -> bool {
        !self.frame_rate.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Globals every runtime gets: overlay toggles and `quit()`.
pub(crate) struct DiagnosticBindings {
    pub overlays: Arc<Overlays>,
    pub host: Arc<dyn Host>,
}

impl BindingProvider for DiagnosticBindings {
    fn name(&self) -> &str {
        "diagnostics"
    }

    fn install(&self, lua: &Lua, target: &Table) -> mlua::Result<()> {
        let overlays = self.overlays.clone();
        target.set(
            "toggleConsole",
            lua.create_function(move |_, ()| Ok(overlays.toggle_console()))?,
        )?;

        let overlays = self.overlays.clone();
        target.set(
            "toggleStats",
            lua.create_function(move |_, ()| Ok(overlays.toggle_stats()))?,
        )?;

        let overlays = self.overlays.clone();
        target.set(
            "toggleFrameRate",
            lua.create_function(move |_, ()| Ok(overlays.toggle_frame_rate()))?,
        )?;

        let host = self.host.clone();
        target.set(
            "quit",
            lua.create_function(move |_, ()| {
                host.request_quit();
                Ok(())
            })?,
        )?;
        Ok(())
    }
}
