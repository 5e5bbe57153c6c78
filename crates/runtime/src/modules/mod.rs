//! Native module table and loader.
//!
//! Native modules are Lua sources compiled into the binary (or registered by
//! the host before initialization). Scripts reach them only through
//! `process.nativeBinding(name)` or the `require` it backs; there is no path
//! from script to arbitrary files on disk.

mod loader;

pub(crate) use loader::ModuleLoader;

use std::borrow::Cow;

/// Name of the reserved entry module. Never resolvable by name.
pub const BOOTSTRAP_MODULE: &str = "bootstrap";

/// Name of the host-supplied program module, if any.
pub const MAIN_MODULE: &str = "main";

const BOOTSTRAP_SOURCE: &str = include_str!("lua/bootstrap.lua");
const EVENTS_SOURCE: &str = include_str!("lua/events.lua");
const APP_SOURCE: &str = include_str!("lua/app.lua");
const TIMERS_SOURCE: &str = include_str!("lua/timers.lua");

/// One named source in the module table.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeModule {
    pub name: Cow<'static, str>,
    pub source: Cow<'static, str>,
}

impl NativeModule {
    pub fn new(name: impl Into<Cow<'static, str>>, source: impl Into<Cow<'static, str>>) -> Self {
        Self { name: name.into(), source: source.into() }
    }
}

/// Fixed set of modules available to one runtime.
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    modules: Vec<NativeModule>,
}

impl ModuleTable {
    /// No modules at all, not even a bootstrap.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The compiled-in set: `bootstrap`, `events`, `app`, `timers`.
    pub fn builtin() -> Self {
        Self::empty()
            .with_module(BOOTSTRAP_MODULE, BOOTSTRAP_SOURCE)
            .with_module("events", EVENTS_SOURCE)
            .with_module("app", APP_SOURCE)
            .with_module("timers", TIMERS_SOURCE)
    }

    /// Add a module, replacing any existing entry with the same name.
    pub fn with_module(
        mut self,
        name: impl Into<Cow<'static, str>>,
        source: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.insert(NativeModule::new(name, source));
        self
    }

    pub fn insert(&mut self, module: NativeModule) {
        match self.modules.iter_mut().find(|m| m.name == module.name) {
            Some(existing) => *existing = module,
            None => self.modules.push(module),
        }
    }

    /// Look up a resolvable module. The bootstrap entry is never returned.
    pub fn find(&self, name: &str) -> Option<&NativeModule> {
        self.modules
            .iter()
            .find(|m| m.name != BOOTSTRAP_MODULE && m.name == name)
    }

    /// Source of the reserved bootstrap entry.
    pub fn bootstrap(&self) -> Option<&str> {
        self.modules
            .iter()
            .find(|m| m.name == BOOTSTRAP_MODULE)
            .map(|m| m.source.as_ref())
    }

    /// Names in table order, bootstrap included.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
