//! Long-lived engine references.
//!
//! The draw callback, event callback, module cache and module list outlive any
//! single dispatch. They live in the Lua named registry under fixed keys, so
//! they are only reachable with engine access held, and are released either
//! explicitly (re-registration, `clear`) or by `clear_all` at teardown.

use mlua::{FromLua, IntoLua, Lua};

/// A named registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PersistentSlot {
    key: &'static str,
    what: &'static str,
}

pub(crate) const DRAW_CALLBACK: PersistentSlot = PersistentSlot::new("luma.draw_callback", "draw");
pub(crate) const EVENT_CALLBACK: PersistentSlot = PersistentSlot::new("luma.event_callback", "event");
pub(crate) const MODULE_CACHE: PersistentSlot = PersistentSlot::new("luma.module_cache", "module cache");
pub(crate) const MODULE_LIST: PersistentSlot = PersistentSlot::new("luma.module_list", "module list");
pub(crate) const MODULE_LOADING: PersistentSlot = PersistentSlot::new("luma.module_loading", "loading set");
pub(crate) const BOUND_REQUIRE: PersistentSlot = PersistentSlot::new("luma.require", "require");
pub(crate) const MODULE_ENV: PersistentSlot = PersistentSlot::new("luma.module_env", "module env");
pub(crate) const PROCESS: PersistentSlot = PersistentSlot::new("luma.process", "process");

const ALL_SLOTS: [PersistentSlot; 8] = [
    DRAW_CALLBACK,
    EVENT_CALLBACK,
    MODULE_CACHE,
    MODULE_LIST,
    MODULE_LOADING,
    BOUND_REQUIRE,
    MODULE_ENV,
    PROCESS,
];

impl PersistentSlot {
    pub(crate) const fn new(key: &'static str, what: &'static str) -> Self {
        Self { key, what }
    }

    /// Human-readable name for log lines.
    pub(crate) fn what(&self) -> &'static str {
        self.what
    }

    /// Store `value`, releasing whatever the slot held before.
    pub(crate) fn set(&self, lua: &Lua, value: impl IntoLua) -> mlua::Result<()> {
        lua.set_named_registry_value(self.key, value)
    }

    /// Read the slot. An empty slot reads as `None` for optional types.
    pub(crate) fn get<T: FromLua>(&self, lua: &Lua) -> mlua::Result<T> {
        lua.named_registry_value(self.key)
    }

    pub(crate) fn clear(&self, lua: &Lua) -> mlua::Result<()> {
        lua.unset_named_registry_value(self.key)
    }

    /// Release every slot. Called once, before the engine is dropped.
    pub(crate) fn clear_all(lua: &Lua) {
        for slot in ALL_SLOTS {
            if let Err(e) = slot.clear(lua) {
                log::warn!(target: "luma::engine", "failed to release {}: {}", slot.what, e);
            }
        }
    }
}
