//! Deferred script callbacks.

use mlua::Function;

/// A script function waiting to run on a future tick.
///
/// The token owns its reference to the function; the reference is released
/// when the token is consumed by `invoke`, whether or not the call succeeded.
/// Repeating timers keep their own reference in the timer table, so the
/// token that fires them is still single-use.
pub struct CallbackToken {
    callback: Function,
    repeat: bool,
}

impl CallbackToken {
    pub fn new(callback: Function) -> Self {
        Self { callback, repeat: false }
    }

    pub fn repeating(callback: Function) -> Self {
        Self { callback, repeat: true }
    }

    pub fn is_repeat(&self) -> bool {
        self.repeat
    }

    /// A second token for the same function (used when a repeating timer fires).
    pub(crate) fn fire_copy(&self) -> Self {
        Self { callback: self.callback.clone(), repeat: self.repeat }
    }

    /// Call the function with no arguments and release the reference.
    ///
    /// Must be called with engine access held.
    pub fn invoke(self) -> mlua::Result<()> {
        let result = self.callback.call::<()>(());
        drop(self.callback);
        result
    }
}

impl std::fmt::Debug for CallbackToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackToken")
            .field("repeat", &self.repeat)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    #[test]
    fn test_invoke_runs_and_reports_errors() {
        let lua = Lua::new();
        lua.load("hits = 0").exec().unwrap();
        let ok: Function = lua.load("function() hits = hits + 1 end").eval().unwrap();
        let bad: Function = lua.load("function() error('boom') end").eval().unwrap();

        CallbackToken::new(ok).invoke().unwrap();
        let err = CallbackToken::new(bad).invoke().unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(lua.globals().get::<i64>("hits").unwrap(), 1);
    }

    #[test]
    fn test_fire_copy_keeps_flag() {
        let lua = Lua::new();
        let f: Function = lua.load("function() end").eval().unwrap();
        let token = CallbackToken::repeating(f);
        let copy = token.fire_copy();
        assert!(copy.is_repeat());
        assert!(!CallbackToken::new(lua.create_function(|_, ()| Ok(())).unwrap()).is_repeat());
    }
}
