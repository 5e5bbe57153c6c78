use std::collections::HashMap;
use std::sync::Arc;

use mlua::{Function, Lua, Table, Value};

use super::{ModuleTable, NativeModule};
use crate::bindings::BindingProvider;
use crate::persistent::{BOUND_REQUIRE, MODULE_CACHE, MODULE_ENV, MODULE_LIST, MODULE_LOADING};

/// Builds a private module environment that falls back to the globals.
const MODULE_ENV_FACTORY: &str = r#"
local setmetatable, G = setmetatable, _G
return function(env)
  return setmetatable(env, { __index = G })
end
"#;

/// Resolves native modules by name, caching successful loads.
///
/// The loader itself holds no engine references; cache, list and the bound
/// `require` live in registry slots and are only touched with engine access.
pub(crate) struct ModuleLoader {
    table: ModuleTable,
    capabilities: HashMap<String, Arc<dyn BindingProvider>>,
}

/// Script-visible pieces created by `install`.
pub(crate) struct LoaderHandles {
    pub cache: Table,
    pub list: Table,
    pub native_binding: Function,
}

impl ModuleLoader {
    pub fn new(table: ModuleTable, capabilities: Vec<Arc<dyn BindingProvider>>) -> Self {
        let capabilities = capabilities
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Self { table, capabilities }
    }

    pub fn table(&self) -> &ModuleTable {
        &self.table
    }

    /// Create the cache, module list, bound `require` and `nativeBinding`.
    pub fn install(self: &Arc<Self>, lua: &Lua) -> mlua::Result<LoaderHandles> {
        let cache = lua.create_table()?;
        let list = lua.create_table()?;
        MODULE_CACHE.set(lua, cache.clone())?;
        MODULE_LIST.set(lua, list.clone())?;
        MODULE_LOADING.set(lua, lua.create_table()?)?;

        let env_factory: Function = lua.load(MODULE_ENV_FACTORY).set_name("luma:module_env").call(())?;
        MODULE_ENV.set(lua, env_factory)?;

        let loader = Arc::clone(self);
        let require = lua.create_function(move |lua, name: Value| {
            let name = module_name(&name)?;
            loader.resolve(lua, &name, false)
        })?;
        BOUND_REQUIRE.set(lua, require)?;

        let loader = Arc::clone(self);
        let native_binding = lua.create_function(move |lua, (name, check_only): (Value, Value)| {
            let name = module_name(&name)?;
            let check_only = !matches!(check_only, Value::Nil | Value::Boolean(false));
            loader.resolve(lua, &name, check_only)
        })?;

        Ok(LoaderHandles { cache, list, native_binding })
    }

    /// Resolve `name` to its exports, or with `check_only` to whether it exists.
    pub fn resolve(&self, lua: &Lua, name: &str, check_only: bool) -> mlua::Result<Value> {
        if !check_only {
            let cache: Table = MODULE_CACHE.get(lua)?;
            let cached: Value = cache.raw_get(name)?;
            if !cached.is_nil() {
                return Ok(cached);
            }
        }

        let module = self.table.find(name);

        if check_only {
            let found = module.is_some();
            if found {
                append_module(lua, name)?;
            }
            return Ok(Value::Boolean(found));
        }

        let module = module.ok_or_else(|| {
            mlua::Error::RuntimeError(format!("no such module '{}'", name))
        })?;

        let loading: Table = MODULE_LOADING.get(lua)?;
        if loading.raw_get::<Option<bool>>(name)?.unwrap_or(false) {
            return Err(mlua::Error::RuntimeError(format!(
                "circular require of module '{}'",
                name
            )));
        }

        loading.raw_set(name, true)?;
        let result = self.execute(lua, module);
        loading.raw_set(name, Value::Nil)?;

        match result {
            Ok(exports) => {
                let cache: Table = MODULE_CACHE.get(lua)?;
                cache.raw_set(name, exports.clone())?;
                append_module(lua, name)?;
                log::debug!(target: "luma::modules", "loaded native module '{}'", name);
                Ok(exports)
            }
            Err(e) => {
                log::debug!(target: "luma::modules", "native module '{}' failed: {}", name, e);
                Err(e)
            }
        }
    }

    fn execute(&self, lua: &Lua, module: &NativeModule) -> mlua::Result<Value> {
        let wrapped = format!(
            "return function(exports, require, module)\n{}\nend",
            module.source
        );
        let mut chunk = lua.load(wrapped).set_name(format!("native:{}", module.name));

        if let Some(provider) = self.capabilities.get(module.name.as_ref()) {
            let env = lua.create_table()?;
            provider.install(lua, &env)?;
            let make_env: Function = MODULE_ENV.get(lua)?;
            let env: Table = make_env.call(env)?;
            chunk = chunk.set_environment(env);
        }

        let body: Function = chunk.call(())?;

        let exports = lua.create_table()?;
        let module_obj = lua.create_table()?;
        module_obj.raw_set("id", module.name.as_ref())?;
        module_obj.raw_set("exports", exports.clone())?;
        let require: Function = BOUND_REQUIRE.get(lua)?;

        body.call::<()>((exports.clone(), require, module_obj.clone()))?;

        let replaced: Value = module_obj.raw_get("exports")?;
        if replaced.is_nil() {
            Ok(Value::Table(exports))
        } else {
            Ok(replaced)
        }
    }
}

fn module_name(value: &Value) -> mlua::Result<String> {
    match value {
        Value::String(s) => Ok(s.to_string_lossy().into()),
        Value::Nil => Err(mlua::Error::RuntimeError(
            "missing required argument: module name".to_string(),
        )),
        other => Err(mlua::Error::RuntimeError(format!(
            "module name must be a string, got {}",
            other.type_name()
        ))),
    }
}

fn append_module(lua: &Lua, name: &str) -> mlua::Result<()> {
    let list: Table = MODULE_LIST.get(lua)?;
    list.raw_set(list.raw_len() + 1, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::bindings;

    fn setup(table: ModuleTable, caps: Vec<Arc<dyn BindingProvider>>) -> (Lua, Arc<ModuleLoader>, LoaderHandles) {
        let lua = Lua::new();
        let loader = Arc::new(ModuleLoader::new(table, caps));
        let handles = loader.install(&lua).unwrap();
        lua.globals().set("nativeBinding", handles.native_binding.clone()).unwrap();
        (lua, loader, handles)
    }

    fn counting_table() -> ModuleTable {
        ModuleTable::empty()
            .with_module("bootstrap", "return function() end")
            .with_module("counter", "loads = (loads or 0) + 1\nexports.value = loads")
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let (lua, loader, handles) = setup(counting_table(), vec![]);
        for _ in 0..5 {
            loader.resolve(&lua, "counter", false).unwrap();
        }
        assert_eq!(lua.globals().get::<i64>("loads").unwrap(), 1);
        assert_eq!(handles.list.raw_len(), 1);
        let same: bool = lua
            .load("return nativeBinding('counter') == nativeBinding('counter')")
            .eval()
            .unwrap();
        assert!(same);
    }

    #[test]
    fn test_check_only_never_loads() {
        let (lua, loader, handles) = setup(counting_table(), vec![]);
        assert_eq!(loader.resolve(&lua, "counter", true).unwrap(), Value::Boolean(true));
        assert_eq!(loader.resolve(&lua, "missing", true).unwrap(), Value::Boolean(false));

        assert!(lua.globals().get::<Option<i64>>("loads").unwrap().is_none());
        assert!(handles.cache.raw_get::<Value>("counter").unwrap().is_nil());
        // Found names still show up in the module list.
        assert_eq!(handles.list.raw_len(), 1);
        assert_eq!(handles.list.raw_get::<String>(1).unwrap(), "counter");
    }

    #[test]
    fn test_unknown_and_bootstrap_not_found() {
        let (lua, loader, _) = setup(counting_table(), vec![]);
        let err = loader.resolve(&lua, "nope", false).unwrap_err();
        assert!(err.to_string().contains("no such module 'nope'"));
        assert!(loader.resolve(&lua, "bootstrap", false).is_err());
        assert_eq!(loader.resolve(&lua, "bootstrap", true).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_failed_load_not_cached_and_retried() {
        let table = ModuleTable::empty().with_module(
            "flaky",
            "attempts = (attempts or 0) + 1\nif attempts == 1 then error('first try fails') end\nexports.ok = true",
        );
        let (lua, loader, handles) = setup(table, vec![]);

        let err = loader.resolve(&lua, "flaky", false).unwrap_err();
        assert!(err.to_string().contains("first try fails"));
        assert!(handles.cache.raw_get::<Value>("flaky").unwrap().is_nil());
        assert_eq!(handles.list.raw_len(), 0);

        let exports = loader.resolve(&lua, "flaky", false).unwrap();
        assert!(exports.as_table().unwrap().get::<bool>("ok").unwrap());
        assert_eq!(lua.globals().get::<i64>("attempts").unwrap(), 2);
    }

    #[test]
    fn test_module_exports_replacement() {
        let table = ModuleTable::empty().with_module("answer", "module.exports = 42");
        let (lua, loader, _) = setup(table, vec![]);
        assert_eq!(loader.resolve(&lua, "answer", false).unwrap().as_i64(), Some(42));
        assert_eq!(loader.resolve(&lua, "answer", false).unwrap().as_i64(), Some(42));
    }

    #[test]
    fn test_nested_require_and_circular() {
        let table = ModuleTable::empty()
            .with_module("a", "exports.b = require('b').name")
            .with_module("b", "exports.name = 'bee'")
            .with_module("loop1", "require('loop2')")
            .with_module("loop2", "require('loop1')");
        let (lua, loader, _) = setup(table, vec![]);

        let a = loader.resolve(&lua, "a", false).unwrap();
        assert_eq!(a.as_table().unwrap().get::<String>("b").unwrap(), "bee");

        let err = loader.resolve(&lua, "loop1", false).unwrap_err();
        assert!(err.to_string().contains("circular require of module 'loop1'"));
        // Nothing half-loaded is left in the loading set.
        let err = loader.resolve(&lua, "loop1", false).unwrap_err();
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn test_capabilities_visible_to_module_only() {
        let table = ModuleTable::empty().with_module(
            "app",
            "exports.ratio = getAspectRatio()\nexports.has_print = print ~= nil",
        );
        let caps = vec![bindings("app", |lua, target| {
            target.set("getAspectRatio", lua.create_function(|_, ()| Ok(2.0))?)
        })];
        let (lua, loader, _) = setup(table, caps);

        let exports = loader.resolve(&lua, "app", false).unwrap();
        let exports = exports.as_table().unwrap();
        assert_eq!(exports.get::<f64>("ratio").unwrap(), 2.0);
        assert!(exports.get::<bool>("has_print").unwrap());
        assert!(lua.globals().get::<Value>("getAspectRatio").unwrap().is_nil());
    }

    #[test]
    fn test_missing_name_is_script_error() {
        let (lua, _, _) = setup(counting_table(), vec![]);
        let err = lua.load("nativeBinding()").exec().unwrap_err();
        assert!(err.to_string().contains("missing required argument"));
        let err = lua.load("nativeBinding(12)").exec().unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }
}
