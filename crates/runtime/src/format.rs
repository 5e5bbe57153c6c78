//! Display helpers for Lua values and errors.

use mlua::Value;

/// Render a value the way the console and `evaluate` show it.
///
/// Whole floats print without a fraction so `7.0` and `7` read the same.
/// Reference types print as their type name.
pub fn lua_value_to_string(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => format_number(*n),
        Value::String(s) => s.to_string_lossy(),
        Value::Error(e) => format!("error: {}", format_lua_error(e)),
        other => other.type_name().to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

/// Format a Lua error for logs and host-facing messages.
///
/// Callback errors are unwrapped to their cause, and chunk locations are
/// shortened to the runtime's chunk names (`native:app:3:`, `eval:1:`).
pub fn format_lua_error(error: &mlua::Error) -> String {
    match error {
        mlua::Error::SyntaxError { message, .. } => shorten_chunk_names(message),
        mlua::Error::RuntimeError(msg) => shorten_chunk_names(msg),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        _ => shorten_chunk_names(&error.to_string()),
    }
}

/// Rewrite every `[string "name"]` chunk reference to plain `name`.
fn shorten_chunk_names(message: &str) -> String {
    const OPEN: &str = "[string \"";
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let name_start = &rest[start + OPEN.len()..];
        match name_start.find("\"]") {
            Some(end) => {
                out.push_str(&name_start[..end]);
                rest = &name_start[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
