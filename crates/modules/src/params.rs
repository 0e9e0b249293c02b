//! Tool parameter access.

use serde_json::Value;

use crate::error::{ModuleError, Result};

/// Non-blank string parameter.
pub(crate) fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str()).map(str::trim).filter(|s| !s.is_empty())
}

/// Required non-blank string parameter.
pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    str_param(params, key).ok_or_else(|| ModuleError::InvalidParams(format!("Missing required parameter: {}", key)))
}

/// Boolean parameter; accepts JSON booleans and `"true"`/`"false"` strings.
pub(crate) fn bool_param(params: &Value, key: &str) -> Option<bool> {
    match params.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => aceflow_config::parse_flag(s),
        _ => None,
    }
}
