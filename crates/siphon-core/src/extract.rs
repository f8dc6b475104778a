//! Navigating fixed key paths inside JSON payloads.

use serde_json::Value;

use crate::error::HarvestError;

/// Follows `path` through nested objects.
///
/// The path is a contract with the remote page's rendering pipeline: a
/// missing key means the upstream schema changed.
///
/// # Errors
///
/// Returns `HarvestError::PayloadShape` naming the first missing key.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use siphon_core::extract::json_path;
///
/// let doc = json!({"__DEFAULT_SCOPE__": {"webapp.user-detail": {"userInfo": {"user": {}}}}});
/// let info = json_path(&doc, &["__DEFAULT_SCOPE__", "webapp.user-detail", "userInfo"]).unwrap();
/// assert!(info.get("user").is_some());
/// ```
pub fn json_path<'a>(value: &'a Value, path: &[&str]) -> Result<&'a Value, HarvestError> {
    let mut current = value;
    for (depth, key) in path.iter().enumerate() {
        current = current.get(*key).ok_or_else(|| {
            HarvestError::PayloadShape(format!(
                "missing key `{}` at `{}`",
                key,
                path[..depth].join(".")
            ))
        })?;
    }
    Ok(current)
}

/// Like [`json_path`] but takes the value out of an owned document.
pub fn take_path(mut value: Value, path: &[&str]) -> Result<Value, HarvestError> {
    for (depth, key) in path.iter().enumerate() {
        value = match value {
            Value::Object(mut map) => map.remove(*key),
            _ => None,
        }
        .ok_or_else(|| {
            HarvestError::PayloadShape(format!(
                "missing key `{}` at `{}`",
                key,
                path[..depth].join(".")
            ))
        })?;
    }
    Ok(value)
}

/// Reads an array at `path`, failing if it is absent or not an array.
pub fn array_at(value: &Value, path: &[&str]) -> Result<Vec<Value>, HarvestError> {
    match json_path(value, path)? {
        Value::Array(items) => Ok(items.clone()),
        other => Err(HarvestError::PayloadShape(format!(
            "expected array at `{}`, found {}",
            path.join("."),
            kind(other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
