//! Tool operation modules and shared invocation helpers.

pub mod automation;
pub mod blueprint;
pub mod config_validation;
pub mod dashboard;
pub mod helper;
pub mod registries;
pub mod scene;
pub mod script;
pub mod state;
pub mod suggestions;

use serde_json::{json, Map, Value};

use hearth_client::HassError;

use crate::registry::ToolOutcome;

pub(crate) fn string_arg(arguments: &Value, name: &str) -> Option<String> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn bool_arg(arguments: &Value, name: &str) -> bool {
    arguments.get(name).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn index_arg(arguments: &Value, name: &str) -> Option<usize> {
    arguments
        .get(name)
        .and_then(Value::as_u64)
        .map(|value| value as usize)
}

/// Parses a JSON-string argument that must contain an object.
pub(crate) fn parse_object(raw: &str, field: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(entries)) => Ok(entries),
        Ok(_) => Err(format!("{field} must be a JSON object")),
        Err(error) => Err(format!("Invalid JSON in {field}: {error}")),
    }
}

/// Parses a JSON-string argument holding any value.
pub(crate) fn parse_json(raw: &str, field: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|error| format!("Invalid JSON in {field}: {error}"))
}

pub(crate) fn hass_error(error: &HassError) -> ToolOutcome {
    ToolOutcome {
        content: json!({"error": error.to_string(), "kind": error.kind()}),
        is_error: true,
    }
}

pub(crate) fn hass_outcome(result: Result<Value, HassError>) -> ToolOutcome {
    match result {
        Ok(value) => ToolOutcome::ok(value),
        Err(error) => hass_error(&error),
    }
}

/// The caller cannot distinguish which decision route produced this.
pub(crate) fn cancelled(message: &str) -> ToolOutcome {
    ToolOutcome::ok(json!({"status": "cancelled", "message": message}))
}
