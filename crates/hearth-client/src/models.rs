use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Live state of a single entity as reported by `/api/states`.
///
/// Unknown fields (context, user ids, ...) are preserved in `extra` so
/// serializing a state back out is lossless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HassState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HassState {
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or(&self.entity_id)
    }

    pub fn friendly_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .unwrap_or(&self.entity_id)
    }
}

/// Normalized outcome of a `validate_config` round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HassValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl HassValidationResult {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: vec![format!("Validation skipped: {}", reason.into())],
        }
    }
}
