//! Facade over both transports.
//!
//! The single object tool operations depend on. Each method picks the right
//! channel (WebSocket command or REST query) and normalizes the result; no
//! business logic lives here.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::{
    error::HassError,
    models::{HassState, HassValidationResult},
    rest::HassRestClient,
    ws::HassWsClient,
};

pub struct HassClient {
    ws: Arc<HassWsClient>,
    rest: HassRestClient,
}

impl HassClient {
    pub fn new(ws: Arc<HassWsClient>, rest: HassRestClient) -> Self {
        Self { ws, rest }
    }

    // -- states (query transport) ------------------------------------------

    pub async fn get_states(&self) -> Result<Vec<HassState>, HassError> {
        let raw = self.rest.get_states().await?;
        serde_json::from_value(raw)
            .map_err(|error| HassError::Connection(format!("unexpected states payload: {error}")))
    }

    pub async fn get_state(&self, entity_id: &str) -> Result<HassState, HassError> {
        let raw = self.rest.get_state(entity_id).await?;
        serde_json::from_value(raw)
            .map_err(|error| HassError::Connection(format!("unexpected state payload: {error}")))
    }

    pub async fn get_history(
        &self,
        entity_id: Option<&str>,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> Result<Value, HassError> {
        self.rest.get_history(entity_id, start_time, end_time).await
    }

    pub async fn get_logbook(
        &self,
        entity_id: Option<&str>,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> Result<Value, HassError> {
        self.rest.get_logbook(entity_id, start_time, end_time).await
    }

    pub async fn get_error_log(&self) -> Result<String, HassError> {
        self.rest.get_error_log().await
    }

    pub async fn render_template(&self, template: &str) -> Result<String, HassError> {
        self.rest.render_template(template).await
    }

    pub async fn check_config(&self) -> Result<Value, HassError> {
        self.rest.check_config().await
    }

    // -- registries (command transport) ------------------------------------

    pub async fn list_devices(&self) -> Result<Value, HassError> {
        self.ws.send_command("config/device_registry/list", Value::Null).await
    }

    pub async fn list_entities(&self) -> Result<Value, HassError> {
        self.ws.send_command("config/entity_registry/list", Value::Null).await
    }

    pub async fn list_areas(&self) -> Result<Value, HassError> {
        self.ws.send_command("config/area_registry/list", Value::Null).await
    }

    pub async fn list_floors(&self) -> Result<Value, HassError> {
        self.ws.send_command("config/floor_registry/list", Value::Null).await
    }

    pub async fn list_labels(&self) -> Result<Value, HassError> {
        self.ws.send_command("config/label_registry/list", Value::Null).await
    }

    // -- validation --------------------------------------------------------

    /// Validates automation sections via the WebSocket `validate_config`
    /// command, flattening per-section verdicts into one result.
    pub async fn validate_automation(
        &self,
        trigger: Value,
        condition: Value,
        action: Value,
    ) -> Result<HassValidationResult, HassError> {
        let payload = json!({
            "trigger": trigger,
            "condition": condition,
            "action": action,
        });
        let raw = self.ws.send_command("validate_config", payload).await?;
        Ok(normalize_validation(&raw))
    }

    // -- config store CRUD (query transport) -------------------------------

    pub async fn get_automation_config(&self, automation_id: &str) -> Result<Value, HassError> {
        self.rest.get_config_entry("automation", automation_id).await
    }

    pub async fn save_automation_config(
        &self,
        automation_id: &str,
        config: &Value,
    ) -> Result<(), HassError> {
        self.rest.save_config_entry("automation", automation_id, config).await?;
        Ok(())
    }

    pub async fn delete_automation_config(&self, automation_id: &str) -> Result<(), HassError> {
        self.rest.delete_config_entry("automation", automation_id).await?;
        Ok(())
    }

    pub async fn get_script_config(&self, script_id: &str) -> Result<Value, HassError> {
        self.rest.get_config_entry("script", script_id).await
    }

    pub async fn save_script_config(&self, script_id: &str, config: &Value) -> Result<(), HassError> {
        self.rest.save_config_entry("script", script_id, config).await?;
        Ok(())
    }

    pub async fn delete_script_config(&self, script_id: &str) -> Result<(), HassError> {
        self.rest.delete_config_entry("script", script_id).await?;
        Ok(())
    }

    pub async fn get_scene_config(&self, scene_id: &str) -> Result<Value, HassError> {
        self.rest.get_config_entry("scene", scene_id).await
    }

    pub async fn save_scene_config(&self, scene_id: &str, config: &Value) -> Result<(), HassError> {
        self.rest.save_config_entry("scene", scene_id, config).await?;
        Ok(())
    }

    pub async fn delete_scene_config(&self, scene_id: &str) -> Result<(), HassError> {
        self.rest.delete_config_entry("scene", scene_id).await?;
        Ok(())
    }

    // -- services ----------------------------------------------------------

    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Option<&Value>,
    ) -> Result<Value, HassError> {
        self.rest.call_service(domain, service, data).await
    }

    /// Reloads an integration domain so a saved config takes effect.
    pub async fn reload_domain(&self, domain: &str) -> Result<Value, HassError> {
        self.ws
            .send_command(
                "call_service",
                json!({"domain": domain, "service": "reload"}),
            )
            .await
    }

    // -- dashboards (command transport) ------------------------------------

    pub async fn list_dashboards(&self) -> Result<Value, HassError> {
        self.ws.send_command("lovelace/dashboards/list", Value::Null).await
    }

    pub async fn get_dashboard_config(&self, url_path: Option<&str>) -> Result<Value, HassError> {
        let payload = match url_path {
            Some(url_path) => json!({"url_path": url_path}),
            None => Value::Null,
        };
        self.ws.send_command("lovelace/config", payload).await
    }

    pub async fn save_dashboard_config(
        &self,
        config: &Value,
        url_path: Option<&str>,
    ) -> Result<(), HassError> {
        let mut payload = Map::new();
        payload.insert("config".to_string(), config.clone());
        if let Some(url_path) = url_path {
            payload.insert("url_path".to_string(), json!(url_path));
        }
        self.ws
            .send_command("lovelace/config/save", Value::Object(payload))
            .await?;
        Ok(())
    }

    // -- blueprints (command transport) ------------------------------------

    pub async fn list_blueprints(&self, domain: &str) -> Result<Value, HassError> {
        self.ws
            .send_command("blueprint/list", json!({"domain": domain}))
            .await
    }

    pub async fn get_blueprint(&self, domain: &str, path: &str) -> Result<Value, HassError> {
        self.ws
            .send_command("blueprint/get", json!({"domain": domain, "path": path}))
            .await
    }

    pub async fn import_blueprint(&self, url: &str) -> Result<Value, HassError> {
        self.ws.send_command("blueprint/import", json!({"url": url})).await
    }

    pub async fn save_blueprint(
        &self,
        domain: &str,
        path: &str,
        yaml: &str,
        source_url: &str,
    ) -> Result<Value, HassError> {
        self.ws
            .send_command(
                "blueprint/save",
                json!({
                    "domain": domain,
                    "path": path,
                    "yaml": yaml,
                    "source_url": source_url,
                }),
            )
            .await
    }

    // -- helpers (command transport) ---------------------------------------

    pub async fn create_helper(
        &self,
        helper_type: &str,
        config: Map<String, Value>,
    ) -> Result<Value, HassError> {
        self.ws
            .send_command(&format!("{helper_type}/create"), Value::Object(config))
            .await
    }

    pub async fn update_helper(
        &self,
        helper_type: &str,
        entity_id: &str,
        changes: Map<String, Value>,
    ) -> Result<Value, HassError> {
        let mut payload = Map::new();
        payload.insert(format!("{helper_type}_id"), json!(entity_id));
        for (key, value) in changes {
            payload.insert(key, value);
        }
        self.ws
            .send_command(&format!("{helper_type}/update"), Value::Object(payload))
            .await
    }

    pub async fn delete_helper(&self, helper_type: &str, entity_id: &str) -> Result<Value, HassError> {
        let mut payload = Map::new();
        payload.insert(format!("{helper_type}_id"), json!(entity_id));
        self.ws
            .send_command(&format!("{helper_type}/delete"), Value::Object(payload))
            .await
    }
}

/// Flattens the per-section `validate_config` response into a single verdict.
fn normalize_validation(raw: &Value) -> HassValidationResult {
    let mut errors = Vec::new();
    for key in ["trigger", "condition", "action"] {
        match raw.get(key) {
            Some(Value::Object(section)) => {
                if section.get("valid").and_then(Value::as_bool) == Some(false) {
                    let message = section
                        .get("error")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Invalid {key}"));
                    errors.push(format!("{key}: {message}"));
                }
            }
            Some(Value::String(message)) if !message.is_empty() => {
                errors.push(format!("{key}: {message}"));
            }
            _ => {}
        }
    }
    HassValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_validation;
    use serde_json::json;

    #[test]
    fn validation_with_all_sections_valid_passes() {
        let result = normalize_validation(&json!({
            "trigger": {"valid": true},
            "condition": {"valid": true},
            "action": {"valid": true},
        }));
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn invalid_sections_are_collected_with_their_names() {
        let result = normalize_validation(&json!({
            "trigger": {"valid": false, "error": "Invalid trigger platform"},
            "condition": {"valid": true},
            "action": "expected a list of actions",
        }));
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![
                "trigger: Invalid trigger platform".to_string(),
                "action: expected a list of actions".to_string(),
            ]
        );
    }

    #[test]
    fn missing_sections_are_not_errors() {
        let result = normalize_validation(&json!({}));
        assert!(result.valid);
    }
}
