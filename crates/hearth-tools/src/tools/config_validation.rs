//! Configuration validation tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    registry::{object_schema, HearthTool, ToolContext, ToolDefinition, ToolOutcome},
    tools::{hass_outcome, parse_object, string_arg},
    yaml::yaml_syntax_report,
};

pub fn config_validation_tools(ctx: &ToolContext) -> Vec<Arc<dyn HearthTool>> {
    vec![
        Arc::new(ValidateAutomationConfigTool { ctx: ctx.clone() }),
        Arc::new(CheckConfigTool { ctx: ctx.clone() }),
        Arc::new(ValidateYamlTool),
    ]
}

struct ValidateAutomationConfigTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ValidateAutomationConfigTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "validate_automation_config".to_string(),
            description: "Validate automation trigger/condition/action sections against Home \
                          Assistant without saving anything."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "config": {"type": "string", "description": "JSON object with optional 'trigger', 'condition', and 'action' arrays"},
                }),
                &["config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(raw) = string_arg(&arguments, "config") else {
            return ToolOutcome::error("validate_automation_config requires 'config'");
        };
        let config = match parse_object(&raw, "config") {
            Ok(config) => config,
            Err(error) => {
                return ToolOutcome::ok(json!({
                    "valid": false,
                    "errors": [error],
                    "warnings": [],
                }));
            }
        };

        let pick = |plural: &str, singular: &str| {
            config
                .get(plural)
                .or_else(|| config.get(singular))
                .cloned()
                .unwrap_or_else(|| json!([]))
        };
        let result = self
            .ctx
            .client
            .validate_automation(
                pick("triggers", "trigger"),
                pick("conditions", "condition"),
                pick("actions", "action"),
            )
            .await;
        match result {
            Ok(validation) => match serde_json::to_value(&validation) {
                Ok(value) => ToolOutcome::ok(value),
                Err(error) => ToolOutcome::error(format!("failed to encode validation: {error}")),
            },
            Err(error) => ToolOutcome::ok(json!({
                "valid": false,
                "errors": [format!("Validation request failed: {error}")],
                "warnings": [],
            })),
        }
    }
}

struct CheckConfigTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for CheckConfigTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "check_config".to_string(),
            description: "Run Home Assistant's full core configuration check (the same one the \
                          UI offers) and return its verdict."
                .to_string(),
            input_schema: object_schema(json!({}), &[]),
        }
    }

    async fn invoke(&self, _arguments: Value) -> ToolOutcome {
        hass_outcome(self.ctx.client.check_config().await)
    }
}

struct ValidateYamlTool;

#[async_trait]
impl HearthTool for ValidateYamlTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "validate_yaml".to_string(),
            description: "Check YAML syntax locally without contacting Home Assistant; returns \
                          the parsed value when valid."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "yaml_text": {"type": "string"},
                }),
                &["yaml_text"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(yaml_text) = arguments
            .get("yaml_text")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return ToolOutcome::error("validate_yaml requires 'yaml_text'");
        };
        ToolOutcome::ok(yaml_syntax_report(&yaml_text))
    }
}
