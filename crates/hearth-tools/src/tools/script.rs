//! Script CRUD tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use hearth_client::HassValidationResult;

use crate::{
    confirm::{confirm_change, ChangeAction, ChangePreview},
    registry::{object_schema, HearthTool, ToolContext, ToolDefinition, ToolOutcome},
    tools::{bool_arg, cancelled, hass_error, parse_object, string_arg},
};

pub fn script_tools(ctx: &ToolContext) -> Vec<Arc<dyn HearthTool>> {
    vec![
        Arc::new(ListScriptsTool { ctx: ctx.clone() }),
        Arc::new(GetScriptTool { ctx: ctx.clone() }),
        Arc::new(CreateScriptTool { ctx: ctx.clone() }),
        Arc::new(UpdateScriptTool { ctx: ctx.clone() }),
        Arc::new(DeleteScriptTool { ctx: ctx.clone() }),
    ]
}

/// Script object ids are lowercase slugs starting with a letter.
fn valid_object_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Validates a script's action sequence; a validator failure is reported as
/// a finding, not a hard error.
async fn validate_sequence(ctx: &ToolContext, sequence: Value) -> HassValidationResult {
    match ctx
        .client
        .validate_automation(json!([]), json!([]), sequence)
        .await
    {
        Ok(validation) => validation,
        Err(error) => HassValidationResult {
            valid: false,
            errors: vec![error.to_string()],
            warnings: Vec::new(),
        },
    }
}

struct ListScriptsTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListScriptsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_scripts".to_string(),
            description: "List all scripts with entity id, friendly name, state, and last \
                          trigger time."
                .to_string(),
            input_schema: object_schema(json!({}), &[]),
        }
    }

    async fn invoke(&self, _arguments: Value) -> ToolOutcome {
        let states = match self.ctx.client.get_states().await {
            Ok(states) => states,
            Err(error) => return hass_error(&error),
        };
        let scripts: Vec<Value> = states
            .iter()
            .filter(|state| state.domain() == "script")
            .map(|state| {
                json!({
                    "entity_id": state.entity_id,
                    "friendly_name": state.friendly_name(),
                    "state": state.state,
                    "last_triggered": state.attributes.get("last_triggered"),
                })
            })
            .collect();
        ToolOutcome::ok(Value::Array(scripts))
    }
}

struct GetScriptTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetScriptTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_script".to_string(),
            description: "Get the full configuration of a script by object id (the part after \
                          'script.')."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "script_id": {"type": "string", "description": "e.g. 'morning_routine'"},
                }),
                &["script_id"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(script_id) = string_arg(&arguments, "script_id") else {
            return ToolOutcome::error("get_script requires 'script_id'");
        };
        match self.ctx.client.get_script_config(&script_id).await {
            Ok(config) => ToolOutcome::ok(config),
            Err(error) => hass_error(&error),
        }
    }
}

struct CreateScriptTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for CreateScriptTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "create_script".to_string(),
            description: "Create a new script. The config must include 'sequence'; it is \
                          validated and previewed for confirmation before saving."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "script_id": {"type": "string", "description": "Object id: lowercase letters, digits, underscores; starts with a letter"},
                    "config": {"type": "string", "description": "Script config as a JSON string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["script_id", "config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(script_id) = string_arg(&arguments, "script_id") else {
            return ToolOutcome::error("create_script requires 'script_id'");
        };
        let Some(raw) = string_arg(&arguments, "config") else {
            return ToolOutcome::error("create_script requires 'config'");
        };
        if !valid_object_id(&script_id) {
            return ToolOutcome::error(format!(
                "Invalid script_id '{script_id}'. Must contain only lowercase letters, digits, \
                 and underscores, and must start with a letter."
            ));
        }
        let config = match parse_object(&raw, "config") {
            Ok(config) => config,
            Err(error) => return ToolOutcome::error(error),
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let sequence = config.get("sequence").cloned().unwrap_or_else(|| json!([]));
        let validation = validate_sequence(&self.ctx, sequence).await;

        let preview = ChangePreview::new(
            ChangeAction::Create,
            "script",
            &script_id,
            Value::Object(config.clone()),
        )
        .with_validation(Some(validation));
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Script creation cancelled by user.");
        }

        let body = Value::Object(config);
        if let Err(error) = self.ctx.client.save_script_config(&script_id, &body).await {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain("script").await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "created",
            "script_id": script_id,
            "entity_id": format!("script.{script_id}"),
        }))
    }
}

struct UpdateScriptTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for UpdateScriptTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "update_script".to_string(),
            description: "Replace a script's entire configuration. The new config is validated \
                          and previewed for confirmation before saving."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "script_id": {"type": "string"},
                    "config": {"type": "string", "description": "Full replacement config as a JSON string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["script_id", "config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(script_id) = string_arg(&arguments, "script_id") else {
            return ToolOutcome::error("update_script requires 'script_id'");
        };
        let Some(raw) = string_arg(&arguments, "config") else {
            return ToolOutcome::error("update_script requires 'config'");
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        // Verify the script exists before accepting a replacement.
        if let Err(error) = self.ctx.client.get_script_config(&script_id).await {
            return hass_error(&error);
        }

        let config = match parse_object(&raw, "config") {
            Ok(config) => config,
            Err(error) => return ToolOutcome::error(error),
        };
        let sequence = config.get("sequence").cloned().unwrap_or_else(|| json!([]));
        let validation = validate_sequence(&self.ctx, sequence).await;

        let preview = ChangePreview::new(
            ChangeAction::Update,
            "script",
            &script_id,
            Value::Object(config.clone()),
        )
        .with_validation(Some(validation));
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Script update cancelled by user.");
        }

        let body = Value::Object(config);
        if let Err(error) = self.ctx.client.save_script_config(&script_id, &body).await {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain("script").await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "updated",
            "script_id": script_id,
            "entity_id": format!("script.{script_id}"),
        }))
    }
}

struct DeleteScriptTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for DeleteScriptTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "delete_script".to_string(),
            description: "Delete a script. The current configuration is shown for review before \
                          the irreversible delete."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "script_id": {"type": "string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["script_id"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(script_id) = string_arg(&arguments, "script_id") else {
            return ToolOutcome::error("delete_script requires 'script_id'");
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let current = match self.ctx.client.get_script_config(&script_id).await {
            Ok(current) => current,
            Err(error) => return hass_error(&error),
        };

        let preview = ChangePreview::new(ChangeAction::Delete, "script", &script_id, current);
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Script deletion cancelled by user.");
        }

        if let Err(error) = self.ctx.client.delete_script_config(&script_id).await {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain("script").await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({"status": "deleted", "script_id": script_id}))
    }
}
