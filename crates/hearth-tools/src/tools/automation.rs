//! Automation CRUD tools.
//!
//! Every mutating operation runs through the dry-run confirmation gate and
//! reloads the automation domain after saving so changes take effect
//! immediately.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use hearth_client::HassValidationResult;

use crate::{
    confirm::{confirm_change, ChangeAction, ChangePreview},
    registry::{object_schema, HearthTool, ToolContext, ToolDefinition, ToolOutcome},
    tools::{bool_arg, cancelled, hass_error, parse_object, string_arg},
    yaml::diff_configs,
};

pub fn automation_tools(ctx: &ToolContext) -> Vec<Arc<dyn HearthTool>> {
    vec![
        Arc::new(ListAutomationsTool { ctx: ctx.clone() }),
        Arc::new(GetAutomationTool { ctx: ctx.clone() }),
        Arc::new(CreateAutomationTool { ctx: ctx.clone() }),
        Arc::new(UpdateAutomationTool { ctx: ctx.clone() }),
        Arc::new(DeleteAutomationTool { ctx: ctx.clone() }),
        Arc::new(ToggleAutomationTool { ctx: ctx.clone() }),
        Arc::new(DuplicateAutomationTool { ctx: ctx.clone() }),
    ]
}

fn section(config: &Map<String, Value>, plural: &str, singular: &str) -> Value {
    config
        .get(plural)
        .or_else(|| config.get(singular))
        .cloned()
        .unwrap_or_else(|| json!([]))
}

/// Validates the trigger/condition/action sections, downgrading an
/// unavailable validator to a warning so the preview still renders.
async fn validate_sections(
    ctx: &ToolContext,
    config: &Map<String, Value>,
) -> HassValidationResult {
    let result = ctx
        .client
        .validate_automation(
            section(config, "triggers", "trigger"),
            section(config, "conditions", "condition"),
            section(config, "actions", "action"),
        )
        .await;
    match result {
        Ok(validation) => validation,
        Err(error) => {
            tracing::warn!("config validation unavailable: {error}");
            HassValidationResult::skipped(error.to_string())
        }
    }
}

struct ListAutomationsTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListAutomationsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_automations".to_string(),
            description: "List all automations with their entity id, alias, state, and last \
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
        let automations: Vec<Value> = states
            .iter()
            .filter(|state| state.domain() == "automation")
            .map(|state| {
                json!({
                    "id": state.entity_id,
                    "alias": state.friendly_name(),
                    "state": state.state,
                    "last_triggered": state.attributes.get("last_triggered"),
                })
            })
            .collect();
        ToolOutcome::ok(Value::Array(automations))
    }
}

struct GetAutomationTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetAutomationTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_automation".to_string(),
            description: "Get the full configuration of one automation by its config-store id \
                          (not the entity id)."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "automation_id": {"type": "string", "description": "Config store id"},
                }),
                &["automation_id"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(automation_id) = string_arg(&arguments, "automation_id") else {
            return ToolOutcome::error("get_automation requires 'automation_id'");
        };
        match self.ctx.client.get_automation_config(&automation_id).await {
            Ok(config) => ToolOutcome::ok(config),
            Err(error) => hass_error(&error),
        }
    }
}

struct CreateAutomationTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for CreateAutomationTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "create_automation".to_string(),
            description: "Create a new automation from a JSON config (alias, triggers, \
                          conditions, actions, mode). The config is validated and previewed \
                          for confirmation before saving; an id is generated when omitted."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "config": {"type": "string", "description": "Automation config as a JSON string"},
                    "skip_confirm": {"type": "boolean", "description": "Apply without the confirmation prompt"},
                }),
                &["config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(raw) = string_arg(&arguments, "config") else {
            return ToolOutcome::error("create_automation requires 'config'");
        };
        let mut config = match parse_object(&raw, "config") {
            Ok(config) => config,
            Err(error) => return ToolOutcome::error(error),
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let automation_id = config
            .remove("id")
            .and_then(|id| id.as_str().map(str::to_string))
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let alias = config
            .get("alias")
            .and_then(Value::as_str)
            .unwrap_or(&automation_id)
            .to_string();

        let validation = validate_sections(&self.ctx, &config).await;
        let preview = ChangePreview::new(
            ChangeAction::Create,
            "automation",
            &alias,
            Value::Object(config.clone()),
        )
        .with_validation(Some(validation));

        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Automation creation cancelled by user.");
        }

        let body = Value::Object(config);
        if let Err(error) = self.ctx.client.save_automation_config(&automation_id, &body).await {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain("automation").await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "created",
            "automation_id": automation_id,
            "alias": alias,
        }))
    }
}

struct UpdateAutomationTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for UpdateAutomationTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "update_automation".to_string(),
            description: "Replace an automation's configuration. The preview includes a diff \
                          of current vs proposed config and the validation verdict."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "automation_id": {"type": "string", "description": "Config store id"},
                    "config": {"type": "string", "description": "Full replacement config as a JSON string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["automation_id", "config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(automation_id) = string_arg(&arguments, "automation_id") else {
            return ToolOutcome::error("update_automation requires 'automation_id'");
        };
        let Some(raw) = string_arg(&arguments, "config") else {
            return ToolOutcome::error("update_automation requires 'config'");
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let current = match self.ctx.client.get_automation_config(&automation_id).await {
            Ok(current) => current,
            Err(error) => return hass_error(&error),
        };
        let mut config = match parse_object(&raw, "config") {
            Ok(config) => config,
            Err(error) => return ToolOutcome::error(error),
        };
        config.remove("id");

        let alias = config
            .get("alias")
            .and_then(Value::as_str)
            .or_else(|| current.get("alias").and_then(Value::as_str))
            .unwrap_or(&automation_id)
            .to_string();

        let validation = validate_sections(&self.ctx, &config).await;
        let proposed = Value::Object(config);
        let diff = diff_configs(&current, &proposed);
        let preview = ChangePreview::new(
            ChangeAction::Update,
            "automation",
            &alias,
            json!({"proposed": proposed.clone(), "diff": diff}),
        )
        .with_validation(Some(validation));

        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Automation update cancelled by user.");
        }

        if let Err(error) = self.ctx.client.save_automation_config(&automation_id, &proposed).await
        {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain("automation").await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "updated",
            "automation_id": automation_id,
            "alias": alias,
        }))
    }
}

struct DeleteAutomationTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for DeleteAutomationTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "delete_automation".to_string(),
            description: "Delete an automation. The current configuration is shown for review \
                          before the irreversible delete."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "automation_id": {"type": "string", "description": "Config store id"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["automation_id"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(automation_id) = string_arg(&arguments, "automation_id") else {
            return ToolOutcome::error("delete_automation requires 'automation_id'");
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let current = match self.ctx.client.get_automation_config(&automation_id).await {
            Ok(current) => current,
            Err(error) => return hass_error(&error),
        };

        let preview =
            ChangePreview::new(ChangeAction::Delete, "automation", &automation_id, current);
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Automation deletion cancelled by user.");
        }

        if let Err(error) = self.ctx.client.delete_automation_config(&automation_id).await {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain("automation").await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({"status": "deleted", "automation_id": automation_id}))
    }
}

struct ToggleAutomationTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ToggleAutomationTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "toggle_automation".to_string(),
            description: "Enable or disable an automation without modifying its configuration. \
                          Non-destructive; no confirmation required."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "entity_id": {"type": "string", "description": "e.g. 'automation.morning_lights'"},
                    "enabled": {"type": "boolean"},
                }),
                &["entity_id", "enabled"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(entity_id) = string_arg(&arguments, "entity_id") else {
            return ToolOutcome::error("toggle_automation requires 'entity_id'");
        };
        let Some(enabled) = arguments.get("enabled").and_then(Value::as_bool) else {
            return ToolOutcome::error("toggle_automation requires boolean 'enabled'");
        };
        let service = if enabled { "turn_on" } else { "turn_off" };
        let data = json!({"entity_id": entity_id});
        if let Err(error) = self.ctx.client.call_service("automation", service, Some(&data)).await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": if enabled { "enabled" } else { "disabled" },
            "entity_id": entity_id,
        }))
    }
}

struct DuplicateAutomationTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for DuplicateAutomationTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "duplicate_automation".to_string(),
            description: "Copy an automation under a new generated id. Existing configurations \
                          are untouched, so no confirmation is required."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "automation_id": {"type": "string", "description": "Config store id to copy"},
                    "new_alias": {"type": "string", "description": "Alias for the copy; defaults to ' (Copy)' suffix"},
                }),
                &["automation_id"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(automation_id) = string_arg(&arguments, "automation_id") else {
            return ToolOutcome::error("duplicate_automation requires 'automation_id'");
        };

        let source = match self.ctx.client.get_automation_config(&automation_id).await {
            Ok(Value::Object(config)) => config,
            Ok(other) => {
                return ToolOutcome::error(format!(
                    "unexpected automation config payload: {other}"
                ));
            }
            Err(error) => return hass_error(&error),
        };

        let mut copy = source;
        copy.remove("id");
        let alias = match string_arg(&arguments, "new_alias") {
            Some(alias) => alias,
            None => {
                let original = copy
                    .get("alias")
                    .and_then(Value::as_str)
                    .unwrap_or(&automation_id);
                format!("{original} (Copy)")
            }
        };
        copy.insert("alias".to_string(), json!(alias));

        let new_id = Uuid::new_v4().to_string();
        let body = Value::Object(copy);
        if let Err(error) = self.ctx.client.save_automation_config(&new_id, &body).await {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain("automation").await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "duplicated",
            "automation_id": new_id,
            "alias": alias,
        }))
    }
}
