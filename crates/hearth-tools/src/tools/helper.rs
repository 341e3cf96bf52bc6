//! Input helper (input_*) management tools over the WebSocket channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    confirm::{confirm_change, ChangeAction, ChangePreview},
    registry::{object_schema, HearthTool, ToolContext, ToolDefinition, ToolOutcome},
    tools::{bool_arg, cancelled, hass_error, hass_outcome, parse_object, string_arg},
};

const VALID_HELPER_TYPES: &[&str] = &[
    "input_boolean",
    "input_number",
    "input_text",
    "input_select",
    "input_datetime",
    "input_button",
];

fn invalid_helper_type(helper_type: &str) -> ToolOutcome {
    ToolOutcome::error(format!(
        "Invalid helper_type '{helper_type}'. Must be one of: {}",
        VALID_HELPER_TYPES.join(", ")
    ))
}

fn entity_matches_type(entity_id: &str, helper_type: &str) -> bool {
    entity_id
        .split_once('.')
        .map(|(domain, _)| domain == helper_type)
        .unwrap_or(false)
}

pub fn helper_tools(ctx: &ToolContext) -> Vec<Arc<dyn HearthTool>> {
    vec![
        Arc::new(ListHelpersTool { ctx: ctx.clone() }),
        Arc::new(CreateHelperTool { ctx: ctx.clone() }),
        Arc::new(UpdateHelperTool { ctx: ctx.clone() }),
        Arc::new(DeleteHelperTool { ctx: ctx.clone() }),
    ]
}

struct ListHelpersTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListHelpersTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_helpers".to_string(),
            description: "List input helper entities (input_boolean, input_number, input_text, \
                          input_select, input_datetime, input_button), optionally one type."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "helper_type": {"type": "string", "description": "Restrict to one helper type"},
                }),
                &[],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let helper_type = string_arg(&arguments, "helper_type");
        if let Some(helper_type) = &helper_type {
            if !VALID_HELPER_TYPES.contains(&helper_type.as_str()) {
                return invalid_helper_type(helper_type);
            }
        }

        let states = match self.ctx.client.get_states().await {
            Ok(states) => states,
            Err(error) => return hass_error(&error),
        };
        let helpers: Vec<Value> = states
            .iter()
            .filter(|state| match &helper_type {
                Some(helper_type) => state.domain() == helper_type,
                None => VALID_HELPER_TYPES.contains(&state.domain()),
            })
            .filter_map(|state| serde_json::to_value(state).ok())
            .collect();
        ToolOutcome::ok(Value::Array(helpers))
    }
}

struct CreateHelperTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for CreateHelperTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "create_helper".to_string(),
            description: "Create a new input helper. Common config fields are 'name' and \
                          'icon'; type-specific fields include min/max/step (input_number), \
                          options (input_select), has_date/has_time (input_datetime)."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "helper_type": {"type": "string", "description": "One of the input_* helper types"},
                    "config": {"type": "string", "description": "Helper config as a JSON string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["helper_type", "config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(helper_type) = string_arg(&arguments, "helper_type") else {
            return ToolOutcome::error("create_helper requires 'helper_type'");
        };
        if !VALID_HELPER_TYPES.contains(&helper_type.as_str()) {
            return invalid_helper_type(&helper_type);
        }
        let Some(raw) = string_arg(&arguments, "config") else {
            return ToolOutcome::error("create_helper requires 'config'");
        };
        let config = match parse_object(&raw, "config") {
            Ok(config) => config,
            Err(error) => return ToolOutcome::error(error),
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let name = config
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&helper_type)
            .to_string();

        let preview = ChangePreview::new(
            ChangeAction::Create,
            &helper_type,
            &name,
            Value::Object(config.clone()),
        );
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Helper creation cancelled by user.");
        }

        match self.ctx.client.create_helper(&helper_type, config).await {
            Ok(result) => ToolOutcome::ok(json!({"status": "created", "result": result})),
            Err(error) => hass_error(&error),
        }
    }
}

struct UpdateHelperTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for UpdateHelperTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "update_helper".to_string(),
            description: "Update fields of an existing input helper. Only the provided fields \
                          change; the helper_type must match the entity's domain."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "helper_type": {"type": "string"},
                    "entity_id": {"type": "string", "description": "e.g. 'input_boolean.my_toggle'"},
                    "config": {"type": "string", "description": "Fields to change, as a JSON string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["helper_type", "entity_id", "config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(helper_type) = string_arg(&arguments, "helper_type") else {
            return ToolOutcome::error("update_helper requires 'helper_type'");
        };
        if !VALID_HELPER_TYPES.contains(&helper_type.as_str()) {
            return invalid_helper_type(&helper_type);
        }
        let Some(entity_id) = string_arg(&arguments, "entity_id") else {
            return ToolOutcome::error("update_helper requires 'entity_id'");
        };
        if !entity_matches_type(&entity_id, &helper_type) {
            return ToolOutcome::error(format!(
                "entity_id '{entity_id}' does not match helper_type '{helper_type}'"
            ));
        }
        let Some(raw) = string_arg(&arguments, "config") else {
            return ToolOutcome::error("update_helper requires 'config'");
        };
        let changes = match parse_object(&raw, "config") {
            Ok(changes) => changes,
            Err(error) => return ToolOutcome::error(error),
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let current_name = match self.ctx.client.get_state(&entity_id).await {
            Ok(state) => state.friendly_name().to_string(),
            Err(error) => return hass_error(&error),
        };

        let preview = ChangePreview::new(
            ChangeAction::Update,
            &helper_type,
            &entity_id,
            json!({
                "entity_id": entity_id,
                "current_name": current_name,
                "changes": changes.clone(),
            }),
        );
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Helper update cancelled by user.");
        }

        match self.ctx.client.update_helper(&helper_type, &entity_id, changes).await {
            Ok(result) => ToolOutcome::ok(json!({"status": "updated", "result": result})),
            Err(error) => hass_error(&error),
        }
    }
}

struct DeleteHelperTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for DeleteHelperTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "delete_helper".to_string(),
            description: "Delete an input helper permanently. The current state is shown for \
                          review before deleting."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "helper_type": {"type": "string"},
                    "entity_id": {"type": "string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["helper_type", "entity_id"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(helper_type) = string_arg(&arguments, "helper_type") else {
            return ToolOutcome::error("delete_helper requires 'helper_type'");
        };
        if !VALID_HELPER_TYPES.contains(&helper_type.as_str()) {
            return invalid_helper_type(&helper_type);
        }
        let Some(entity_id) = string_arg(&arguments, "entity_id") else {
            return ToolOutcome::error("delete_helper requires 'entity_id'");
        };
        if !entity_matches_type(&entity_id, &helper_type) {
            return ToolOutcome::error(format!(
                "entity_id '{entity_id}' does not match helper_type '{helper_type}'"
            ));
        }
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let preview_body = match self.ctx.client.get_state(&entity_id).await {
            Ok(state) => json!({
                "entity_id": entity_id,
                "friendly_name": state.friendly_name(),
                "current_state": state.state,
                "attributes": state.attributes,
            }),
            Err(error) => return hass_error(&error),
        };

        let preview =
            ChangePreview::new(ChangeAction::Delete, &helper_type, &entity_id, preview_body);
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Helper deletion cancelled by user.");
        }

        hass_outcome(
            self.ctx
                .client
                .delete_helper(&helper_type, &entity_id)
                .await
                .map(|result| json!({"status": "deleted", "entity_id": entity_id, "result": result})),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::entity_matches_type;

    #[test]
    fn helper_entity_domain_must_match_type() {
        assert!(entity_matches_type("input_boolean.my_toggle", "input_boolean"));
        assert!(!entity_matches_type("input_number.my_toggle", "input_boolean"));
        assert!(!entity_matches_type("no_dot", "input_boolean"));
    }
}
