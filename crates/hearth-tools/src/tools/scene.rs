//! Scene CRUD tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    confirm::{confirm_change, ChangeAction, ChangePreview},
    registry::{object_schema, HearthTool, ToolContext, ToolDefinition, ToolOutcome},
    tools::{bool_arg, cancelled, hass_error, parse_object, string_arg},
};

pub fn scene_tools(ctx: &ToolContext) -> Vec<Arc<dyn HearthTool>> {
    vec![
        Arc::new(ListScenesTool { ctx: ctx.clone() }),
        Arc::new(GetSceneTool { ctx: ctx.clone() }),
        Arc::new(CreateSceneTool { ctx: ctx.clone() }),
        Arc::new(UpdateSceneTool { ctx: ctx.clone() }),
        Arc::new(DeleteSceneTool { ctx: ctx.clone() }),
    ]
}

struct ListScenesTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListScenesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_scenes".to_string(),
            description: "List all scenes with entity id, friendly name, and state.".to_string(),
            input_schema: object_schema(json!({}), &[]),
        }
    }

    async fn invoke(&self, _arguments: Value) -> ToolOutcome {
        let states = match self.ctx.client.get_states().await {
            Ok(states) => states,
            Err(error) => return hass_error(&error),
        };
        let scenes: Vec<Value> = states
            .iter()
            .filter(|state| state.domain() == "scene")
            .map(|state| {
                json!({
                    "entity_id": state.entity_id,
                    "friendly_name": state.friendly_name(),
                    "state": state.state,
                })
            })
            .collect();
        ToolOutcome::ok(Value::Array(scenes))
    }
}

struct GetSceneTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetSceneTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_scene".to_string(),
            description: "Get the full configuration of a scene by its config-store id."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "scene_id": {"type": "string", "description": "Config store id"},
                }),
                &["scene_id"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(scene_id) = string_arg(&arguments, "scene_id") else {
            return ToolOutcome::error("get_scene requires 'scene_id'");
        };
        match self.ctx.client.get_scene_config(&scene_id).await {
            Ok(config) => ToolOutcome::ok(config),
            Err(error) => hass_error(&error),
        }
    }
}

struct CreateSceneTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for CreateSceneTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "create_scene".to_string(),
            description: "Create a new scene from a JSON config with 'name' and 'entities'. \
                          Previewed for confirmation, then saved and reloaded."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "config": {"type": "string", "description": "Scene config as a JSON string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(raw) = string_arg(&arguments, "config") else {
            return ToolOutcome::error("create_scene requires 'config'");
        };
        let mut config = match parse_object(&raw, "config") {
            Ok(config) => config,
            Err(error) => return ToolOutcome::error(error),
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let scene_id = config
            .remove("id")
            .and_then(|id| id.as_str().map(str::to_string))
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let name = config
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&scene_id)
            .to_string();

        let preview = ChangePreview::new(
            ChangeAction::Create,
            "scene",
            &name,
            Value::Object(config.clone()),
        );
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Scene creation cancelled by user.");
        }

        let body = Value::Object(config);
        if let Err(error) = self.ctx.client.save_scene_config(&scene_id, &body).await {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain("scene").await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({"status": "created", "scene_id": scene_id, "name": name}))
    }
}

struct UpdateSceneTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for UpdateSceneTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "update_scene".to_string(),
            description: "Update a scene by merging the provided fields into its current \
                          configuration. Previewed for confirmation before saving."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "scene_id": {"type": "string", "description": "Config store id"},
                    "config": {"type": "string", "description": "Fields to merge, as a JSON string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["scene_id", "config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(scene_id) = string_arg(&arguments, "scene_id") else {
            return ToolOutcome::error("update_scene requires 'scene_id'");
        };
        let Some(raw) = string_arg(&arguments, "config") else {
            return ToolOutcome::error("update_scene requires 'config'");
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let current = match self.ctx.client.get_scene_config(&scene_id).await {
            Ok(Value::Object(current)) => current,
            Ok(other) => {
                return ToolOutcome::error(format!("unexpected scene config payload: {other}"));
            }
            Err(error) => return hass_error(&error),
        };
        let updates = match parse_object(&raw, "config") {
            Ok(updates) => updates,
            Err(error) => return ToolOutcome::error(error),
        };

        let mut merged = current;
        for (key, value) in updates {
            merged.insert(key, value);
        }
        merged.remove("id");
        let name = merged
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let preview = ChangePreview::new(
            ChangeAction::Update,
            "scene",
            &scene_id,
            Value::Object(merged.clone()),
        );
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Scene update cancelled by user.");
        }

        let body = Value::Object(merged);
        if let Err(error) = self.ctx.client.save_scene_config(&scene_id, &body).await {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain("scene").await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({"status": "updated", "scene_id": scene_id, "name": name}))
    }
}

struct DeleteSceneTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for DeleteSceneTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "delete_scene".to_string(),
            description: "Delete a scene. The current configuration is shown for review before \
                          the irreversible delete."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "scene_id": {"type": "string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["scene_id"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(scene_id) = string_arg(&arguments, "scene_id") else {
            return ToolOutcome::error("delete_scene requires 'scene_id'");
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let current = match self.ctx.client.get_scene_config(&scene_id).await {
            Ok(current) => current,
            Err(error) => return hass_error(&error),
        };
        let name = current
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let preview = ChangePreview::new(ChangeAction::Delete, "scene", &scene_id, current);
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Scene deletion cancelled by user.");
        }

        if let Err(error) = self.ctx.client.delete_scene_config(&scene_id).await {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain("scene").await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({"status": "deleted", "scene_id": scene_id, "name": name}))
    }
}
