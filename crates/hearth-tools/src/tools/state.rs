//! Read-only state, history, logbook, and template tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    registry::{object_schema, HearthTool, ToolContext, ToolDefinition, ToolOutcome},
    tools::{hass_error, hass_outcome, string_arg},
};

pub fn state_tools(ctx: &ToolContext) -> Vec<Arc<dyn HearthTool>> {
    vec![
        Arc::new(GetAllStatesTool { ctx: ctx.clone() }),
        Arc::new(GetEntityStateTool { ctx: ctx.clone() }),
        Arc::new(GetEntityHistoryTool { ctx: ctx.clone() }),
        Arc::new(GetLogbookTool { ctx: ctx.clone() }),
        Arc::new(GetErrorLogTool { ctx: ctx.clone() }),
        Arc::new(RenderTemplateTool { ctx: ctx.clone() }),
    ]
}

struct GetAllStatesTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetAllStatesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_all_states".to_string(),
            description: "Get the current state of all entities, optionally filtered to one \
                          domain (e.g. 'light', 'sensor', 'climate')."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "domain": {"type": "string", "description": "Domain filter, e.g. 'light'"},
                }),
                &[],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let states = match self.ctx.client.get_states().await {
            Ok(states) => states,
            Err(error) => return hass_error(&error),
        };
        let domain = string_arg(&arguments, "domain");
        let filtered: Vec<Value> = states
            .iter()
            .filter(|state| match &domain {
                Some(domain) => state.domain() == domain,
                None => true,
            })
            .filter_map(|state| serde_json::to_value(state).ok())
            .collect();
        ToolOutcome::ok(Value::Array(filtered))
    }
}

struct GetEntityStateTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetEntityStateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_entity_state".to_string(),
            description: "Get the full current state of a single entity, including attributes \
                          and timestamps."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "entity_id": {"type": "string", "description": "e.g. 'light.living_room'"},
                }),
                &["entity_id"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(entity_id) = string_arg(&arguments, "entity_id") else {
            return ToolOutcome::error("get_entity_state requires 'entity_id'");
        };
        match self.ctx.client.get_state(&entity_id).await {
            Ok(state) => match serde_json::to_value(&state) {
                Ok(value) => ToolOutcome::ok(value),
                Err(error) => ToolOutcome::error(format!("failed to encode state: {error}")),
            },
            Err(error) => hass_error(&error),
        }
    }
}

struct GetEntityHistoryTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetEntityHistoryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_entity_history".to_string(),
            description: "Get the state-change history of an entity over a period. Times are \
                          ISO 8601; the period defaults to the last day."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "entity_id": {"type": "string"},
                    "start_time": {"type": "string", "description": "ISO 8601 start of period"},
                    "end_time": {"type": "string", "description": "ISO 8601 end of period"},
                }),
                &["entity_id"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(entity_id) = string_arg(&arguments, "entity_id") else {
            return ToolOutcome::error("get_entity_history requires 'entity_id'");
        };
        let start = string_arg(&arguments, "start_time");
        let end = string_arg(&arguments, "end_time");
        hass_outcome(
            self.ctx
                .client
                .get_history(Some(&entity_id), start.as_deref(), end.as_deref())
                .await,
        )
    }
}

struct GetLogbookTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetLogbookTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_logbook".to_string(),
            description: "Get human-readable logbook entries (state changes, service calls, \
                          automation triggers), optionally filtered to one entity."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "entity_id": {"type": "string"},
                    "start_time": {"type": "string", "description": "ISO 8601 start of period"},
                    "end_time": {"type": "string", "description": "ISO 8601 end of period"},
                }),
                &[],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let entity_id = string_arg(&arguments, "entity_id");
        let start = string_arg(&arguments, "start_time");
        let end = string_arg(&arguments, "end_time");
        hass_outcome(
            self.ctx
                .client
                .get_logbook(entity_id.as_deref(), start.as_deref(), end.as_deref())
                .await,
        )
    }
}

struct GetErrorLogTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetErrorLogTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_error_log".to_string(),
            description: "Get the Home Assistant error log as plain text.".to_string(),
            input_schema: object_schema(json!({}), &[]),
        }
    }

    async fn invoke(&self, _arguments: Value) -> ToolOutcome {
        match self.ctx.client.get_error_log().await {
            Ok(log) => ToolOutcome::ok(Value::String(log)),
            Err(error) => hass_error(&error),
        }
    }
}

struct RenderTemplateTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for RenderTemplateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "render_template".to_string(),
            description: "Render a Home Assistant Jinja2 template on the server, e.g. \
                          '{{ states(\"sensor.temperature\") }}'."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "template": {"type": "string", "description": "Jinja2 template text"},
                }),
                &["template"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(template) = string_arg(&arguments, "template") else {
            return ToolOutcome::error("render_template requires 'template'");
        };
        match self.ctx.client.render_template(&template).await {
            Ok(rendered) => ToolOutcome::ok(Value::String(rendered)),
            Err(error) => hass_error(&error),
        }
    }
}
