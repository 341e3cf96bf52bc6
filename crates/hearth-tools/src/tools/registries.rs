//! Tools over the device, entity, area, floor, and label registries.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    registry::{object_schema, HearthTool, ToolContext, ToolDefinition, ToolOutcome},
    tools::{hass_error, hass_outcome, string_arg},
};

pub fn registry_tools(ctx: &ToolContext) -> Vec<Arc<dyn HearthTool>> {
    vec![
        Arc::new(ListDevicesTool { ctx: ctx.clone() }),
        Arc::new(ListEntitiesTool { ctx: ctx.clone() }),
        Arc::new(ListAreasTool { ctx: ctx.clone() }),
        Arc::new(ListFloorsTool { ctx: ctx.clone() }),
        Arc::new(ListLabelsTool { ctx: ctx.clone() }),
        Arc::new(GetEntityDetailsTool { ctx: ctx.clone() }),
        Arc::new(SearchEntitiesTool { ctx: ctx.clone() }),
    ]
}

fn str_field<'a>(entry: &'a Value, key: &str) -> &'a str {
    entry.get(key).and_then(Value::as_str).unwrap_or("")
}

fn entries(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

struct ListDevicesTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListDevicesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_devices".to_string(),
            description: "List registered devices, with optional area, manufacturer, and model \
                          filters."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "area_id": {"type": "string"},
                    "manufacturer": {"type": "string", "description": "Case-insensitive match"},
                    "model": {"type": "string", "description": "Case-insensitive match"},
                }),
                &[],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let devices = match self.ctx.client.list_devices().await {
            Ok(devices) => entries(devices),
            Err(error) => return hass_error(&error),
        };
        let area_id = string_arg(&arguments, "area_id");
        let manufacturer = string_arg(&arguments, "manufacturer").map(|v| v.to_lowercase());
        let model = string_arg(&arguments, "model").map(|v| v.to_lowercase());

        let filtered: Vec<Value> = devices
            .into_iter()
            .filter(|device| match &area_id {
                Some(area) => str_field(device, "area_id") == area,
                None => true,
            })
            .filter(|device| match &manufacturer {
                Some(manufacturer) => {
                    str_field(device, "manufacturer").to_lowercase() == *manufacturer
                }
                None => true,
            })
            .filter(|device| match &model {
                Some(model) => str_field(device, "model").to_lowercase() == *model,
                None => true,
            })
            .collect();
        ToolOutcome::ok(Value::Array(filtered))
    }
}

struct ListEntitiesTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListEntitiesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_entities".to_string(),
            description: "List registered entities, with optional domain, device, and area \
                          filters."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "domain": {"type": "string", "description": "e.g. 'light', 'switch'"},
                    "device_id": {"type": "string"},
                    "area_id": {"type": "string"},
                }),
                &[],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let registry = match self.ctx.client.list_entities().await {
            Ok(registry) => entries(registry),
            Err(error) => return hass_error(&error),
        };
        let prefix = string_arg(&arguments, "domain").map(|domain| {
            if domain.ends_with('.') {
                domain
            } else {
                format!("{domain}.")
            }
        });
        let device_id = string_arg(&arguments, "device_id");
        let area_id = string_arg(&arguments, "area_id");

        let filtered: Vec<Value> = registry
            .into_iter()
            .filter(|entry| match &prefix {
                Some(prefix) => str_field(entry, "entity_id").starts_with(prefix.as_str()),
                None => true,
            })
            .filter(|entry| match &device_id {
                Some(device) => str_field(entry, "device_id") == device,
                None => true,
            })
            .filter(|entry| match &area_id {
                Some(area) => str_field(entry, "area_id") == area,
                None => true,
            })
            .collect();
        ToolOutcome::ok(Value::Array(filtered))
    }
}

struct ListAreasTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListAreasTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_areas".to_string(),
            description: "List all registered areas.".to_string(),
            input_schema: object_schema(json!({}), &[]),
        }
    }

    async fn invoke(&self, _arguments: Value) -> ToolOutcome {
        hass_outcome(self.ctx.client.list_areas().await)
    }
}

struct ListFloorsTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListFloorsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_floors".to_string(),
            description: "List all registered floors.".to_string(),
            input_schema: object_schema(json!({}), &[]),
        }
    }

    async fn invoke(&self, _arguments: Value) -> ToolOutcome {
        hass_outcome(self.ctx.client.list_floors().await)
    }
}

struct ListLabelsTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListLabelsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_labels".to_string(),
            description: "List all registered labels.".to_string(),
            input_schema: object_schema(json!({}), &[]),
        }
    }

    async fn invoke(&self, _arguments: Value) -> ToolOutcome {
        hass_outcome(self.ctx.client.list_labels().await)
    }
}

struct GetEntityDetailsTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetEntityDetailsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_entity_details".to_string(),
            description: "Get registry data and live state for one entity in a single view."
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
            return ToolOutcome::error("get_entity_details requires 'entity_id'");
        };

        let registry = match self.ctx.client.list_entities().await {
            Ok(registry) => entries(registry),
            Err(error) => return hass_error(&error),
        };
        let registry_entry = registry
            .into_iter()
            .find(|entry| str_field(entry, "entity_id") == entity_id);

        let state = match self.ctx.client.get_state(&entity_id).await {
            Ok(state) => serde_json::to_value(&state).unwrap_or(Value::Null),
            Err(error) => return hass_error(&error),
        };

        ToolOutcome::ok(json!({
            "entity_id": entity_id,
            "registry": registry_entry,
            "state": state,
        }))
    }
}

struct SearchEntitiesTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for SearchEntitiesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_entities".to_string(),
            description: "Search registered entities by case-insensitive substring over entity \
                          id and names, optionally restricted to a domain."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "query": {"type": "string"},
                    "domain": {"type": "string"},
                }),
                &["query"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(query) = string_arg(&arguments, "query") else {
            return ToolOutcome::error("search_entities requires 'query'");
        };
        let registry = match self.ctx.client.list_entities().await {
            Ok(registry) => entries(registry),
            Err(error) => return hass_error(&error),
        };
        let prefix = string_arg(&arguments, "domain").map(|domain| {
            if domain.ends_with('.') {
                domain
            } else {
                format!("{domain}.")
            }
        });
        let needle = query.to_lowercase();

        let matches: Vec<Value> = registry
            .into_iter()
            .filter(|entry| match &prefix {
                Some(prefix) => str_field(entry, "entity_id").starts_with(prefix.as_str()),
                None => true,
            })
            .filter(|entry| {
                str_field(entry, "entity_id").to_lowercase().contains(&needle)
                    || str_field(entry, "name").to_lowercase().contains(&needle)
                    || str_field(entry, "original_name").to_lowercase().contains(&needle)
            })
            .collect();
        ToolOutcome::ok(Value::Array(matches))
    }
}
