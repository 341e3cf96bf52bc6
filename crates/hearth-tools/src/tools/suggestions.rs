//! Proactive suggestion tools backed by the analysis engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use hearth_client::HassError;

use crate::{
    analysis::{analyze_coverage, detect_conflicts, generate_suggestions, suggest_dashboard_layout},
    registry::{object_schema, HearthTool, ToolContext, ToolDefinition, ToolOutcome},
    tools::{hass_error, string_arg},
};

pub fn suggestion_tools(ctx: &ToolContext) -> Vec<Arc<dyn HearthTool>> {
    vec![
        Arc::new(AnalyzeDevicesTool { ctx: ctx.clone() }),
        Arc::new(SuggestAutomationsTool { ctx: ctx.clone() }),
        Arc::new(DetectAutomationConflictsTool { ctx: ctx.clone() }),
        Arc::new(SuggestDashboardTool { ctx: ctx.clone() }),
    ]
}

fn as_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

async fn fetch_entities(ctx: &ToolContext) -> Result<Vec<Value>, HassError> {
    ctx.client.list_entities().await.map(as_array)
}

async fn fetch_areas(ctx: &ToolContext) -> Result<Vec<Value>, HassError> {
    ctx.client.list_areas().await.map(as_array)
}

/// Fetches the stored config of every automation entity, merging in the id
/// and alias from its state. YAML-only automations have no stored config and
/// degrade to the state-derived fields.
async fn fetch_automation_configs(ctx: &ToolContext) -> Result<Vec<Value>, HassError> {
    let states = ctx.client.get_states().await?;
    let mut automations = Vec::new();
    for state in states.iter().filter(|state| state.domain() == "automation") {
        let config_id = state
            .attributes
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut merged = Map::new();
        if let Some(config_id) = &config_id {
            match ctx.client.get_automation_config(config_id).await {
                Ok(Value::Object(config)) => {
                    merged = config;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::debug!(
                        "could not fetch config for {} (id={config_id}), skipping: {error}",
                        state.entity_id
                    );
                }
            }
        }
        merged
            .entry("id".to_string())
            .or_insert_with(|| json!(config_id.clone().unwrap_or_else(|| state.entity_id.clone())));
        merged
            .entry("alias".to_string())
            .or_insert_with(|| json!(state.friendly_name()));
        merged
            .entry("entity_id".to_string())
            .or_insert_with(|| json!(state.entity_id.clone()));
        automations.push(Value::Object(merged));
    }
    Ok(automations)
}

struct AnalyzeDevicesTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for AnalyzeDevicesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "analyze_devices".to_string(),
            description: "Analyze automation coverage across entities and areas: which devices \
                          no automation touches, per-area gaps, and overall coverage."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "area_id": {"type": "string", "description": "Restrict the report to one area"},
                }),
                &[],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let entities = match fetch_entities(&self.ctx).await {
            Ok(entities) => entities,
            Err(error) => return hass_error(&error),
        };
        let areas = match fetch_areas(&self.ctx).await {
            Ok(areas) => areas,
            Err(error) => return hass_error(&error),
        };
        let automations = match fetch_automation_configs(&self.ctx).await {
            Ok(automations) => automations,
            Err(error) => return hass_error(&error),
        };

        let mut report = analyze_coverage(&entities, &automations, &areas);
        if let Some(area_id) = string_arg(&arguments, "area_id") {
            if let Some(by_area) = report.get_mut("by_area").and_then(Value::as_object_mut) {
                by_area.retain(|key, _| key == &area_id);
            }
        }
        ToolOutcome::ok(report)
    }
}

struct SuggestAutomationsTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for SuggestAutomationsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "suggest_automations".to_string(),
            description: "Suggest missing automations (motion lighting, open-door alerts, \
                          battery and lock monitoring, schedules) with ready-to-use config \
                          skeletons."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "entity_id": {"type": "string", "description": "Suggest for one entity only"},
                    "area_id": {"type": "string", "description": "Restrict suggestions to one area"},
                }),
                &[],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let entities = match fetch_entities(&self.ctx).await {
            Ok(entities) => entities,
            Err(error) => return hass_error(&error),
        };
        let areas = match fetch_areas(&self.ctx).await {
            Ok(areas) => areas,
            Err(error) => return hass_error(&error),
        };
        let automations = match fetch_automation_configs(&self.ctx).await {
            Ok(automations) => automations,
            Err(error) => return hass_error(&error),
        };

        let area_id = string_arg(&arguments, "area_id");
        let entity_id = string_arg(&arguments, "entity_id");
        let suggestions = generate_suggestions(
            &entities,
            &automations,
            &areas,
            area_id.as_deref(),
            entity_id.as_deref(),
        );
        ToolOutcome::ok(Value::Array(suggestions))
    }
}

struct DetectAutomationConflictsTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for DetectAutomationConflictsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "detect_automation_conflicts".to_string(),
            description: "Detect automations that may interfere: shared triggers, opposing \
                          actions on the same entity, and overlapping time triggers."
                .to_string(),
            input_schema: object_schema(json!({}), &[]),
        }
    }

    async fn invoke(&self, _arguments: Value) -> ToolOutcome {
        let automations = match fetch_automation_configs(&self.ctx).await {
            Ok(automations) => automations,
            Err(error) => return hass_error(&error),
        };
        ToolOutcome::ok(Value::Array(detect_conflicts(&automations)))
    }
}

struct SuggestDashboardTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for SuggestDashboardTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "suggest_dashboard".to_string(),
            description: "Propose a Lovelace dashboard layout grouped by area with \
                          domain-appropriate cards, ready to adapt and save."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "area_id": {"type": "string", "description": "Layout for one area only"},
                }),
                &[],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let entities = match fetch_entities(&self.ctx).await {
            Ok(entities) => entities,
            Err(error) => return hass_error(&error),
        };
        let areas = match fetch_areas(&self.ctx).await {
            Ok(areas) => areas,
            Err(error) => return hass_error(&error),
        };
        let area_id = string_arg(&arguments, "area_id");
        ToolOutcome::ok(suggest_dashboard_layout(&entities, &areas, area_id.as_deref()))
    }
}
