//! Blueprint tools: list, inspect, import, and instantiate.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::{
    confirm::{confirm_change, ChangeAction, ChangePreview},
    registry::{object_schema, HearthTool, ToolContext, ToolDefinition, ToolOutcome},
    tools::{bool_arg, cancelled, hass_error, hass_outcome, parse_object, string_arg},
};

const BLUEPRINT_DOMAINS: &[&str] = &["automation", "script"];

fn invalid_domain(domain: &str) -> ToolOutcome {
    ToolOutcome::error(format!(
        "Invalid domain '{domain}'. Must be 'automation' or 'script'."
    ))
}

pub fn blueprint_tools(ctx: &ToolContext) -> Vec<Arc<dyn HearthTool>> {
    vec![
        Arc::new(ListBlueprintsTool { ctx: ctx.clone() }),
        Arc::new(GetBlueprintTool { ctx: ctx.clone() }),
        Arc::new(ImportBlueprintTool { ctx: ctx.clone() }),
        Arc::new(CreateFromBlueprintTool { ctx: ctx.clone() }),
    ]
}

struct ListBlueprintsTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListBlueprintsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_blueprints".to_string(),
            description: "List available blueprints for the automation and script domains, or \
                          one domain when given."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "domain": {"type": "string", "description": "'automation' or 'script'"},
                }),
                &[],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        if let Some(domain) = string_arg(&arguments, "domain") {
            if !BLUEPRINT_DOMAINS.contains(&domain.as_str()) {
                return invalid_domain(&domain);
            }
            return hass_outcome(
                self.ctx
                    .client
                    .list_blueprints(&domain)
                    .await
                    .map(|blueprints| json!({"domain": domain, "blueprints": blueprints})),
            );
        }

        let mut merged = Map::new();
        for domain in BLUEPRINT_DOMAINS {
            match self.ctx.client.list_blueprints(domain).await {
                Ok(blueprints) => {
                    merged.insert(domain.to_string(), blueprints);
                }
                Err(error) => {
                    tracing::warn!("failed to list blueprints for domain '{domain}': {error}");
                    merged.insert(domain.to_string(), json!({"error": error.to_string()}));
                }
            }
        }
        ToolOutcome::ok(Value::Object(merged))
    }
}

struct GetBlueprintTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetBlueprintTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_blueprint".to_string(),
            description: "Get a blueprint's full configuration, including its input schema."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "domain": {"type": "string", "description": "'automation' or 'script'"},
                    "path": {"type": "string", "description": "e.g. 'homeassistant/motion_light.yaml'"},
                }),
                &["domain", "path"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(domain) = string_arg(&arguments, "domain") else {
            return ToolOutcome::error("get_blueprint requires 'domain'");
        };
        if !BLUEPRINT_DOMAINS.contains(&domain.as_str()) {
            return invalid_domain(&domain);
        }
        let Some(path) = string_arg(&arguments, "path") else {
            return ToolOutcome::error("get_blueprint requires 'path'");
        };
        hass_outcome(self.ctx.client.get_blueprint(&domain, &path).await)
    }
}

struct ImportBlueprintTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ImportBlueprintTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "import_blueprint".to_string(),
            description: "Import a community blueprint from a URL. The fetched blueprint is \
                          shown for review before it is saved."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "url": {"type": "string", "description": "Blueprint source URL"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["url"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(url) = string_arg(&arguments, "url") else {
            return ToolOutcome::error("import_blueprint requires 'url'");
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let imported = match self.ctx.client.import_blueprint(&url).await {
            Ok(imported) => imported,
            Err(error) => return hass_error(&error),
        };

        let suggested_filename = imported
            .get("suggested_filename")
            .and_then(Value::as_str)
            .unwrap_or("unknown.yaml")
            .to_string();
        let raw_data = imported
            .get("raw_data")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let domain = imported
            .get("blueprint")
            .and_then(|blueprint| blueprint.get("domain"))
            .and_then(Value::as_str)
            .unwrap_or("automation")
            .to_string();

        let preview_body = if raw_data.is_empty() {
            imported.clone()
        } else {
            json!({"raw_data": raw_data})
        };
        let preview = ChangePreview::new(
            ChangeAction::Import,
            "blueprint",
            format!("{domain}/{suggested_filename}"),
            preview_body,
        );
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Blueprint import cancelled by user.");
        }

        if let Err(error) = self
            .ctx
            .client
            .save_blueprint(&domain, &suggested_filename, &raw_data, &url)
            .await
        {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "imported",
            "domain": domain,
            "path": suggested_filename,
        }))
    }
}

struct CreateFromBlueprintTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for CreateFromBlueprintTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "create_from_blueprint".to_string(),
            description: "Create an automation or script from an existing blueprint. 'inputs' \
                          holds the blueprint input values, plus optional 'alias' and \
                          'description' keys for the new entity."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "domain": {"type": "string", "description": "'automation' or 'script'"},
                    "blueprint_path": {"type": "string"},
                    "inputs": {"type": "string", "description": "Blueprint input values as a JSON string"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["domain", "blueprint_path", "inputs"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(domain) = string_arg(&arguments, "domain") else {
            return ToolOutcome::error("create_from_blueprint requires 'domain'");
        };
        if !BLUEPRINT_DOMAINS.contains(&domain.as_str()) {
            return invalid_domain(&domain);
        }
        let Some(blueprint_path) = string_arg(&arguments, "blueprint_path") else {
            return ToolOutcome::error("create_from_blueprint requires 'blueprint_path'");
        };
        let Some(raw_inputs) = string_arg(&arguments, "inputs") else {
            return ToolOutcome::error("create_from_blueprint requires 'inputs'");
        };
        let mut inputs = match parse_object(&raw_inputs, "inputs") {
            Ok(inputs) => inputs,
            Err(error) => return ToolOutcome::error(error),
        };
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let alias = inputs
            .remove("alias")
            .and_then(|value| value.as_str().map(str::to_string));
        let description = inputs
            .remove("description")
            .and_then(|value| value.as_str().map(str::to_string));

        let mut config = Map::new();
        config.insert(
            "use_blueprint".to_string(),
            json!({"path": blueprint_path, "input": inputs}),
        );
        if let Some(alias) = &alias {
            config.insert("alias".to_string(), json!(alias));
        }
        if let Some(description) = &description {
            config.insert("description".to_string(), json!(description));
        }

        let slug = match &alias {
            Some(alias) => object_id_slug(alias),
            None => Uuid::new_v4().to_string(),
        };
        let identifier = alias
            .clone()
            .unwrap_or_else(|| format!("{domain}/{blueprint_path}"));

        let preview = ChangePreview::new(
            ChangeAction::Create,
            format!("{domain} (from blueprint)"),
            &identifier,
            Value::Object(config.clone()),
        );
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Creation from blueprint cancelled by user.");
        }

        let body = Value::Object(config);
        let save_result = if domain == "automation" {
            self.ctx.client.save_automation_config(&slug, &body).await
        } else {
            self.ctx.client.save_script_config(&slug, &body).await
        };
        if let Err(error) = save_result {
            return hass_error(&error);
        }
        if let Err(error) = self.ctx.client.reload_domain(&domain).await {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "created",
            "domain": domain,
            "entity_id": format!("{domain}.{slug}"),
            "slug": slug,
            "blueprint_path": blueprint_path,
        }))
    }
}

/// Derives a config-store slug from an alias; falls back to a UUID when
/// nothing usable remains.
fn object_id_slug(alias: &str) -> String {
    let slug: String = alias
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    match slug.chars().next() {
        Some(first) if first.is_ascii_alphabetic() => slug,
        Some(_) => format!("bp_{slug}"),
        None => Uuid::new_v4().to_string(),
    }
}
