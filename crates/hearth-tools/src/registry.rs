//! Explicit tool registry.
//!
//! Tools are plain values implementing a common invoke contract, collected
//! into an immutable name-keyed table once at startup. There is no
//! self-registration; construction order is visible in one place.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde_json::{json, Value};

use hearth_client::HassClient;

use crate::confirm::{ConfirmPolicy, ConfirmationGateway};

#[derive(Debug, Clone)]
/// Name, description, and JSON schema advertised for one tool.
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone)]
/// Result of one tool invocation.
pub struct ToolOutcome {
    pub content: Value,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: json!({"error": message.into()}),
            is_error: true,
        }
    }
}

#[async_trait]
/// Contract every tool operation implements.
pub trait HearthTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn invoke(&self, arguments: Value) -> ToolOutcome;
}

/// Dependencies handed to every tool constructor.
#[derive(Clone)]
pub struct ToolContext {
    pub client: Arc<HassClient>,
    pub gateway: Arc<dyn ConfirmationGateway>,
    pub policy: ConfirmPolicy,
}

pub type ToolRegistry = BTreeMap<String, Arc<dyn HearthTool>>;

/// Builds the complete name-keyed tool table.
pub fn build_tool_registry(ctx: &ToolContext) -> ToolRegistry {
    let mut tools: Vec<Arc<dyn HearthTool>> = Vec::new();
    tools.extend(crate::tools::registries::registry_tools(ctx));
    tools.extend(crate::tools::state::state_tools(ctx));
    tools.extend(crate::tools::automation::automation_tools(ctx));
    tools.extend(crate::tools::script::script_tools(ctx));
    tools.extend(crate::tools::scene::scene_tools(ctx));
    tools.extend(crate::tools::helper::helper_tools(ctx));
    tools.extend(crate::tools::dashboard::dashboard_tools(ctx));
    tools.extend(crate::tools::blueprint::blueprint_tools(ctx));
    tools.extend(crate::tools::config_validation::config_validation_tools(ctx));
    tools.extend(crate::tools::suggestions::suggestion_tools(ctx));

    let mut registry = ToolRegistry::new();
    for tool in tools {
        let name = tool.definition().name;
        let previous = registry.insert(name.clone(), tool);
        debug_assert!(previous.is_none(), "duplicate tool name '{name}'");
    }
    registry
}

/// Shorthand for a `type: object` input schema.
pub fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::{build_tool_registry, ToolContext};
    use crate::confirm::{ConfirmPolicy, ConfirmationDecision, ConfirmationGateway};
    use async_trait::async_trait;
    use hearth_client::{HassClient, HassRestClient, HassWsClient};
    use serde_json::Value;
    use std::sync::Arc;

    struct DenyGateway;

    #[async_trait]
    impl ConfirmationGateway for DenyGateway {
        async fn solicit(&self, _preview: &str) -> ConfirmationDecision {
            ConfirmationDecision::Rejected
        }
    }

    fn offline_context() -> ToolContext {
        let ws = Arc::new(HassWsClient::new("ws://127.0.0.1:1/api/websocket", "token"));
        let rest = HassRestClient::new("http://127.0.0.1:1", "token").expect("rest client");
        ToolContext {
            client: Arc::new(HassClient::new(ws, rest)),
            gateway: Arc::new(DenyGateway),
            policy: ConfirmPolicy::default(),
        }
    }

    #[test]
    fn registry_holds_the_full_catalog_with_unique_names() {
        let registry = build_tool_registry(&offline_context());
        assert_eq!(registry.len(), 54);

        for expected in [
            "list_devices",
            "search_entities",
            "get_all_states",
            "render_template",
            "list_automations",
            "create_automation",
            "toggle_automation",
            "duplicate_automation",
            "create_script",
            "delete_scene",
            "create_helper",
            "save_dashboard_config",
            "update_card",
            "import_blueprint",
            "create_from_blueprint",
            "validate_automation_config",
            "validate_yaml",
            "suggest_automations",
            "detect_automation_conflicts",
        ] {
            assert!(registry.contains_key(expected), "missing tool '{expected}'");
        }
    }

    #[test]
    fn every_definition_advertises_an_object_schema() {
        let registry = build_tool_registry(&offline_context());
        for (name, tool) in &registry {
            let definition = tool.definition();
            assert_eq!(&definition.name, name);
            assert!(!definition.description.trim().is_empty(), "{name} has no description");
            assert_eq!(definition.input_schema["type"], Value::String("object".to_string()));
            assert!(definition.input_schema["properties"].is_object(), "{name} schema");
        }
    }
}
