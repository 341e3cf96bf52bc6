//! Lovelace dashboard management tools.
//!
//! View and card edits are read-modify-write over the full dashboard config:
//! fetch, mutate the views array, preview, and save the whole config back.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use hearth_client::HassError;

use crate::{
    confirm::{confirm_change, ChangeAction, ChangePreview},
    registry::{object_schema, HearthTool, ToolContext, ToolDefinition, ToolOutcome},
    tools::{bool_arg, cancelled, hass_error, hass_outcome, index_arg, parse_json, string_arg},
};

pub fn dashboard_tools(ctx: &ToolContext) -> Vec<Arc<dyn HearthTool>> {
    vec![
        Arc::new(ListDashboardsTool { ctx: ctx.clone() }),
        Arc::new(GetDashboardConfigTool { ctx: ctx.clone() }),
        Arc::new(SaveDashboardConfigTool { ctx: ctx.clone() }),
        Arc::new(GetViewTool { ctx: ctx.clone() }),
        Arc::new(AddViewTool { ctx: ctx.clone() }),
        Arc::new(UpdateViewTool { ctx: ctx.clone() }),
        Arc::new(DeleteViewTool { ctx: ctx.clone() }),
        Arc::new(AddCardTool { ctx: ctx.clone() }),
        Arc::new(UpdateCardTool { ctx: ctx.clone() }),
    ]
}

async fn fetch_config(ctx: &ToolContext, dashboard_id: Option<&str>) -> Result<Value, HassError> {
    ctx.client.get_dashboard_config(dashboard_id).await
}

fn views_of(config: &Value) -> Vec<Value> {
    config
        .get("views")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn out_of_range(kind: &str, index: usize, len: usize) -> ToolOutcome {
    ToolOutcome::error(format!(
        "{kind} index {index} out of range. Valid range is 0-{}.",
        len.saturating_sub(1)
    ))
}

fn view_title(view: &Value) -> &str {
    view.get("title").and_then(Value::as_str).unwrap_or("Untitled")
}

struct ListDashboardsTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for ListDashboardsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_dashboards".to_string(),
            description: "List all Lovelace dashboards (id, url_path, title, mode).".to_string(),
            input_schema: object_schema(json!({}), &[]),
        }
    }

    async fn invoke(&self, _arguments: Value) -> ToolOutcome {
        hass_outcome(self.ctx.client.list_dashboards().await)
    }
}

struct GetDashboardConfigTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetDashboardConfigTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_dashboard_config".to_string(),
            description: "Get the full Lovelace configuration of a dashboard. Omit \
                          'dashboard_id' for the default dashboard."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "dashboard_id": {"type": "string", "description": "Dashboard url_path"},
                }),
                &[],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let dashboard_id = string_arg(&arguments, "dashboard_id");
        hass_outcome(fetch_config(&self.ctx, dashboard_id.as_deref()).await)
    }
}

struct SaveDashboardConfigTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for SaveDashboardConfigTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "save_dashboard_config".to_string(),
            description: "Replace a dashboard's entire Lovelace configuration (must include a \
                          'views' array). Previewed for confirmation before saving."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "config": {"type": "string", "description": "Full Lovelace config as a JSON string"},
                    "dashboard_id": {"type": "string", "description": "Dashboard url_path; omit for default"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(raw) = string_arg(&arguments, "config") else {
            return ToolOutcome::error("save_dashboard_config requires 'config'");
        };
        let config = match parse_json(&raw, "config") {
            Ok(config) => config,
            Err(error) => return ToolOutcome::error(error),
        };
        let dashboard_id = string_arg(&arguments, "dashboard_id");
        let identifier = dashboard_id.clone().unwrap_or_else(|| "default".to_string());
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let preview =
            ChangePreview::new(ChangeAction::Update, "dashboard", &identifier, config.clone());
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Dashboard config save cancelled by user.");
        }

        if let Err(error) = self
            .ctx
            .client
            .save_dashboard_config(&config, dashboard_id.as_deref())
            .await
        {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({"status": "saved", "dashboard_id": identifier}))
    }
}

struct GetViewTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for GetViewTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_view".to_string(),
            description: "Get one view of a dashboard by zero-based index.".to_string(),
            input_schema: object_schema(
                json!({
                    "view_index": {"type": "integer"},
                    "dashboard_id": {"type": "string", "description": "Omit for default"},
                }),
                &["view_index"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(view_index) = index_arg(&arguments, "view_index") else {
            return ToolOutcome::error("get_view requires integer 'view_index'");
        };
        let dashboard_id = string_arg(&arguments, "dashboard_id");
        let config = match fetch_config(&self.ctx, dashboard_id.as_deref()).await {
            Ok(config) => config,
            Err(error) => return hass_error(&error),
        };
        let views = views_of(&config);
        match views.into_iter().nth(view_index) {
            Some(view) => ToolOutcome::ok(view),
            None => out_of_range("View", view_index, views_of(&config).len()),
        }
    }
}

struct AddViewTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for AddViewTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "add_view".to_string(),
            description: "Insert a new view into a dashboard, appended unless a position is \
                          given. Previewed for confirmation before saving."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "view_config": {"type": "string", "description": "View config as a JSON string"},
                    "dashboard_id": {"type": "string", "description": "Omit for default"},
                    "position": {"type": "integer", "description": "Insertion index; append when omitted"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["view_config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(raw) = string_arg(&arguments, "view_config") else {
            return ToolOutcome::error("add_view requires 'view_config'");
        };
        let new_view = match parse_json(&raw, "view_config") {
            Ok(view) => view,
            Err(error) => return ToolOutcome::error(error),
        };
        let dashboard_id = string_arg(&arguments, "dashboard_id");
        let position = index_arg(&arguments, "position");
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let mut config = match fetch_config(&self.ctx, dashboard_id.as_deref()).await {
            Ok(config) => config,
            Err(error) => return hass_error(&error),
        };
        if !config.is_object() {
            return ToolOutcome::error("unexpected dashboard config payload");
        }
        let mut views = views_of(&config);
        let inserted_at = match position {
            Some(position) => {
                if position > views.len() {
                    return ToolOutcome::error(format!(
                        "Position {position} out of range. Valid range is 0-{}.",
                        views.len()
                    ));
                }
                views.insert(position, new_view.clone());
                position
            }
            None => {
                views.push(new_view.clone());
                views.len() - 1
            }
        };
        let total_views = views.len();
        config["views"] = Value::Array(views);

        let identifier = format!(
            "{} - {}",
            dashboard_id.as_deref().unwrap_or("default"),
            view_title(&new_view)
        );
        let preview =
            ChangePreview::new(ChangeAction::Create, "dashboard view", &identifier, config.clone());
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Add view cancelled by user.");
        }

        if let Err(error) = self
            .ctx
            .client
            .save_dashboard_config(&config, dashboard_id.as_deref())
            .await
        {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "added",
            "view_title": view_title(&new_view),
            "view_index": inserted_at,
            "total_views": total_views,
        }))
    }
}

struct UpdateViewTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for UpdateViewTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "update_view".to_string(),
            description: "Replace a dashboard view at a zero-based index. Previewed for \
                          confirmation before saving."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "view_index": {"type": "integer"},
                    "view_config": {"type": "string", "description": "New view config as a JSON string"},
                    "dashboard_id": {"type": "string", "description": "Omit for default"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["view_index", "view_config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(view_index) = index_arg(&arguments, "view_index") else {
            return ToolOutcome::error("update_view requires integer 'view_index'");
        };
        let Some(raw) = string_arg(&arguments, "view_config") else {
            return ToolOutcome::error("update_view requires 'view_config'");
        };
        let new_view = match parse_json(&raw, "view_config") {
            Ok(view) => view,
            Err(error) => return ToolOutcome::error(error),
        };
        let dashboard_id = string_arg(&arguments, "dashboard_id");
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let mut config = match fetch_config(&self.ctx, dashboard_id.as_deref()).await {
            Ok(config) => config,
            Err(error) => return hass_error(&error),
        };
        if !config.is_object() {
            return ToolOutcome::error("unexpected dashboard config payload");
        }
        let mut views = views_of(&config);
        if view_index >= views.len() {
            return out_of_range("View", view_index, views.len());
        }
        views[view_index] = new_view.clone();
        config["views"] = Value::Array(views);

        let identifier = format!(
            "{} - view[{view_index}]",
            dashboard_id.as_deref().unwrap_or("default")
        );
        let preview =
            ChangePreview::new(ChangeAction::Update, "dashboard view", &identifier, config.clone());
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Update view cancelled by user.");
        }

        if let Err(error) = self
            .ctx
            .client
            .save_dashboard_config(&config, dashboard_id.as_deref())
            .await
        {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "updated",
            "view_index": view_index,
            "view_title": view_title(&new_view),
        }))
    }
}

struct DeleteViewTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for DeleteViewTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "delete_view".to_string(),
            description: "Remove a dashboard view at a zero-based index. The removed view is \
                          shown for review before the irreversible save."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "view_index": {"type": "integer"},
                    "dashboard_id": {"type": "string", "description": "Omit for default"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["view_index"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(view_index) = index_arg(&arguments, "view_index") else {
            return ToolOutcome::error("delete_view requires integer 'view_index'");
        };
        let dashboard_id = string_arg(&arguments, "dashboard_id");
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let mut config = match fetch_config(&self.ctx, dashboard_id.as_deref()).await {
            Ok(config) => config,
            Err(error) => return hass_error(&error),
        };
        if !config.is_object() {
            return ToolOutcome::error("unexpected dashboard config payload");
        }
        let mut views = views_of(&config);
        if view_index >= views.len() {
            return out_of_range("View", view_index, views.len());
        }
        let removed = views.remove(view_index);
        let remaining = views.len();
        config["views"] = Value::Array(views);

        let identifier = format!(
            "{} - {}",
            dashboard_id.as_deref().unwrap_or("default"),
            view_title(&removed)
        );
        let preview =
            ChangePreview::new(ChangeAction::Delete, "dashboard view", &identifier, removed.clone());
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Delete view cancelled by user.");
        }

        if let Err(error) = self
            .ctx
            .client
            .save_dashboard_config(&config, dashboard_id.as_deref())
            .await
        {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "deleted",
            "deleted_view_title": view_title(&removed),
            "deleted_view_index": view_index,
            "remaining_views": remaining,
        }))
    }
}

struct AddCardTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for AddCardTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "add_card".to_string(),
            description: "Append a card to a dashboard view. The new card is previewed for \
                          confirmation before saving."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "view_index": {"type": "integer"},
                    "card_config": {"type": "string", "description": "Card config as a JSON string"},
                    "dashboard_id": {"type": "string", "description": "Omit for default"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["view_index", "card_config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(view_index) = index_arg(&arguments, "view_index") else {
            return ToolOutcome::error("add_card requires integer 'view_index'");
        };
        let Some(raw) = string_arg(&arguments, "card_config") else {
            return ToolOutcome::error("add_card requires 'card_config'");
        };
        let new_card = match parse_json(&raw, "card_config") {
            Ok(card) => card,
            Err(error) => return ToolOutcome::error(error),
        };
        let dashboard_id = string_arg(&arguments, "dashboard_id");
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let mut config = match fetch_config(&self.ctx, dashboard_id.as_deref()).await {
            Ok(config) => config,
            Err(error) => return hass_error(&error),
        };
        if !config.is_object() {
            return ToolOutcome::error("unexpected dashboard config payload");
        }
        let mut views = views_of(&config);
        if view_index >= views.len() {
            return out_of_range("View", view_index, views.len());
        }
        let mut cards = views[view_index]
            .get("cards")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        cards.push(new_card.clone());
        let card_index = cards.len() - 1;
        if !views[view_index].is_object() {
            return ToolOutcome::error("unexpected view payload");
        }
        views[view_index]["cards"] = Value::Array(cards);
        config["views"] = Value::Array(views);

        let identifier = format!(
            "{} - view[{view_index}]",
            dashboard_id.as_deref().unwrap_or("default")
        );
        let preview =
            ChangePreview::new(ChangeAction::Create, "dashboard card", &identifier, new_card.clone());
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Add card cancelled by user.");
        }

        if let Err(error) = self
            .ctx
            .client
            .save_dashboard_config(&config, dashboard_id.as_deref())
            .await
        {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "added",
            "card_type": new_card.get("type").and_then(Value::as_str).unwrap_or("unknown"),
            "card_index": card_index,
            "view_index": view_index,
        }))
    }
}

struct UpdateCardTool {
    ctx: ToolContext,
}

#[async_trait]
impl HearthTool for UpdateCardTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "update_card".to_string(),
            description: "Replace a card in a dashboard view by zero-based view and card index. \
                          Previewed for confirmation before saving."
                .to_string(),
            input_schema: object_schema(
                json!({
                    "view_index": {"type": "integer"},
                    "card_index": {"type": "integer"},
                    "card_config": {"type": "string", "description": "New card config as a JSON string"},
                    "dashboard_id": {"type": "string", "description": "Omit for default"},
                    "skip_confirm": {"type": "boolean"},
                }),
                &["view_index", "card_index", "card_config"],
            ),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let Some(view_index) = index_arg(&arguments, "view_index") else {
            return ToolOutcome::error("update_card requires integer 'view_index'");
        };
        let Some(card_index) = index_arg(&arguments, "card_index") else {
            return ToolOutcome::error("update_card requires integer 'card_index'");
        };
        let Some(raw) = string_arg(&arguments, "card_config") else {
            return ToolOutcome::error("update_card requires 'card_config'");
        };
        let new_card = match parse_json(&raw, "card_config") {
            Ok(card) => card,
            Err(error) => return ToolOutcome::error(error),
        };
        let dashboard_id = string_arg(&arguments, "dashboard_id");
        let skip_confirm = bool_arg(&arguments, "skip_confirm");

        let mut config = match fetch_config(&self.ctx, dashboard_id.as_deref()).await {
            Ok(config) => config,
            Err(error) => return hass_error(&error),
        };
        if !config.is_object() {
            return ToolOutcome::error("unexpected dashboard config payload");
        }
        let mut views = views_of(&config);
        if view_index >= views.len() {
            return out_of_range("View", view_index, views.len());
        }
        let mut cards = views[view_index]
            .get("cards")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if card_index >= cards.len() {
            return out_of_range("Card", card_index, cards.len());
        }
        cards[card_index] = new_card.clone();
        if !views[view_index].is_object() {
            return ToolOutcome::error("unexpected view payload");
        }
        views[view_index]["cards"] = Value::Array(cards);
        config["views"] = Value::Array(views);

        let identifier = format!(
            "{} - view[{view_index}]/card[{card_index}]",
            dashboard_id.as_deref().unwrap_or("default")
        );
        let preview =
            ChangePreview::new(ChangeAction::Update, "dashboard card", &identifier, new_card.clone());
        if !confirm_change(self.ctx.gateway.as_ref(), self.ctx.policy, &preview, skip_confirm).await
        {
            return cancelled("Update card cancelled by user.");
        }

        if let Err(error) = self
            .ctx
            .client
            .save_dashboard_config(&config, dashboard_id.as_deref())
            .await
        {
            return hass_error(&error);
        }
        ToolOutcome::ok(json!({
            "status": "updated",
            "card_type": new_card.get("type").and_then(Value::as_str).unwrap_or("unknown"),
            "card_index": card_index,
            "view_index": view_index,
        }))
    }
}
