//! Tool catalog and confirmation layer for the Hearth MCP server.
//!
//! Exposes the explicit tool registry, the dry-run confirmation
//! orchestrator, and the rule-based analysis engine behind the suggestion
//! tools.

pub mod analysis;
pub mod confirm;
pub mod registry;
pub mod tools;
pub mod yaml;

pub use confirm::{
    confirm_change, ChangeAction, ChangePreview, ConfirmPolicy, ConfirmationDecision,
    ConfirmationGateway,
};
pub use registry::{
    build_tool_registry, HearthTool, ToolContext, ToolDefinition, ToolOutcome, ToolRegistry,
};
