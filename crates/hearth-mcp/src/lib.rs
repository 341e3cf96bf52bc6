//! MCP stdio server runtime for Home Assistant configuration management.
//!
//! Wires the client layer and the tool catalog into a Content-Length framed
//! JSON-RPC loop over stdin/stdout, with interactive confirmation bridged
//! through MCP elicitation.

pub mod bootstrap;
pub mod cli_args;
pub mod config;
pub mod elicit;
pub mod lifecycle;
pub mod prompts;
pub mod server;

pub use cli_args::Cli;
pub use config::RuntimeConfig;
pub use elicit::{ElicitationRouter, McpElicitationGateway};
pub use lifecycle::{shutdown_session, start_session, SessionContext};
pub use server::{serve, write_frame, ServeReport, ServerState};
