use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use hearth_tools::{build_tool_registry, ConfirmPolicy, ConfirmationGateway, ToolContext};

use hearth_mcp::{
    bootstrap::init_tracing,
    elicit::{ElicitationRouter, McpElicitationGateway},
    lifecycle::{shutdown_session, start_session},
    serve, Cli, RuntimeConfig, ServeReport, ServerState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = RuntimeConfig::new(
        &cli.url,
        &cli.token,
        cli.approve_unsupported,
        cli.command_timeout_ms,
    )?;

    let session = start_session(&config)
        .await
        .context("failed to connect to Home Assistant")?;

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let router = Arc::new(ElicitationRouter::new(outbound_tx.clone()));
    let gateway: Arc<dyn ConfirmationGateway> =
        Arc::new(McpElicitationGateway::new(Arc::clone(&router)));
    let tool_context = ToolContext {
        client: Arc::clone(&session.client),
        gateway,
        policy: ConfirmPolicy {
            approve_when_unsupported: config.approve_when_unsupported,
        },
    };
    let registry = build_tool_registry(&tool_context);
    tracing::info!("serving {} tools over stdio", registry.len());
    let state = Arc::new(ServerState::new(registry, outbound_tx, router));

    let report = tokio::select! {
        result = serve(tokio::io::stdin(), tokio::io::stdout(), state, outbound_rx) => {
            result.context("mcp server loop failed")?
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            ServeReport::default()
        }
    };

    shutdown_session(&session).await;
    tracing::info!(
        "served {} frame(s), {} error(s)",
        report.processed_frames,
        report.error_count
    );
    Ok(())
}
