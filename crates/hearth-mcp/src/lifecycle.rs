//! Session lifecycle: bring both transports up at startup, publish the
//! facade, tear everything down at shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};

use hearth_client::{HassClient, HassRestClient, HassWsClient};

use crate::config::RuntimeConfig;

/// Live transports for the duration of the process.
pub struct SessionContext {
    pub client: Arc<HassClient>,
    ws: Arc<HassWsClient>,
}

/// Connects both channels. The WebSocket authentication handshake must
/// complete before this returns; the REST credential is validated lazily on
/// first call.
pub async fn start_session(config: &RuntimeConfig) -> Result<SessionContext> {
    tracing::info!("connecting to Home Assistant at {}", config.base_url());

    let ws = Arc::new(
        HassWsClient::new(config.websocket_url(), config.token())
            .with_command_timeout(Duration::from_millis(config.command_timeout_ms)),
    );
    ws.connect()
        .await
        .context("failed to connect the WebSocket channel")?;

    let rest = HassRestClient::new(config.base_url(), config.token())
        .context("failed to build the REST client")?;

    let client = Arc::new(HassClient::new(Arc::clone(&ws), rest));
    tracing::info!("connected to Home Assistant successfully");
    Ok(SessionContext { client, ws })
}

/// Closes the command channel first, then drops the query channel with it.
/// Teardown is best-effort: nothing here may prevent process exit.
pub async fn shutdown_session(session: &SessionContext) {
    tracing::info!("disconnecting from Home Assistant");
    session.ws.close().await;
}
