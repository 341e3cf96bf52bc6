//! Persistent WebSocket client for the Home Assistant command channel.
//!
//! One connection per process. Commands are multiplexed over the socket with
//! monotonically increasing ids and routed back to their callers by a
//! background listener task. On connection loss every in-flight caller fails
//! fast and the client reconnects with exponential backoff until `close()`.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde_json::{json, Value};
use tokio::{
    net::TcpStream,
    sync::{oneshot, Semaphore},
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use crate::error::HassError;

const COMMAND_CONCURRENCY_LIMIT: usize = 10;
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;
const INITIAL_RECONNECT_DELAY_MS: u64 = 1_000;
const MAX_RECONNECT_DELAY_MS: u64 = 60_000;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Lifecycle states of the persistent connection.
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingAuth,
    Authenticated,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingAuth => "awaiting-auth",
            Self::Authenticated => "authenticated",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

struct WsShared {
    url: String,
    token: String,
    state: Mutex<ConnectionState>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    gate: Semaphore,
}

impl WsShared {
    fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Closed)
    }

    fn set_state(&self, next: ConnectionState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    fn register_waiter(&self, id: u64, sender: oneshot::Sender<Value>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, sender);
        }
    }

    fn take_waiter(&self, id: u64) -> Option<oneshot::Sender<Value>> {
        self.pending.lock().ok().and_then(|mut pending| pending.remove(&id))
    }

    /// Drops every pending waiter, which completes each caller with
    /// `ConnectionLost` exactly once.
    fn fail_pending(&self) {
        let drained = match self.pending.lock() {
            Ok(mut pending) => pending.drain().count(),
            Err(_) => 0,
        };
        if drained > 0 {
            tracing::warn!("failed {drained} pending command(s) after connection loss");
        }
    }
}

/// Async WebSocket client maintaining a persistent, authenticated connection
/// to the Home Assistant WebSocket API.
pub struct HassWsClient {
    shared: Arc<WsShared>,
    command_timeout: Duration,
}

impl HassWsClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(WsShared {
                url: url.into(),
                token: token.into(),
                state: Mutex::new(ConnectionState::Disconnected),
                next_id: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                sink: tokio::sync::Mutex::new(None),
                gate: Semaphore::new(COMMAND_CONCURRENCY_LIMIT),
            }),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn connected(&self) -> bool {
        self.shared.state() == ConnectionState::Authenticated
    }

    /// Connects and runs the authentication handshake.
    ///
    /// An authentication rejection is fatal for the attempt: the client stays
    /// disconnected and the reconnection loop is never entered.
    pub async fn connect(&self) -> Result<(), HassError> {
        self.shared.set_state(ConnectionState::Connecting);
        match establish(&self.shared).await {
            Ok(source) => {
                self.shared.set_state(ConnectionState::Authenticated);
                tokio::spawn(run_listener(Arc::clone(&self.shared), source));
                tracing::info!("connected to Home Assistant WebSocket API at {}", self.shared.url);
                Ok(())
            }
            Err(error) => {
                self.shared.set_state(ConnectionState::Disconnected);
                Err(error)
            }
        }
    }

    /// Sends a command and waits for the correlated response.
    ///
    /// `payload` must be a JSON object (or null) whose entries are merged into
    /// the outgoing envelope next to `id` and `type`.
    pub async fn send_command(&self, msg_type: &str, payload: Value) -> Result<Value, HassError> {
        match self.shared.state() {
            ConnectionState::Authenticated => {}
            ConnectionState::Reconnecting => {
                return Err(HassError::ConnectionLost(format!(
                    "cannot send '{msg_type}': connection is reconnecting; commands are not queued"
                )));
            }
            other => {
                return Err(HassError::Connection(format!(
                    "cannot send '{msg_type}': connection is {}",
                    other.label()
                )));
            }
        }

        let _permit = self
            .shared
            .gate
            .acquire()
            .await
            .map_err(|_| HassError::Connection("command gate is closed".to_string()))?;

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let envelope = command_envelope(id, msg_type, payload)?;
        let (sender, receiver) = oneshot::channel();
        self.shared.register_waiter(id, sender);

        {
            let mut sink = self.shared.sink.lock().await;
            let Some(sink) = sink.as_mut() else {
                self.shared.take_waiter(id);
                return Err(HassError::ConnectionLost(format!(
                    "cannot send '{msg_type}': socket is gone"
                )));
            };
            if let Err(error) = sink.send(WsMessage::Text(envelope.to_string().into())).await {
                self.shared.take_waiter(id);
                return Err(HassError::ConnectionLost(format!(
                    "failed to send '{msg_type}': {error}"
                )));
            }
        }
        tracing::debug!("sent command id={id} type={msg_type}");

        let response = match tokio::time::timeout(self.command_timeout, receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(HassError::ConnectionLost(format!(
                    "connection dropped while awaiting response to '{msg_type}'"
                )));
            }
            Err(_) => {
                self.shared.take_waiter(id);
                return Err(HassError::Connection(format!(
                    "timed out after {}ms waiting for response to '{msg_type}'",
                    self.command_timeout.as_millis()
                )));
            }
        };

        interpret_response(msg_type, response)
    }

    /// Gracefully shuts the connection down and stops reconnecting.
    pub async fn close(&self) {
        self.shared.set_state(ConnectionState::Closed);
        let mut sink = self.shared.sink.lock().await;
        if let Some(mut sink) = sink.take() {
            if let Err(error) = sink.close().await {
                tracing::debug!("error closing websocket: {error}");
            }
        }
        drop(sink);
        self.shared.fail_pending();
        tracing::info!("disconnected from Home Assistant WebSocket API");
    }
}

fn command_envelope(id: u64, msg_type: &str, payload: Value) -> Result<Value, HassError> {
    let mut envelope = serde_json::Map::new();
    envelope.insert("id".to_string(), json!(id));
    envelope.insert("type".to_string(), json!(msg_type));
    match payload {
        Value::Null => {}
        Value::Object(entries) => {
            for (key, value) in entries {
                envelope.insert(key, value);
            }
        }
        other => {
            return Err(HassError::Connection(format!(
                "command payload for '{msg_type}' must be a JSON object, got {other}"
            )));
        }
    }
    Ok(Value::Object(envelope))
}

fn interpret_response(msg_type: &str, response: Value) -> Result<Value, HassError> {
    let success = response
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    if success {
        return Ok(response.get("result").cloned().unwrap_or(response));
    }
    let error = response.get("error").cloned().unwrap_or(Value::Null);
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string();
    tracing::debug!("command '{msg_type}' rejected [{code}]: {message}");
    Err(HassError::Command { code, message })
}

/// Opens the socket and runs the bit-exact auth handshake, leaving the sink
/// installed on success. Returns the read half for the listener task.
async fn establish(shared: &Arc<WsShared>) -> Result<WsSource, HassError> {
    let (stream, _response) = connect_async(shared.url.as_str())
        .await
        .map_err(|error| HassError::Connection(format!("failed to connect to {}: {error}", shared.url)))?;
    let (mut sink, mut source) = stream.split();

    shared.set_state(ConnectionState::AwaitingAuth);
    authenticate(&mut sink, &mut source, &shared.token).await?;

    *shared.sink.lock().await = Some(sink);
    Ok(source)
}

async fn authenticate(
    sink: &mut WsSink,
    source: &mut WsSource,
    token: &str,
) -> Result<(), HassError> {
    let greeting = next_json_frame(source).await?;
    let greeting_type = greeting.get("type").and_then(Value::as_str).unwrap_or("");
    if greeting_type != "auth_required" {
        return Err(HassError::Connection(format!(
            "expected auth_required but got '{greeting_type}'"
        )));
    }

    let auth = json!({"type": "auth", "access_token": token});
    sink.send(WsMessage::Text(auth.to_string().into()))
        .await
        .map_err(|error| HassError::Connection(format!("failed to send auth message: {error}")))?;

    let verdict = next_json_frame(source).await?;
    match verdict.get("type").and_then(Value::as_str) {
        Some("auth_ok") => {
            tracing::debug!("authentication successful");
            Ok(())
        }
        Some("auth_invalid") => {
            let message = verdict
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Invalid access token");
            Err(HassError::Auth(message.to_string()))
        }
        other => Err(HassError::Connection(format!(
            "unexpected auth response type: {other:?}"
        ))),
    }
}

async fn next_json_frame(source: &mut WsSource) -> Result<Value, HassError> {
    while let Some(message) = source.next().await {
        let message = message
            .map_err(|error| HassError::Connection(format!("websocket read failed: {error}")))?;
        match message {
            WsMessage::Text(raw) => {
                return serde_json::from_str(&raw).map_err(|error| {
                    HassError::Connection(format!("invalid JSON frame during handshake: {error}"))
                });
            }
            WsMessage::Close(_) => {
                return Err(HassError::Connection(
                    "websocket closed during handshake".to_string(),
                ));
            }
            // Control frames are handled by the protocol layer.
            _ => {}
        }
    }
    Err(HassError::Connection(
        "websocket ended during handshake".to_string(),
    ))
}

/// Background task: demultiplexes incoming frames to their waiters, then
/// hands off to the reconnection loop when the stream ends.
fn run_listener(
    shared: Arc<WsShared>,
    mut source: WsSource,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    // Boxed return type (instead of `async fn`'s opaque `impl Future`) breaks
    // the mutual-recursion auto-trait cycle with `reconnect_loop`, which
    // re-spawns `run_listener`. Behavior is unchanged.
    Box::pin(async move {
        while let Some(next) = source.next().await {
            match next {
                Ok(WsMessage::Text(raw)) => dispatch_frame(&shared, &raw),
                Ok(WsMessage::Close(_)) => {
                    tracing::warn!("websocket closed by server");
                    break;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!("websocket read error: {error}");
                    break;
                }
            }
        }

        if shared.state() == ConnectionState::Closed {
            shared.fail_pending();
            return;
        }

        shared.set_state(ConnectionState::Reconnecting);
        *shared.sink.lock().await = None;
        shared.fail_pending();
        reconnect_loop(shared).await;
    })
}

fn dispatch_frame(shared: &Arc<WsShared>, raw: &str) {
    let frame: Value = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::warn!("dropping undecodable frame: {error}");
            return;
        }
    };
    if let Some(id) = frame.get("id").and_then(Value::as_u64) {
        if let Some(waiter) = shared.take_waiter(id) {
            // A failed send means the caller stopped waiting; the response is
            // discarded along with the registry entry.
            let _ = waiter.send(frame);
            return;
        }
        tracing::debug!("dropping frame with no registered waiter: id={id}");
        return;
    }
    if frame.get("type").and_then(Value::as_str) == Some("event") {
        tracing::debug!("ignoring event frame");
        return;
    }
    tracing::debug!("ignoring unaddressed frame: {frame}");
}

/// Retries the full connect-and-authenticate sequence with exponential
/// backoff until it succeeds or `close()` is requested.
fn reconnect_loop(
    shared: Arc<WsShared>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    // Boxed return type mirrors `run_listener`, closing the recursion cycle
    // with a concrete `Send` future type. Behavior is unchanged.
    Box::pin(async move {
        let mut delay = Duration::from_millis(INITIAL_RECONNECT_DELAY_MS);
        loop {
            if shared.state() == ConnectionState::Closed {
                return;
            }
            tracing::info!("reconnecting in {}ms", delay.as_millis());
            tokio::time::sleep(delay).await;
            if shared.state() == ConnectionState::Closed {
                return;
            }

            match establish(&shared).await {
                Ok(source) => {
                    shared.set_state(ConnectionState::Authenticated);
                    tracing::info!("reconnected to Home Assistant WebSocket API");
                    tokio::spawn(run_listener(shared, source));
                    return;
                }
                Err(error) => {
                    tracing::warn!("reconnect attempt failed: {error}");
                    shared.set_state(ConnectionState::Reconnecting);
                    delay = (delay * 2).min(Duration::from_millis(MAX_RECONNECT_DELAY_MS));
                }
            }
        }
    })
}
