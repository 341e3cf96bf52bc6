//! Interactive confirmation bridged over MCP elicitation.
//!
//! The server sends an `elicitation/create` request to the connected client
//! and suspends the soliciting tool call until the client's response frame
//! is routed back by id, mirroring the command channel's demultiplexing.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use hearth_tools::{ConfirmationDecision, ConfirmationGateway};

const ELICITATION_ID_PREFIX: &str = "hearth-confirm-";

/// Correlates outgoing elicitation requests with incoming response frames.
pub struct ElicitationRouter {
    outbound: mpsc::UnboundedSender<Value>,
    supported: AtomicBool,
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl ElicitationRouter {
    pub fn new(outbound: mpsc::UnboundedSender<Value>) -> Self {
        Self {
            outbound,
            supported: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Recorded from the client's `initialize` capabilities.
    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    pub fn supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    /// Routes a response frame to its waiter. Returns false when the id is
    /// unknown, in which case the frame is dropped by the caller.
    pub fn complete(&self, id: &str, frame: Value) -> bool {
        let waiter = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(id));
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(frame);
                true
            }
            None => false,
        }
    }

    fn register(&self) -> Option<(String, oneshot::Receiver<Value>)> {
        let id = format!(
            "{ELICITATION_ID_PREFIX}{}",
            self.next_id.fetch_add(1, Ordering::Relaxed) + 1
        );
        let (sender, receiver) = oneshot::channel();
        let mut pending = self.pending.lock().ok()?;
        pending.insert(id.clone(), sender);
        Some((id, receiver))
    }

    fn discard(&self, id: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(id);
        }
    }
}

/// `ConfirmationGateway` implementation over the router.
pub struct McpElicitationGateway {
    router: Arc<ElicitationRouter>,
}

impl McpElicitationGateway {
    pub fn new(router: Arc<ElicitationRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl ConfirmationGateway for McpElicitationGateway {
    async fn solicit(&self, preview: &str) -> ConfirmationDecision {
        if !self.router.supported() {
            return ConfirmationDecision::Unsupported;
        }
        let Some((id, receiver)) = self.router.register() else {
            return ConfirmationDecision::Unsupported;
        };

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "elicitation/create",
            "params": {
                "message": preview,
                "requestedSchema": {
                    "type": "object",
                    "properties": {
                        "confirm": {
                            "type": "boolean",
                            "title": "Apply this change?",
                        },
                    },
                    "required": ["confirm"],
                },
            },
        });
        if self.router.outbound.send(request).is_err() {
            self.router.discard(&id);
            return ConfirmationDecision::Unsupported;
        }

        // No timeout here: solicitation timeouts belong to the hosting
        // framework. The waiter resolves when the client answers or the
        // connection goes away.
        match receiver.await {
            Ok(frame) => map_elicitation_response(&frame),
            Err(_) => ConfirmationDecision::Unsupported,
        }
    }
}

/// Maps an elicitation response frame to a decision. Error frames (e.g.
/// method-not-found from an older client) count as unsupported.
pub fn map_elicitation_response(frame: &Value) -> ConfirmationDecision {
    if frame.get("error").is_some() {
        return ConfirmationDecision::Unsupported;
    }
    let result = frame.get("result").cloned().unwrap_or(Value::Null);
    let accepted = result.get("action").and_then(Value::as_str) == Some("accept");
    let confirmed = result
        .get("content")
        .and_then(|content| content.get("confirm"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if accepted && confirmed {
        ConfirmationDecision::Approved
    } else {
        ConfirmationDecision::Rejected
    }
}
