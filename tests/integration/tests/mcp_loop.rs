//! Drives the MCP server loop over in-memory pipes: initialize, tools/list,
//! tools/call, and the elicitation-backed confirmation paths.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader, ReadHalf},
    sync::mpsc,
};

use hearth_mcp::{
    serve, write_frame, ElicitationRouter, McpElicitationGateway, ServerState,
};
use hearth_tools::{
    confirm_change, ChangeAction, ChangePreview, ConfirmPolicy, ConfirmationGateway, HearthTool,
    ToolDefinition, ToolOutcome, ToolRegistry,
};

struct EchoTool;

#[async_trait]
impl HearthTool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echoes its arguments".to_string(),
            input_schema: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        ToolOutcome::ok(json!({"echo": arguments}))
    }
}

/// A mutating tool guarded by the confirmation orchestrator; `applied`
/// records whether the write path was reached.
struct GuardedWriteTool {
    gateway: Arc<dyn ConfirmationGateway>,
    policy: ConfirmPolicy,
    applied: Arc<AtomicBool>,
}

#[async_trait]
impl HearthTool for GuardedWriteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "guarded_write".to_string(),
            description: "Applies a change behind the confirmation gate".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"skip_confirm": {"type": "boolean"}},
                "required": [],
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> ToolOutcome {
        let bypass = arguments
            .get("skip_confirm")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let preview = ChangePreview::new(
            ChangeAction::Create,
            "automation",
            "Test Automation",
            json!({"alias": "Test Automation"}),
        );
        if !confirm_change(self.gateway.as_ref(), self.policy, &preview, bypass).await {
            return ToolOutcome::ok(json!({"status": "cancelled"}));
        }
        self.applied.store(true, Ordering::SeqCst);
        ToolOutcome::ok(json!({"status": "applied"}))
    }
}

struct Harness {
    writer: tokio::io::WriteHalf<tokio::io::DuplexStream>,
    reader: BufReader<ReadHalf<tokio::io::DuplexStream>>,
    applied: Arc<AtomicBool>,
    next_id: u64,
}

impl Harness {
    fn start(policy: ConfirmPolicy) -> Self {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, server_write) = tokio::io::split(server_io);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let router = Arc::new(ElicitationRouter::new(outbound_tx.clone()));
        let gateway: Arc<dyn ConfirmationGateway> =
            Arc::new(McpElicitationGateway::new(Arc::clone(&router)));
        let applied = Arc::new(AtomicBool::new(false));

        let mut registry = ToolRegistry::new();
        registry.insert("echo".to_string(), Arc::new(EchoTool));
        registry.insert(
            "guarded_write".to_string(),
            Arc::new(GuardedWriteTool {
                gateway,
                policy,
                applied: Arc::clone(&applied),
            }),
        );

        let state = Arc::new(ServerState::new(registry, outbound_tx, router));
        tokio::spawn(serve(server_read, server_write, state, outbound_rx));

        Self {
            writer: client_write,
            reader: BufReader::new(client_read),
            applied,
            next_id: 0,
        }
    }

    async fn send(&mut self, frame: Value) {
        write_frame(&mut self.writer, &frame).await.expect("write frame");
    }

    async fn request(&mut self, method: &str, params: Value) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await;
        id
    }

    async fn read_frame(&mut self) -> Value {
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            let bytes = self.reader.read_line(&mut line).await.expect("header line");
            assert!(bytes > 0, "unexpected eof from server");
            if line == "\r\n" || line == "\n" {
                break;
            }
            if let Some((name, value)) = line.trim_end().split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().expect("content length");
                }
            }
        }
        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await.expect("frame body");
        serde_json::from_slice(&body).expect("frame json")
    }

    async fn initialize(&mut self, with_elicitation: bool) -> Value {
        let capabilities = if with_elicitation {
            json!({"elicitation": {}})
        } else {
            json!({})
        };
        let id = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": capabilities,
                    "clientInfo": {"name": "hearth-tests", "version": "0.0.0"},
                }),
            )
            .await;
        let response = self.read_frame().await;
        assert_eq!(response["id"], json!(id));
        self.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        response
    }
}

#[tokio::test]
async fn initialize_and_tools_list_round_trip() {
    let mut harness = Harness::start(ConfirmPolicy::default());

    let response = harness.initialize(false).await;
    assert_eq!(response["result"]["protocolVersion"], json!("2024-11-05"));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("hearth-mcp"));

    let id = harness.request("tools/list", json!({})).await;
    let listing = harness.read_frame().await;
    assert_eq!(listing["id"], json!(id));
    let tools = listing["result"]["tools"].as_array().expect("tools");
    let names: Vec<&str> = tools
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert_eq!(names, vec!["echo", "guarded_write"]);
}

#[tokio::test]
async fn tools_call_executes_and_wraps_the_outcome() {
    let mut harness = Harness::start(ConfirmPolicy::default());
    harness.initialize(false).await;

    let id = harness
        .request(
            "tools/call",
            json!({"name": "echo", "arguments": {"x": 1}}),
        )
        .await;
    let response = harness.read_frame().await;
    assert_eq!(response["id"], json!(id));
    assert_eq!(response["result"]["isError"], json!(false));
    assert_eq!(response["result"]["structuredContent"]["echo"]["x"], json!(1));

    let unknown = harness
        .request("tools/call", json!({"name": "no_such_tool"}))
        .await;
    let error = harness.read_frame().await;
    assert_eq!(error["id"], json!(unknown));
    assert!(error["error"]["message"]
        .as_str()
        .expect("message")
        .contains("no_such_tool"));
}

#[tokio::test]
async fn elicitation_approval_reaches_the_write_path() {
    let mut harness = Harness::start(ConfirmPolicy::default());
    harness.initialize(true).await;

    let call_id = harness
        .request("tools/call", json!({"name": "guarded_write", "arguments": {}}))
        .await;

    // The server asks before writing.
    let elicitation = harness.read_frame().await;
    assert_eq!(elicitation["method"], json!("elicitation/create"));
    let message = elicitation["params"]["message"].as_str().expect("message");
    assert!(message.contains("CREATE automation: Test Automation"));
    let elicitation_id = elicitation["id"].clone();

    harness
        .send(json!({
            "jsonrpc": "2.0",
            "id": elicitation_id,
            "result": {"action": "accept", "content": {"confirm": true}},
        }))
        .await;

    let response = harness.read_frame().await;
    assert_eq!(response["id"], json!(call_id));
    assert_eq!(response["result"]["structuredContent"]["status"], json!("applied"));
    assert!(harness.applied.load(Ordering::SeqCst));
}

#[tokio::test]
async fn rejection_cancels_without_touching_the_write_path() {
    let mut harness = Harness::start(ConfirmPolicy::default());
    harness.initialize(true).await;

    let call_id = harness
        .request("tools/call", json!({"name": "guarded_write", "arguments": {}}))
        .await;
    let elicitation = harness.read_frame().await;
    harness
        .send(json!({
            "jsonrpc": "2.0",
            "id": elicitation["id"].clone(),
            "result": {"action": "decline"},
        }))
        .await;

    let response = harness.read_frame().await;
    assert_eq!(response["id"], json!(call_id));
    assert_eq!(
        response["result"]["structuredContent"]["status"],
        json!("cancelled")
    );
    assert!(!harness.applied.load(Ordering::SeqCst));
}

#[tokio::test]
async fn unsupported_client_with_default_policy_is_denied() {
    let mut harness = Harness::start(ConfirmPolicy::default());
    harness.initialize(false).await;

    let call_id = harness
        .request("tools/call", json!({"name": "guarded_write", "arguments": {}}))
        .await;
    // No elicitation frame: the very next frame is the cancelled result.
    let response = harness.read_frame().await;
    assert_eq!(response["id"], json!(call_id));
    assert_eq!(
        response["result"]["structuredContent"]["status"],
        json!("cancelled")
    );
    assert!(!harness.applied.load(Ordering::SeqCst));
}

#[tokio::test]
async fn unsupported_client_with_approve_policy_proceeds() {
    let mut harness = Harness::start(ConfirmPolicy {
        approve_when_unsupported: true,
    });
    harness.initialize(false).await;

    harness
        .request("tools/call", json!({"name": "guarded_write", "arguments": {}}))
        .await;
    let response = harness.read_frame().await;
    assert_eq!(response["result"]["structuredContent"]["status"], json!("applied"));
    assert!(harness.applied.load(Ordering::SeqCst));
}

#[tokio::test]
async fn bypass_skips_solicitation_even_when_supported() {
    let mut harness = Harness::start(ConfirmPolicy::default());
    harness.initialize(true).await;

    let call_id = harness
        .request(
            "tools/call",
            json!({"name": "guarded_write", "arguments": {"skip_confirm": true}}),
        )
        .await;
    // The next frame must already be the result, not an elicitation request.
    let response = harness.read_frame().await;
    assert_eq!(response["id"], json!(call_id));
    assert_eq!(response["result"]["structuredContent"]["status"], json!("applied"));
    assert!(harness.applied.load(Ordering::SeqCst));
}

#[tokio::test]
async fn prompts_are_listed_and_rendered() {
    let mut harness = Harness::start(ConfirmPolicy::default());
    harness.initialize(false).await;

    let list_id = harness.request("prompts/list", json!({})).await;
    let listing = harness.read_frame().await;
    assert_eq!(listing["id"], json!(list_id));
    assert!(listing["result"]["prompts"]
        .as_array()
        .expect("prompts")
        .iter()
        .any(|prompt| prompt["name"] == json!("create_automation_wizard")));

    let get_id = harness
        .request(
            "prompts/get",
            json!({
                "name": "create_automation_wizard",
                "arguments": {"description": "turn on the porch light at sunset"},
            }),
        )
        .await;
    let prompt = harness.read_frame().await;
    assert_eq!(prompt["id"], json!(get_id));
    let text = prompt["result"]["messages"][0]["content"]["text"]
        .as_str()
        .expect("text");
    assert!(text.contains("turn on the porch light at sunset"));
}

#[tokio::test]
async fn unknown_methods_get_method_not_found() {
    let mut harness = Harness::start(ConfirmPolicy::default());
    harness.initialize(false).await;

    let id = harness.request("resources/list", json!({})).await;
    let response = harness.read_frame().await;
    assert_eq!(response["id"], json!(id));
    assert_eq!(response["error"]["code"], json!(-32601));
}
