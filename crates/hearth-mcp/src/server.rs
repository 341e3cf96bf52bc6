//! Content-Length framed JSON-RPC 2.0 server loop over stdio.
//!
//! The loop is generic over its reader and writer so tests can drive it with
//! in-memory pipes. Incoming requests dispatch to the tool registry; frames
//! that carry a result instead of a method are responses to server-initiated
//! elicitation requests and are demultiplexed by id. Tool calls run as
//! spawned tasks so the read loop keeps draining while a call waits on a
//! confirmation.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Map, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
};

use hearth_tools::{ToolOutcome, ToolRegistry};

use crate::{
    elicit::ElicitationRouter,
    prompts::{prompt_list_payload, render_prompt, PROMPTS},
};

const JSONRPC_VERSION: &str = "2.0";
const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const ERROR_PARSE: i64 = -32700;
const ERROR_INVALID_REQUEST: i64 = -32600;
const ERROR_METHOD_NOT_FOUND: i64 = -32601;
const ERROR_INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, Default)]
/// Frame counters reported when the serve loop ends.
pub struct ServeReport {
    pub processed_frames: usize,
    pub error_count: usize,
}

/// Shared state of one server session.
pub struct ServerState {
    registry: ToolRegistry,
    outbound: mpsc::UnboundedSender<Value>,
    elicitations: Arc<ElicitationRouter>,
}

impl ServerState {
    pub fn new(
        registry: ToolRegistry,
        outbound: mpsc::UnboundedSender<Value>,
        elicitations: Arc<ElicitationRouter>,
    ) -> Self {
        Self {
            registry,
            outbound,
            elicitations,
        }
    }

    fn send(&self, frame: Value) {
        // A send failure means the writer is gone and the session is over.
        let _ = self.outbound.send(frame);
    }
}

/// Runs the server until the reader reaches EOF.
///
/// `outbound` is the single funnel to the writer: dispatch replies and
/// elicitation requests all go through it, so the writer has one owner.
pub async fn serve<R, W>(
    reader: R,
    mut writer: W,
    state: Arc<ServerState>,
    mut outbound: mpsc::UnboundedReceiver<Value>,
) -> Result<ServeReport>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let (frames_tx, mut frames) = mpsc::unbounded_channel();
    let reader_task = tokio::spawn(read_loop(reader, frames_tx));

    let mut report = ServeReport::default();
    loop {
        tokio::select! {
            maybe_frame = frames.recv() => {
                match maybe_frame {
                    None => break,
                    Some(Ok(frame)) => {
                        report.processed_frames = report.processed_frames.saturating_add(1);
                        handle_frame(frame, &state, &mut report);
                    }
                    Some(Err(message)) => {
                        report.error_count = report.error_count.saturating_add(1);
                        state.send(error_frame(
                            Value::Null,
                            ERROR_PARSE,
                            format!("failed to read frame: {message}"),
                        ));
                        break;
                    }
                }
            }
            Some(frame) = outbound.recv() => {
                write_frame(&mut writer, &frame).await?;
            }
        }
    }

    // Flush replies that were queued before the reader went away.
    while let Ok(frame) = outbound.try_recv() {
        write_frame(&mut writer, &frame).await?;
    }
    reader_task.abort();
    Ok(report)
}

async fn read_loop<R>(reader: R, frames: mpsc::UnboundedSender<Result<Value, String>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if frames.send(Ok(frame)).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(error) => {
                let _ = frames.send(Err(error.to_string()));
                return;
            }
        }
    }
}

async fn read_frame<R>(reader: &mut BufReader<R>) -> Result<Option<Value>>
where
    R: AsyncRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    loop {
        let mut line = String::new();
        let bytes = reader
            .read_line(&mut line)
            .await
            .context("failed to read frame header line")?;
        if bytes == 0 {
            if saw_header {
                bail!("unexpected eof while reading frame headers");
            }
            return Ok(None);
        }
        saw_header = true;
        if line == "\n" || line == "\r\n" {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let (name, value) = trimmed
            .split_once(':')
            .ok_or_else(|| anyhow!("invalid frame header '{trimmed}': expected 'Name: value'"))?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            let parsed = value
                .trim()
                .parse::<usize>()
                .context("invalid Content-Length header value")?;
            content_length = Some(parsed);
        }
    }

    let content_length =
        content_length.ok_or_else(|| anyhow!("frame is missing Content-Length header"))?;
    let mut body = vec![0_u8; content_length];
    reader
        .read_exact(&mut body)
        .await
        .context("failed to read frame body")?;
    serde_json::from_slice(&body)
        .context("frame body is not valid JSON")
        .map(Some)
}

/// Writes one Content-Length framed JSON value.
pub async fn write_frame<W>(writer: &mut W, value: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = serde_json::to_vec(value).context("failed to encode frame")?;
    let header = format!("Content-Length: {}\r\n\r\n", encoded.len());
    writer
        .write_all(header.as_bytes())
        .await
        .context("failed to write frame header")?;
    writer
        .write_all(&encoded)
        .await
        .context("failed to write frame body")?;
    writer.flush().await.context("failed to flush frame")?;
    Ok(())
}

#[derive(Debug)]
struct JsonRpcRequest {
    id: Option<Value>,
    method: String,
    params: Map<String, Value>,
}

#[derive(Debug)]
struct DispatchError {
    id: Value,
    code: i64,
    message: String,
}

fn handle_frame(frame: Value, state: &Arc<ServerState>, report: &mut ServeReport) {
    let Some(object) = frame.as_object() else {
        report.error_count = report.error_count.saturating_add(1);
        state.send(error_frame(
            Value::Null,
            ERROR_INVALID_REQUEST,
            "jsonrpc frame must be an object",
        ));
        return;
    };

    if object.contains_key("method") {
        match parse_request(object) {
            Ok(request) => dispatch_request(request, state, report),
            Err(error) => {
                report.error_count = report.error_count.saturating_add(1);
                state.send(error_frame(error.id, error.code, error.message));
            }
        }
        return;
    }

    // No method: this is a response to a server-initiated request.
    let id = match object.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    if !state.elicitations.complete(&id, frame.clone()) {
        tracing::debug!("dropping response frame with no registered waiter: id={id}");
    }
}

fn parse_request(object: &Map<String, Value>) -> Result<JsonRpcRequest, DispatchError> {
    let id = object.get("id").cloned();
    let error_id = id.clone().unwrap_or(Value::Null);

    let jsonrpc = object
        .get("jsonrpc")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if jsonrpc != JSONRPC_VERSION {
        return Err(DispatchError {
            id: error_id,
            code: ERROR_INVALID_REQUEST,
            message: format!("jsonrpc must be '{JSONRPC_VERSION}'"),
        });
    }
    let method = object
        .get("method")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|method| !method.is_empty())
        .ok_or_else(|| DispatchError {
            id: error_id.clone(),
            code: ERROR_INVALID_REQUEST,
            message: "jsonrpc request must include non-empty method".to_string(),
        })?;
    let params = match object.get("params") {
        Some(Value::Object(params)) => params.clone(),
        Some(_) => {
            return Err(DispatchError {
                id: error_id,
                code: ERROR_INVALID_PARAMS,
                message: "jsonrpc request params must be an object".to_string(),
            });
        }
        None => Map::new(),
    };
    Ok(JsonRpcRequest {
        id,
        method: method.to_string(),
        params,
    })
}

fn dispatch_request(request: JsonRpcRequest, state: &Arc<ServerState>, report: &mut ServeReport) {
    let Some(id) = request.id else {
        // Notifications get no reply.
        tracing::debug!("notification: {}", request.method);
        return;
    };

    match request.method.as_str() {
        "initialize" => {
            let supported = request
                .params
                .get("capabilities")
                .and_then(|capabilities| capabilities.get("elicitation"))
                .is_some();
            state.elicitations.set_supported(supported);
            tracing::info!(
                "client initialized (elicitation {})",
                if supported { "supported" } else { "not supported" }
            );
            state.send(result_frame(id, initialize_payload()));
        }
        "tools/list" => {
            state.send(result_frame(id, tools_list_payload(&state.registry)));
        }
        "tools/call" => {
            let state = Arc::clone(state);
            let params = request.params;
            tokio::spawn(async move {
                let frame = match handle_tools_call(&state, &params).await {
                    Ok(result) => result_frame(id, result),
                    Err(message) => error_frame(id, ERROR_INVALID_PARAMS, message),
                };
                state.send(frame);
            });
        }
        "prompts/list" => {
            state.send(result_frame(id, prompt_list_payload()));
        }
        "prompts/get" => {
            state.send(handle_prompts_get(id, &request.params));
        }
        other => {
            report.error_count = report.error_count.saturating_add(1);
            state.send(error_frame(
                id,
                ERROR_METHOD_NOT_FOUND,
                format!("unsupported method '{other}'"),
            ));
        }
    }
}

fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "serverInfo": {
            "name": "hearth-mcp",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "tools": {"listChanged": false},
            "prompts": {"listChanged": false},
        },
    })
}

fn tools_list_payload(registry: &ToolRegistry) -> Value {
    // BTreeMap iteration keeps the listing sorted by name.
    let tools: Vec<Value> = registry
        .values()
        .map(|tool| {
            let definition = tool.definition();
            json!({
                "name": definition.name,
                "description": definition.description,
                "inputSchema": definition.input_schema,
            })
        })
        .collect();
    json!({"tools": tools})
}

async fn handle_tools_call(
    state: &ServerState,
    params: &Map<String, Value>,
) -> Result<Value, String> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| "tools/call requires non-empty field 'name'".to_string())?;
    let arguments = match params.get("arguments") {
        Some(arguments @ Value::Object(_)) => arguments.clone(),
        Some(_) => return Err("tools/call field 'arguments' must be an object".to_string()),
        None => json!({}),
    };
    let tool = state
        .registry
        .get(name)
        .ok_or_else(|| format!("unknown tool '{name}'"))?;
    Ok(tool_call_result(tool.invoke(arguments).await))
}

fn tool_call_result(outcome: ToolOutcome) -> Value {
    let text = serde_json::to_string_pretty(&outcome.content)
        .unwrap_or_else(|_| "{\"error\":\"failed to serialize tool result\"}".to_string());
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": outcome.is_error,
        "structuredContent": outcome.content,
    })
}

fn handle_prompts_get(id: Value, params: &Map<String, Value>) -> Value {
    let Some(name) = params
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
    else {
        return error_frame(
            id,
            ERROR_INVALID_PARAMS,
            "prompts/get requires non-empty field 'name'",
        );
    };
    let arguments = match params.get("arguments") {
        Some(Value::Object(arguments)) => arguments.clone(),
        _ => Map::new(),
    };
    match render_prompt(name, &arguments) {
        Ok(text) => {
            let description = PROMPTS
                .iter()
                .find(|prompt| prompt.name == name)
                .map(|prompt| prompt.description)
                .unwrap_or_default();
            result_frame(
                id,
                json!({
                    "description": description,
                    "messages": [{
                        "role": "user",
                        "content": {"type": "text", "text": text},
                    }],
                }),
            )
        }
        Err(message) => error_frame(id, ERROR_INVALID_PARAMS, message),
    }
}

fn result_frame(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

fn error_frame(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": code,
            "message": message.into(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::{
        parse_request, read_frame, tool_call_result, write_frame, ERROR_INVALID_PARAMS,
        ERROR_INVALID_REQUEST,
    };
    use hearth_tools::ToolOutcome;
    use serde_json::{json, Map, Value};
    use tokio::io::BufReader;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn frames_round_trip_through_the_codec() {
        let (mut client, server) = tokio::io::duplex(4096);
        let frame = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
        write_frame(&mut client, &frame).await.expect("write");
        drop(client);

        let mut reader = BufReader::new(server);
        let decoded = read_frame(&mut reader).await.expect("read").expect("frame");
        assert_eq!(decoded, frame);
        assert!(read_frame(&mut reader).await.expect("eof").is_none());
    }

    #[test]
    fn requests_require_the_jsonrpc_version() {
        let error = parse_request(&object(json!({"id": 1, "method": "tools/list"}))).unwrap_err();
        assert_eq!(error.code, ERROR_INVALID_REQUEST);

        let ok = parse_request(&object(
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        ))
        .expect("request");
        assert_eq!(ok.method, "tools/list");
        assert!(ok.params.is_empty());
    }

    #[test]
    fn non_object_params_are_rejected() {
        let error = parse_request(&object(
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": [1]}),
        ))
        .unwrap_err();
        assert_eq!(error.code, ERROR_INVALID_PARAMS);
    }

    #[test]
    fn notifications_parse_without_an_id() {
        let request = parse_request(&object(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ))
        .expect("notification");
        assert!(request.id.is_none());
    }

    #[test]
    fn tool_call_results_wrap_content_and_error_flag() {
        let result = tool_call_result(ToolOutcome::ok(json!({"status": "created"})));
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["structuredContent"]["status"], json!("created"));
        assert!(result["content"][0]["text"]
            .as_str()
            .expect("text")
            .contains("created"));

        let error = tool_call_result(ToolOutcome::error("nope"));
        assert_eq!(error["isError"], json!(true));
    }
}
