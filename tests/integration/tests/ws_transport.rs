//! End-to-end tests for the WebSocket command transport against an
//! in-process mock Home Assistant server.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use hearth_client::{ConnectionState, HassError, HassWsClient};

const TOKEN: &str = "test-token";

fn text(value: &Value) -> Message {
    Message::Text(value.to_string().into())
}

fn success_reply(id: u64, result: Value) -> Value {
    json!({"id": id, "type": "result", "success": true, "result": result})
}

/// Runs the bit-exact auth handshake on an accepted socket. Returns the
/// stream and whether the presented token was valid.
async fn handshake(stream: TcpStream) -> Option<(WebSocketStream<TcpStream>, bool)> {
    let mut ws = accept_async(stream).await.ok()?;
    ws.send(text(&json!({"type": "auth_required"}))).await.ok()?;
    let auth: Value = loop {
        match ws.next().await? {
            Ok(Message::Text(raw)) => break serde_json::from_str(&raw).ok()?,
            Ok(_) => continue,
            Err(_) => return None,
        }
    };
    let valid = auth.get("type").and_then(Value::as_str) == Some("auth")
        && auth.get("access_token").and_then(Value::as_str) == Some(TOKEN);
    let verdict = if valid {
        json!({"type": "auth_ok"})
    } else {
        json!({"type": "auth_invalid", "message": "Invalid access token"})
    };
    ws.send(text(&verdict)).await.ok()?;
    Some((ws, valid))
}

async fn next_command(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(raw)) => return serde_json::from_str(&raw).ok(),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

#[tokio::test]
async fn responses_reach_their_own_callers_under_reordering() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (mut ws, valid) = handshake(stream).await.expect("handshake");
        assert!(valid);

        let mut commands = Vec::new();
        while commands.len() < 2 {
            commands.push(next_command(&mut ws).await.expect("command"));
        }
        // Reply in reverse arrival order; demultiplexing is by id.
        for command in commands.iter().rev() {
            let id = command["id"].as_u64().expect("id");
            let reply = success_reply(id, json!({"echo": command["type"]}));
            ws.send(text(&reply)).await.expect("reply");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let client = HassWsClient::new(format!("ws://{addr}/api/websocket"), TOKEN);
    client.connect().await.expect("connect");

    let (first, second) = tokio::join!(
        client.send_command("first_command", Value::Null),
        client.send_command("second_command", Value::Null),
    );
    assert_eq!(first.expect("first")["echo"], json!("first_command"));
    assert_eq!(second.expect("second")["echo"], json!("second_command"));

    client.close().await;
    server.await.expect("server");
}

#[tokio::test]
async fn remote_rejection_is_typed_and_not_a_connection_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (mut ws, _) = handshake(stream).await.expect("handshake");

        let rejected = next_command(&mut ws).await.expect("command");
        let reply = json!({
            "id": rejected["id"],
            "type": "result",
            "success": false,
            "error": {"code": "not_found", "message": "Automation not found."},
        });
        ws.send(text(&reply)).await.expect("reply");

        let accepted = next_command(&mut ws).await.expect("command");
        let id = accepted["id"].as_u64().expect("id");
        ws.send(text(&success_reply(id, json!("ok")))).await.expect("reply");
    });

    let client = HassWsClient::new(format!("ws://{addr}/api/websocket"), TOKEN);
    client.connect().await.expect("connect");

    let error = client
        .send_command("automation/get", json!({"id": "missing"}))
        .await
        .unwrap_err();
    match error {
        HassError::Command { code, message } => {
            assert_eq!(code, "not_found");
            assert_eq!(message, "Automation not found.");
        }
        other => panic!("unexpected error: {other}"),
    }

    // The connection survives a per-command rejection.
    assert!(client.connected());
    let follow_up = client.send_command("ping", Value::Null).await.expect("ok");
    assert_eq!(follow_up, json!("ok"));

    client.close().await;
    server.await.expect("server");
}

#[tokio::test]
async fn invalid_token_surfaces_auth_error_and_skips_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let accepts = Arc::new(Mutex::new(0usize));

    let server = tokio::spawn({
        let accepts = Arc::clone(&accepts);
        async move {
            while let Ok((stream, _)) = listener.accept().await {
                *accepts.lock().expect("lock") += 1;
                let _ = handshake(stream).await;
            }
        }
    });

    let client = HassWsClient::new(format!("ws://{addr}/api/websocket"), "wrong-token");
    let error = client.connect().await.unwrap_err();
    assert!(matches!(error, HassError::Auth(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.connected());

    // The backoff starts at one second; no second connection may appear.
    tokio::time::sleep(Duration::from_millis(1_600)).await;
    assert_eq!(*accepts.lock().expect("lock"), 1);

    server.abort();
}

#[tokio::test]
async fn drop_fails_every_pending_command_and_later_sends_fail_fast() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (mut ws, _) = handshake(stream).await.expect("handshake");
        // Swallow three commands, then drop the connection without replying.
        for _ in 0..3 {
            next_command(&mut ws).await.expect("command");
        }
        drop(ws);
    });

    let client = Arc::new(HassWsClient::new(format!("ws://{addr}/api/websocket"), TOKEN));
    client.connect().await.expect("connect");

    let (a, b, c) = tokio::join!(
        client.send_command("one", Value::Null),
        client.send_command("two", Value::Null),
        client.send_command("three", Value::Null),
    );
    for result in [a, b, c] {
        assert!(matches!(result.unwrap_err(), HassError::ConnectionLost(_)));
    }

    // Reconnection is in progress (the listener is gone); submissions are
    // rejected immediately instead of queueing.
    assert_eq!(client.state(), ConnectionState::Reconnecting);
    let error = client.send_command("four", Value::Null).await.unwrap_err();
    assert!(matches!(error, HassError::ConnectionLost(_)));

    client.close().await;
    server.await.expect("server");
}

#[tokio::test]
async fn twelve_concurrent_commands_admit_exactly_ten() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let received = Arc::new(Mutex::new(Vec::<u64>::new()));
    let release = Arc::new(tokio::sync::Notify::new());

    let server = tokio::spawn({
        let received = Arc::clone(&received);
        let release = Arc::clone(&release);
        async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let (mut ws, _) = handshake(stream).await.expect("handshake");
            let mut released = false;
            let mut backlog = Vec::new();
            loop {
                tokio::select! {
                    _ = release.notified(), if !released => {
                        released = true;
                        for id in backlog.drain(..) {
                            if ws.send(text(&success_reply(id, Value::Null))).await.is_err() {
                                return;
                            }
                        }
                    }
                    maybe = ws.next() => {
                        let Some(Ok(Message::Text(raw))) = maybe else { return; };
                        let Ok(frame) = serde_json::from_str::<Value>(&raw) else {
                            continue;
                        };
                        let Some(id) = frame.get("id").and_then(Value::as_u64) else {
                            continue;
                        };
                        received.lock().expect("lock").push(id);
                        if released {
                            if ws.send(text(&success_reply(id, Value::Null))).await.is_err() {
                                return;
                            }
                        } else {
                            backlog.push(id);
                        }
                    }
                }
            }
        }
    });

    let client = Arc::new(HassWsClient::new(format!("ws://{addr}/api/websocket"), TOKEN));
    client.connect().await.expect("connect");

    let mut handles = Vec::new();
    for index in 0..12 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            client.send_command(&format!("cmd_{index}"), Value::Null).await
        }));
    }

    // With the gate at 10, exactly ten commands reach the wire; two suspend.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(received.lock().expect("lock").len(), 10);

    release.notify_one();
    for handle in handles {
        handle.await.expect("join").expect("command result");
    }
    assert_eq!(received.lock().expect("lock").len(), 12);

    client.close().await;
    server.abort();
}

#[tokio::test]
async fn reconnects_with_backoff_after_server_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        // First connection: authenticate, then drop immediately.
        let (stream, _) = listener.accept().await.expect("accept");
        let (ws, _) = handshake(stream).await.expect("handshake");
        drop(ws);

        // Second connection: serve one command.
        let (stream, _) = listener.accept().await.expect("accept");
        let (mut ws, _) = handshake(stream).await.expect("handshake");
        let command = next_command(&mut ws).await.expect("command");
        let id = command["id"].as_u64().expect("id");
        ws.send(text(&success_reply(id, json!({"attempt": 2}))))
            .await
            .expect("reply");
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let client = HassWsClient::new(format!("ws://{addr}/api/websocket"), TOKEN);
    client.connect().await.expect("connect");

    // Wait out the drop plus the first backoff interval.
    let mut waited = Duration::ZERO;
    while !client.connected() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
    }
    assert!(client.connected(), "client did not reconnect within 5s");

    let result = client.send_command("get_states", Value::Null).await.expect("ok");
    assert_eq!(result["attempt"], json!(2));

    client.close().await;
    server.await.expect("server");
}

#[tokio::test]
async fn frames_without_a_waiter_are_dropped_harmlessly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (mut ws, _) = handshake(stream).await.expect("handshake");

        // Unsolicited noise first: an unknown-id result and an event frame.
        ws.send(text(&success_reply(9_999, json!("stray")))).await.expect("send");
        ws.send(text(&json!({"type": "event", "event": {"event_type": "state_changed"}})))
            .await
            .expect("send");

        let command = next_command(&mut ws).await.expect("command");
        let id = command["id"].as_u64().expect("id");
        ws.send(text(&success_reply(id, json!("real")))).await.expect("reply");
    });

    let client = HassWsClient::new(format!("ws://{addr}/api/websocket"), TOKEN);
    client.connect().await.expect("connect");

    let result = client.send_command("get_states", Value::Null).await.expect("ok");
    assert_eq!(result, json!("real"));
    assert!(client.connected());

    client.close().await;
    server.await.expect("server");
}
