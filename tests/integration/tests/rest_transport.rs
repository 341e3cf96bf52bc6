//! Tests for the REST query transport: status-code taxonomy, bearer
//! authentication, and the bounded admission gate.

use std::time::{Duration, Instant};

use httpmock::prelude::*;
use serde_json::json;

use hearth_client::{HassError, HassRestClient};

const TOKEN: &str = "rest-test-token";

fn client_for(server: &MockServer) -> HassRestClient {
    HassRestClient::new(server.base_url(), TOKEN).expect("rest client")
}

#[tokio::test]
async fn requests_carry_the_bearer_credential() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/states")
                .header("authorization", format!("Bearer {TOKEN}"));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!([]));
        })
        .await;

    let client = client_for(&server);
    client.get_states().await.expect("states");
    mock.assert_async().await;
}

#[tokio::test]
async fn status_codes_map_to_the_error_taxonomy() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/states/light.unauthorized");
            then.status(401).body("invalid token");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/states/light.missing");
            then.status(404).body("entity not found");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/template");
            then.status(400)
                .body("invalid template: unexpected end of print statement");
        })
        .await;

    let client = client_for(&server);

    let auth = client.get_state("light.unauthorized").await.unwrap_err();
    match auth {
        HassError::Auth(message) => assert!(message.contains("invalid token")),
        other => panic!("unexpected error: {other}"),
    }

    let missing = client.get_state("light.missing").await.unwrap_err();
    match missing {
        HassError::NotFound(message) => {
            assert!(message.contains("/api/states/light.missing"));
            assert!(message.contains("entity not found"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Remote detail must be carried verbatim.
    let validation = client.render_template("{{ broken").await.unwrap_err();
    match validation {
        HassError::Validation(message) => {
            assert_eq!(message, "invalid template: unexpected end of print statement");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn non_json_bodies_come_back_as_text() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/error_log");
            then.status(200)
                .header("content-type", "text/plain")
                .body("2026-08-07 ERROR something failed\n");
        })
        .await;

    let client = client_for(&server);
    let log = client.get_error_log().await.expect("log");
    assert!(log.contains("something failed"));
}

#[tokio::test]
async fn service_calls_post_their_payload() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/services/automation/turn_on")
                .json_body(json!({"entity_id": "automation.morning"}));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!([]));
        })
        .await;

    let client = client_for(&server);
    let data = json!({"entity_id": "automation.morning"});
    client
        .call_service("automation", "turn_on", Some(&data))
        .await
        .expect("service call");
    mock.assert_async().await;
}

#[tokio::test]
async fn repeated_reads_are_idempotent() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/states/sensor.temp");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "entity_id": "sensor.temp",
                    "state": "21.5",
                    "attributes": {"unit_of_measurement": "°C"},
                }));
        })
        .await;

    let client = client_for(&server);
    let first = client.get_state("sensor.temp").await.expect("first");
    let second = client.get_state("sensor.temp").await.expect("second");
    assert_eq!(first, second);
}

#[tokio::test]
async fn query_concurrency_is_capped_at_five() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/states");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!([]))
                .delay(Duration::from_millis(250));
        })
        .await;

    let client = client_for(&server);
    let started = Instant::now();
    let results = tokio::join!(
        client.get_states(),
        client.get_states(),
        client.get_states(),
        client.get_states(),
        client.get_states(),
        client.get_states(),
    );
    results.0.expect("0");
    results.1.expect("1");
    results.2.expect("2");
    results.3.expect("3");
    results.4.expect("4");
    results.5.expect("5");

    // Six requests against a gate of five need at least two delay rounds.
    assert!(
        started.elapsed() >= Duration::from_millis(450),
        "six requests completed too quickly for a gate of five: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn config_entry_crud_round_trip() {
    let server = MockServer::start_async().await;
    let get = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/config/automation/config/auto-1");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"alias": "Morning", "triggers": []}));
        })
        .await;
    let save = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/config/automation/config/auto-1")
                .json_body(json!({"alias": "Morning", "triggers": []}));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"result": "ok"}));
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/config/automation/config/auto-1");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"result": "ok"}));
        })
        .await;

    let client = client_for(&server);
    let config = client
        .get_config_entry("automation", "auto-1")
        .await
        .expect("get");
    assert_eq!(config["alias"], json!("Morning"));
    client
        .save_config_entry("automation", "auto-1", &config)
        .await
        .expect("save");
    client
        .delete_config_entry("automation", "auto-1")
        .await
        .expect("delete");

    get.assert_async().await;
    save.assert_async().await;
    delete.assert_async().await;
}
