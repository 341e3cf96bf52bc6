//! Stateless REST client for the Home Assistant HTTP API.
//!
//! Every call is an independent bearer-authenticated request behind a bounded
//! admission gate. There is no automatic retry at this layer: many of these
//! endpoints (service calls in particular) are not idempotent-safe to repeat.

use std::time::Duration;

use reqwest::{header, Method, StatusCode};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::error::HassError;

const QUERY_CONCURRENCY_LIMIT: usize = 5;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Async REST client wrapping the Home Assistant HTTP API.
pub struct HassRestClient {
    http: reqwest::Client,
    base_url: String,
    gate: Semaphore,
}

impl HassRestClient {
    pub fn new(base_url: impl Into<String>, token: &str) -> Result<Self, HassError> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| HassError::Auth("access token contains invalid header bytes".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS))
            .build()
            .map_err(|error| HassError::Connection(format!("failed to create http client: {error}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            gate: Semaphore::new(QUERY_CONCURRENCY_LIMIT),
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, HassError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| HassError::Connection("query gate is closed".to_string()))?;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{method} {url}");
        let mut builder = self.http.request(method.clone(), &url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| {
            HassError::Connection(format!("{method} {path} failed: {error}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status(status, path, detail));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        if content_type.contains("json") {
            response.json::<Value>().await.map_err(|error| {
                HassError::Connection(format!("invalid JSON from {method} {path}: {error}"))
            })
        } else {
            let text = response.text().await.map_err(|error| {
                HassError::Connection(format!("failed to read body from {method} {path}: {error}"))
            })?;
            Ok(Value::String(text))
        }
    }

    // -- state endpoints ---------------------------------------------------

    /// GET /api/states
    pub async fn get_states(&self) -> Result<Value, HassError> {
        self.request(Method::GET, "/api/states", &[], None).await
    }

    /// GET /api/states/{entity_id}
    pub async fn get_state(&self, entity_id: &str) -> Result<Value, HassError> {
        self.request(Method::GET, &format!("/api/states/{entity_id}"), &[], None)
            .await
    }

    // -- history / logging -------------------------------------------------

    /// GET /api/history/period[/{start}]
    pub async fn get_history(
        &self,
        entity_id: Option<&str>,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> Result<Value, HassError> {
        let mut path = "/api/history/period".to_string();
        if let Some(start) = start_time {
            path = format!("{path}/{start}");
        }
        let mut query = Vec::new();
        if let Some(entity_id) = entity_id {
            query.push(("filter_entity_id", entity_id.to_string()));
        }
        if let Some(end) = end_time {
            query.push(("end_time", end.to_string()));
        }
        self.request(Method::GET, &path, &query, None).await
    }

    /// GET /api/logbook[/{start}]
    pub async fn get_logbook(
        &self,
        entity_id: Option<&str>,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> Result<Value, HassError> {
        let mut path = "/api/logbook".to_string();
        if let Some(start) = start_time {
            path = format!("{path}/{start}");
        }
        let mut query = Vec::new();
        if let Some(entity_id) = entity_id {
            query.push(("entity", entity_id.to_string()));
        }
        if let Some(end) = end_time {
            query.push(("end_time", end.to_string()));
        }
        self.request(Method::GET, &path, &query, None).await
    }

    /// GET /api/error_log (plain text)
    pub async fn get_error_log(&self) -> Result<String, HassError> {
        let value = self.request(Method::GET, "/api/error_log", &[], None).await?;
        Ok(as_text(value))
    }

    // -- template rendering ------------------------------------------------

    /// POST /api/template
    pub async fn render_template(&self, template: &str) -> Result<String, HassError> {
        let value = self
            .request(
                Method::POST,
                "/api/template",
                &[],
                Some(&json!({"template": template})),
            )
            .await?;
        Ok(as_text(value))
    }

    // -- config check ------------------------------------------------------

    /// POST /api/config/core/check_config
    pub async fn check_config(&self) -> Result<Value, HassError> {
        self.request(Method::POST, "/api/config/core/check_config", &[], None)
            .await
    }

    // -- config store CRUD -------------------------------------------------

    pub async fn get_config_entry(&self, kind: &str, id: &str) -> Result<Value, HassError> {
        self.request(Method::GET, &format!("/api/config/{kind}/config/{id}"), &[], None)
            .await
    }

    pub async fn save_config_entry(
        &self,
        kind: &str,
        id: &str,
        config: &Value,
    ) -> Result<Value, HassError> {
        self.request(
            Method::POST,
            &format!("/api/config/{kind}/config/{id}"),
            &[],
            Some(config),
        )
        .await
    }

    pub async fn delete_config_entry(&self, kind: &str, id: &str) -> Result<Value, HassError> {
        self.request(
            Method::DELETE,
            &format!("/api/config/{kind}/config/{id}"),
            &[],
            None,
        )
        .await
    }

    // -- services ----------------------------------------------------------

    /// POST /api/services/{domain}/{service}
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Option<&Value>,
    ) -> Result<Value, HassError> {
        let empty = json!({});
        self.request(
            Method::POST,
            &format!("/api/services/{domain}/{service}"),
            &[],
            Some(data.unwrap_or(&empty)),
        )
        .await
    }
}

fn as_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn map_status(status: StatusCode, path: &str, detail: String) -> HassError {
    match status.as_u16() {
        401 | 403 => HassError::Auth(format!("authentication failed ({status}): {detail}")),
        404 => HassError::NotFound(format!("{path}: {detail}")),
        400 | 422 => HassError::Validation(detail),
        _ => HassError::Connection(format!("HTTP {status} from {path}: {detail}")),
    }
}
