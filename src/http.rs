// HTTP client for the Schedulink REST backend
// Every request is JSON in, JSON out, bounded by a per-call timeout

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ClientError};

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

// Seam between the data-access services and the wire
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(&self, request: ApiRequest) -> Result<Value, ApiError>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub requests_timeout: usize,
}

pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
    stats: Arc<Mutex<ClientStats>>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_ms: config.timeout_ms,
            stats: Arc::new(Mutex::new(ClientStats::default())),
        })
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .header(reqwest::header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        if status.is_success() {
            decode_body(&body)
        } else {
            Err(error_from_response(status, &body))
        }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn execute(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let method = request.method.clone();
        let path = request.path.clone();
        debug!(%method, %path, "sending request");

        self.stats.lock().requests_sent += 1;

        // The timeout covers connect, send and reading the body
        let timeout = Duration::from_millis(self.timeout_ms);
        let result = match tokio::time::timeout(timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.timeout_ms)),
        };

        {
            let mut stats = self.stats.lock();
            match &result {
                Ok(_) => stats.requests_succeeded += 1,
                Err(ApiError::Timeout(_)) => {
                    stats.requests_failed += 1;
                    stats.requests_timeout += 1;
                }
                Err(_) => stats.requests_failed += 1,
            }
        }

        if let Err(err) = &result {
            warn!(%method, %path, error = %err, "request failed");
        }
        result
    }
}

// Empty bodies (204, DELETE) decode as null
pub fn decode_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(ApiError::from)
}

// Maps a non-2xx response to the error taxonomy. The backend reports
// {"detail": "..."} or, for schema violations, {"detail": [{"loc": [...], "msg": "..."}]}.
pub fn error_from_response(status: StatusCode, body: &Bytes) -> ApiError {
    let detail = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned());

    match detail {
        Some(Value::String(message)) => ApiError::HttpError {
            status: status.as_u16(),
            message: Some(message),
        },
        Some(Value::Array(errors)) if status.is_client_error() && !errors.is_empty() => {
            ApiError::ValidationError(collapse_field_errors(&errors))
        }
        _ => ApiError::HttpError {
            status: status.as_u16(),
            message: None,
        },
    }
}

fn collapse_field_errors(errors: &[Value]) -> String {
    errors
        .iter()
        .map(|error| {
            let field = error
                .get("loc")
                .and_then(Value::as_array)
                .and_then(|loc| loc.last())
                .map(|last| match last {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            let msg = error
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("invalid value");
            match field {
                Some(field) => format!("{}: {}", field, msg),
                None => msg.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
