//! Authenticated request transport and envelope normalization.
//!
//! Every remote call goes through [`Transport::send`]. The HTTP implementation resolves the
//! settings on each call, attaches the API key header and turns the `{success, data, error}`
//! envelope into a plain `Result`.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

use crate::config::API_KEY_HEADER;
use crate::error::{ApiError, ApiResult};
use crate::settings::SettingsProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call against the remote service. `path` is already percent-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

/// Sends a request and yields the envelope's `data` payload.
///
/// No retries at this layer; a failure surfaces immediately.
pub trait Transport: Send + Sync {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, ApiResult<Value>>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Unwraps a response envelope into its payload (`Value::Null` when `data` is absent).
pub fn parse_envelope(body: Value) -> ApiResult<Value> {
    let envelope: Envelope = serde_json::from_value(body)
        .map_err(|e| ApiError::InvalidResponse(format!("not a response envelope: {e}")))?;

    if !envelope.success {
        let (code, message) = envelope
            .error
            .map(|e| (e.code, e.message))
            .unwrap_or((None, None));
        return Err(ApiError::rejected(code, message));
    }

    Ok(envelope.data.unwrap_or(Value::Null))
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    settings: Arc<dyn SettingsProvider>,
}

impl HttpTransport {
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    pub fn with_client(client: reqwest::Client, settings: Arc<dyn SettingsProvider>) -> Self {
        Self { client, settings }
    }

    async fn execute(&self, request: ApiRequest) -> ApiResult<Value> {
        let settings = self.settings.current();
        let url = settings.endpoint_url(&request.path);

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        tracing::debug!("{} {}", request.method, url);

        let mut builder = self
            .client
            .request(method, &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, settings.api_key.as_str());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!("{} {} failed: {}", request.method, url, e);
            ApiError::unreachable(e)
        })?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                ApiError::InvalidResponse(format!("{} returned a non-JSON body ({})", url, status))
            } else {
                ApiError::unreachable(e)
            }
        })?;

        let result = parse_envelope(body);
        if let Err(e) = &result {
            tracing::debug!("{} {} -> {}: {}", request.method, url, status, e);
        }
        result
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, ApiResult<Value>> {
        Box::pin(self.execute(request))
    }
}
