//! HTTP transport shared by the agent and action API clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Method, Response,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use serde::Deserialize;
use serde_json::Value;
use url::{Url, form_urlencoded};

use super::error::{Error, Result};

/// How the API key is attached to each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// Send the key verbatim in the named header (`X-Api-Key` for ag.dev).
    Header(String),
    /// Send `Authorization: Bearer <key>`.
    Bearer,
}

impl Default for AuthScheme {
    fn default() -> Self {
        Self::Header("X-Api-Key".to_string())
    }
}

/// Request deadline used unless [`TransportConfig::with_request_timeout`] says otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable transport configuration, fixed at construction.
#[derive(Clone)]
pub struct TransportConfig {
    /// Base URL the endpoint paths are appended to (e.g. `https://api.ag.dev`).
    pub base_url: String,
    /// API key sent with every request.
    pub api_key: String,
    /// Header scheme for the API key.
    pub auth: AuthScheme,
    /// Per-request deadline. `None` lets a stalled server hang the request.
    pub request_timeout: Option<Duration>,
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("auth", &self.auth)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl TransportConfig {
    /// Configuration for an API authenticated with `X-Api-Key`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            auth: AuthScheme::default(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Switch to bearer authentication.
    #[must_use]
    pub fn with_bearer_auth(mut self) -> Self {
        self.auth = AuthScheme::Bearer;
        self
    }

    /// Set the per-request deadline. [`Duration::ZERO`] disables it.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }
}

/// Percent-encode `segment` for use as a single URL path segment.
pub fn encode_segment(segment: &str) -> String {
    // byte_serialize writes spaces as `+` and escapes a literal `+`.
    form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Build an encoded `?key=value&...` query string.
pub fn encode_query<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    if query.is_empty() { query } else { format!("?{query}") }
}

/// A JSON request/response channel to one API.
///
/// Successful responses without a JSON body come back as [`Value::Null`].
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send `body` (if any) to `endpoint` with `method` and return the decoded response.
    async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> Result<Value>;
}

/// Convenience verbs over [`Transport::request`].
#[async_trait]
pub trait TransportExt: Transport {
    async fn get(&self, endpoint: &str) -> Result<Value> {
        self.request(Method::GET, endpoint, None).await
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    async fn patch(&self, endpoint: &str, body: Value) -> Result<Value> {
        self.request(Method::PATCH, endpoint, Some(body)).await
    }

    async fn delete(&self, endpoint: &str) -> Result<Value> {
        self.request(Method::DELETE, endpoint, None).await
    }
}

impl<T: Transport + ?Sized> TransportExt for T {}

/// Structured error body returned by the APIs on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status echoed by the server.
    #[serde(default)]
    pub status_code: Option<u16>,
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a default `reqwest` client.
    pub fn new(config: TransportConfig) -> Result<Self> {
        Self::with_client(config, reqwest::Client::builder())
    }

    /// Create a transport, finishing a caller-supplied client builder.
    ///
    /// The auth and content-type headers are installed as default headers.
    pub fn with_client(config: TransportConfig, builder: reqwest::ClientBuilder) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        if config.api_key.trim().is_empty() {
            return Err(Error::Config("API key cannot be empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let (name, value) = match &config.auth {
            AuthScheme::Header(name) => (
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| Error::Config(format!("invalid header name {name}: {e}")))?,
                config.api_key.clone(),
            ),
            AuthScheme::Bearer => (AUTHORIZATION, format!("Bearer {}", config.api_key)),
        };
        let mut value = HeaderValue::from_str(&value)
            .map_err(|e| Error::Config(format!("invalid API key: {e}")))?;
        value.set_sensitive(true);
        headers.insert(name, value);

        let builder = match config.request_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        };
        let http = builder.default_headers(headers).build()?;
        Ok(Self { base_url, http })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> Result<Url> {
        let path = endpoint.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{path}", self.base_url))?)
    }

    async fn handle_response(response: Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = serde_json::from_str::<ApiErrorBody>(&text).unwrap_or_else(|_| ApiErrorBody {
                error: "HTTP_ERROR".to_string(),
                message: format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown Status")
                ),
                status_code: Some(status.as_u16()),
            });
            tracing::debug!(
                name: "transport.response.error",
                status = status.as_u16(),
                code = %body.error,
                message = %body.message,
                "API returned an error"
            );
            return Err(if status == reqwest::StatusCode::NOT_FOUND {
                Error::NotFound {
                    message: body.message,
                }
            } else {
                Error::Api {
                    status: status.as_u16(),
                    code: body.error,
                    message: body.message,
                }
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        if !is_json {
            return Ok(Value::Null);
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> Result<Value> {
        let url = self.url(endpoint)?;
        tracing::trace!(name: "transport.request", %method, %url, "Sending request");

        let mut rb = self.http.request(method.clone(), url);
        if let Some(body) = body {
            if matches!(method, Method::POST | Method::PATCH | Method::PUT) {
                rb = rb.json(&body);
            }
        }

        let response = rb.send().await?;
        Self::handle_response(response).await
    }
}
