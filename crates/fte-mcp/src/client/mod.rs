//! Outbound vendor API calls.
//!
//! Adapters build an [`ApiRequest`] and hand it to an [`ApiClient`]. The
//! production client is [`HttpApiClient`]; tests swap in an in-memory one.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use fte_dispatch::ToolError;

use crate::types::{McpError, McpResult};

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// One outbound HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        let mut request = Self::new(HttpMethod::Post, url);
        request.body = Some(body);
        request
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    /// The vendor answered 2xx but reported an error in the payload.
    #[error("{0}")]
    Remote(String),
}

impl From<ApiError> for ToolError {
    fn from(e: ApiError) -> Self {
        ToolError::Failed(e.to_string())
    }
}

#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn call(&self, request: ApiRequest) -> Result<Value, ApiError>;
}

/// [`ApiClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    http: reqwest::Client,
}

impl HttpApiClient {
    pub fn new(timeout: Duration) -> McpResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fte-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| McpError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn call(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        tracing::debug!(method = %request.method, url = %request.url, "Outbound API call");

        let mut builder = self.http.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builders() {
        let request = ApiRequest::get("https://api.example.com/messages")
            .query("q", "is:unread")
            .query("maxResults", 10)
            .bearer("tok");
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.query_value("maxResults"), Some("10"));
        assert_eq!(request.header_value("authorization"), Some("Bearer tok"));
        assert!(request.body.is_none());

        let post = ApiRequest::post("https://api.example.com/send", json!({"raw": "x"}));
        assert_eq!(post.body, Some(json!({"raw": "x"})));
    }

    #[test]
    fn test_api_error_maps_to_failure() {
        let err: ToolError = ApiError::Status {
            status: 401,
            body: "unauthorized".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Tool execution failed: HTTP 401: unauthorized");
    }
}
