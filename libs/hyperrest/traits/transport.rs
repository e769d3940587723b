use crate::error::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Remaining requests in the current quota window
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// Epoch seconds at which the quota window resets
pub const HEADER_RESET: &str = "x-ratelimit-reset";
/// Seconds until the quota window resets (preferred over the absolute reset when present)
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
/// Throttling delay in milliseconds, carried by 429 responses
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Extra request options (query string, JSON body, headers)
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub json: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn json(body: Value) -> Self {
        Self {
            json: Some(body),
            ..Self::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// A single request handed to the transport
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the API base (e.g. `gateway`, `channels/123/messages`)
    pub path: String,
    pub options: RequestOptions,
}

/// Raw response returned by the transport
///
/// Header names are stored lowercased.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.trim())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Remaining quota advertised by the server
    pub fn remaining(&self) -> Option<u64> {
        self.header(HEADER_REMAINING)?.parse().ok()
    }

    /// Time until the quota resets, relative to `now_ms` (epoch milliseconds)
    pub fn reset_after(&self, now_ms: i64) -> Option<Duration> {
        if let Some(secs) = self
            .header(HEADER_RESET_AFTER)
            .and_then(|v| v.parse::<f64>().ok())
        {
            return Some(Duration::from_millis((secs.max(0.0) * 1000.0) as u64));
        }

        let reset_secs = self.header(HEADER_RESET)?.parse::<f64>().ok()?;
        let reset_ms = (reset_secs * 1000.0) as i64;
        Some(Duration::from_millis(reset_ms.saturating_sub(now_ms).max(0) as u64))
    }

    /// Throttling delay of a 429 response
    ///
    /// The header is read first, then the `retry_after` field of the JSON body.
    /// Both are milliseconds.
    pub fn retry_after(&self) -> Option<Duration> {
        if let Some(ms) = self
            .header(HEADER_RETRY_AFTER)
            .and_then(|v| v.parse::<f64>().ok())
        {
            return Some(Duration::from_millis(ms.max(0.0) as u64));
        }

        serde_json::from_str::<Value>(&self.body)
            .ok()
            .and_then(|body| body.get("retry_after").and_then(Value::as_f64))
            .map(|ms| Duration::from_millis(ms.max(0.0) as u64))
    }
}

/// Trait for issuing a single HTTP request
///
/// The rate-limited client layers caching, throttling and retries on top of
/// this; implementations only perform one round trip and must not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request and return the raw response, whatever its status
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}
