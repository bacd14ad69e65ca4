//! Wire-level HTTP exchange
//!
//! The transport only needs status, `Retry-After` and the body bytes, so the
//! HTTP stack sits behind [`HttpSend`] and can be swapped for a scripted fake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};

/// Per-attempt HTTP timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One fully-buffered outgoing request
///
/// The body is owned bytes so the same payload can be replayed on retry.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Vec<u8>>,
}

impl WireRequest {
    /// Look up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One fully-buffered response
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    /// e.g. "429 Too Many Requests"
    pub status_line: String,
    pub retry_after: Option<String>,
    pub body: Vec<u8>,
}

impl WireResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes a single HTTP exchange with no retry logic
#[async_trait]
pub trait HttpSend: Send + Sync {
    /// Returns `Err` with a description for transport-level failures only
    async fn send(&self, request: WireRequest) -> Result<WireResponse, String>;
}

/// reqwest-backed sender
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSend for ReqwestSender {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, String> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;

        let status = response.status();
        let status_line = match status.canonical_reason() {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => status.as_u16().to_string(),
        };
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| e.to_string())?;

        Ok(WireResponse {
            status: status.as_u16(),
            status_line,
            retry_after,
            body: body.to_vec(),
        })
    }
}
