//! Authenticated request execution
//!
//! [`Client::execute`] runs one logical request: it takes a rate-limit token
//! before every attempt, retries 429/5xx and network failures with backoff,
//! and decodes either the success body or a structured error.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Method, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{ApiError, ApiResult};
use super::http::{HttpSend, ReqwestSender, WireRequest, WireResponse};
use super::limiter::RateLimiter;
use super::retry::{parse_retry_after, RetryPolicy, Sleeper, TokioSleeper};

pub const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2025-09-03";
pub const USER_AGENT: &str = concat!("notionctl/", env!("CARGO_PKG_VERSION"));

/// Settings for a [`Client`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bearer token
    pub token: String,
    /// Defaults to [`DEFAULT_BASE_URL`]
    pub base_url: Option<String>,
    /// Defaults to [`DEFAULT_NOTION_VERSION`]
    pub notion_version: Option<String>,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: None,
            notion_version: None,
            retry: RetryPolicy::default(),
        }
    }
}

type JitterFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// What to do after one attempt
enum Outcome {
    Success(WireResponse),
    Retry {
        error: ApiError,
        retry_after: Option<Duration>,
    },
    Fail(ApiError),
}

/// Classify the result of one HTTP exchange
fn evaluate(result: Result<WireResponse, String>) -> Outcome {
    let response = match result {
        Ok(response) => response,
        Err(message) => {
            return Outcome::Retry {
                error: ApiError::Network { message },
                retry_after: None,
            }
        }
    };

    if response.is_success() {
        return Outcome::Success(response);
    }

    let error = ApiError::from_response(response.status, &response.status_line, &response.body);
    if is_retryable_status(response.status) {
        let retry_after = response
            .retry_after
            .as_deref()
            .and_then(|v| parse_retry_after(v, Utc::now()));
        Outcome::Retry { error, retry_after }
    } else {
        Outcome::Fail(error)
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Decode a success body; 204 and empty bodies decode as JSON `null`
fn decode_success<T: DeserializeOwned>(response: &WireResponse) -> ApiResult<T> {
    let body: &[u8] = if response.status == 204 || response.body.is_empty() {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|source| ApiError::Decode { source })
}

/// Resilient Notion API client
#[derive(Clone)]
pub struct Client {
    http: Arc<dyn HttpSend>,
    base_url: Url,
    token: String,
    notion_version: String,
    retry: RetryPolicy,
    limiter: Arc<RateLimiter>,
    sleeper: Arc<dyn Sleeper>,
    /// Overrides the policy's jitter band when set
    jitter: Option<JitterFn>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("notion_version", &self.notion_version)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client backed by reqwest and a fresh default rate limiter
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let http = ReqwestSender::new(USER_AGENT).map_err(|e| ApiError::Network {
            message: format!("build http client: {e}"),
        })?;
        Self::with_http(config, Arc::new(http))
    }

    /// Create a client over any [`HttpSend`]
    pub fn with_http(config: ClientConfig, http: Arc<dyn HttpSend>) -> ApiResult<Self> {
        let mut base = config
            .base_url
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| ApiError::Validation(format!("invalid base URL {base:?}: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: config.token,
            notion_version: config
                .notion_version
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
            retry: config.retry,
            limiter: Arc::new(RateLimiter::default()),
            sleeper: Arc::new(TokioSleeper),
            jitter: None,
        })
    }

    /// Share a rate limiter with other clients
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.jitter = Some(Arc::new(jitter));
        self
    }

    /// Per-call retry override
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn notion_version(&self) -> &str {
        &self.notion_version
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Resolve a request path against the base URL
    ///
    /// Absolute http(s) URLs are used unchanged.
    pub fn resolve(&self, path: &str) -> ApiResult<Url> {
        let parsed = if path.starts_with("http://") || path.starts_with("https://") {
            Url::parse(path)
        } else {
            self.base_url.join(path.trim_start_matches('/'))
        };
        parsed.map_err(|e| ApiError::Validation(format!("resolve path {path:?}: {e}")))
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> ApiResult<WireRequest> {
        Ok(WireRequest {
            method,
            url: self.resolve(path)?,
            headers: vec![
                ("Authorization", format!("Bearer {}", self.token)),
                ("Notion-Version", self.notion_version.clone()),
                ("Content-Type", "application/json".to_string()),
                ("User-Agent", USER_AGENT.to_string()),
            ],
            body,
        })
    }

    /// Execute one logical request with rate limiting and retries
    pub async fn execute<B, T>(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| ApiError::Validation(format!("encode request body: {e}")))?;
        let request = self.build_request(method, path, payload)?;
        let response = self.execute_with_retries(cancel, request).await?;
        decode_success(&response)
    }

    /// Execute a request whose response body is not needed
    pub async fn execute_discard<B>(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<()>
    where
        B: Serialize + ?Sized,
    {
        self.execute::<B, IgnoredAny>(cancel, method, path, body)
            .await
            .map(|_| ())
    }

    async fn execute_with_retries(
        &self,
        cancel: &CancellationToken,
        request: WireRequest,
    ) -> ApiResult<WireResponse> {
        let max_attempts = self.retry.max_attempts();
        let mut last_error: Option<ApiError> = None;

        for attempt in 0..max_attempts {
            self.limiter.acquire(cancel).await?;

            debug!(
                "{} {} (attempt {}/{})",
                request.method,
                request.url,
                attempt + 1,
                max_attempts
            );

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ApiError::Cancelled { during: "request" });
                }
                result = self.http.send(request.clone()) => result,
            };

            let (error, retry_after) = match evaluate(result) {
                Outcome::Success(response) => return Ok(response),
                Outcome::Fail(error) => return Err(error),
                Outcome::Retry { error, retry_after } => (error, retry_after),
            };

            if attempt + 1 >= max_attempts {
                last_error = Some(error);
                break;
            }

            let delay = retry_after.unwrap_or_else(|| {
                let jitter = match &self.jitter {
                    Some(jitter) => jitter(),
                    None => self.retry.draw_jitter(),
                };
                self.retry.backoff(attempt, jitter)
            });
            warn!(
                "{} {} failed ({}), retrying in {:?}",
                request.method, request.url, error, delay
            );
            last_error = Some(error);

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ApiError::Cancelled { during: "backoff" });
                }
                _ = self.sleeper.sleep(delay) => {}
            }
        }

        Err(last_error.unwrap_or(ApiError::RetriesExhausted {
            attempts: max_attempts,
        }))
    }
}
