//! Resilient Notion REST client
//!
//! ## Behavior
//!
//! 1. Every attempt waits on a shared token bucket (3/s, burst 6)
//! 2. 429 and 5xx responses and network failures are retried with
//!    exponential backoff and jitter, or exactly the server's `Retry-After`
//! 3. Other failures come back immediately as a classified [`ApiError`]
//!
//! ## Usage
//!
//! ```ignore
//! let client = Client::new(ClientConfig::new(token))?;
//! let page = client.retrieve_page(&cancel, "page-id").await?;
//! ```

mod api;
mod error;
mod http;
mod limiter;
mod models;
mod retry;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ApiError, ApiResult, ErrorKind};
pub use http::{HttpSend, ReqwestSender, WireRequest, WireResponse};
pub use limiter::RateLimiter;
pub use models::{
    DataSource, Page, PageParent, PropertyReference, QueryDataSourceRequest,
    QueryDataSourceResponse, UpdatePageRequest,
};
pub use retry::{parse_retry_after, RetryPolicy, Sleeper, TokioSleeper};
pub use transport::{Client, ClientConfig, DEFAULT_BASE_URL, DEFAULT_NOTION_VERSION, USER_AGENT};
