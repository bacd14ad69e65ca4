//! API error handling
//!
//! Provides a classified error for every way a request can fail, so callers
//! can tell retryable failures from terminal ones and user-initiated
//! cancellation from real failures.

use serde::Deserialize;
use thiserror::Error;

/// Coarse classification of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input; never retried
    Validation,
    /// Missing or rejected credentials
    Auth,
    /// The remote object does not exist
    NotFound,
    /// Throttled by the remote (HTTP 429)
    RateLimited,
    /// Remote 5xx
    Server,
    /// Connection refused, timeout, reset
    Network,
    /// Remote answered but the payload did not match the expected shape
    Decode,
    /// The caller's cancellation signal fired
    Cancelled,
}

impl ErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Auth,
            404 => ErrorKind::NotFound,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Validation,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Server => "server",
            ErrorKind::Network => "network",
            ErrorKind::Decode => "decode",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while talking to the Notion API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Caller supplied something unusable before any request was sent
    #[error("invalid request: {0}")]
    Validation(String),

    /// Structured error returned by the remote API
    #[error("notion: {message} (code={code} status={status})")]
    Remote {
        status: u16,
        code: String,
        message: String,
    },

    /// Transport-level failure (no HTTP response)
    #[error("request failed: {message}")]
    Network { message: String },

    /// A 2xx body that did not decode into the expected type
    #[error("decode response: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },

    /// Cancelled while waiting on the named step
    #[error("cancelled during {during}")]
    Cancelled { during: &'static str },

    /// Retry loop finished without recording any error
    #[error("exhausted retries after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Wire shape of a Notion error body
#[derive(Debug, Default, Deserialize)]
struct RemoteErrorBody {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl ApiError {
    /// Build a remote error from a non-2xx response
    ///
    /// Falls back to the raw status line and body when the body is not a
    /// Notion error object.
    pub fn from_response(status: u16, status_line: &str, body: &[u8]) -> Self {
        match serde_json::from_slice::<RemoteErrorBody>(body) {
            Ok(parsed) => ApiError::Remote {
                status: if parsed.status == 0 {
                    status
                } else {
                    parsed.status
                },
                code: if parsed.code.is_empty() {
                    status_line.to_string()
                } else {
                    parsed.code
                },
                message: parsed.message,
            },
            Err(_) => ApiError::Remote {
                status,
                code: status_line.to_string(),
                message: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Remote { status, .. } => ErrorKind::from_status(*status),
            ApiError::Network { .. } | ApiError::RetriesExhausted { .. } => ErrorKind::Network,
            ApiError::Decode { .. } => ErrorKind::Decode,
            ApiError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Remote HTTP status, if the remote answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Remote error code, if the remote answered
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Remote { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Check if another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited | ErrorKind::Server | ErrorKind::Network
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Get a suggestion for the user, if one applies
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Auth => Some(
                "Check the token for this profile and that the integration has access to the target.",
            ),
            ErrorKind::NotFound => {
                Some("Check the ID and that the object is shared with the integration.")
            }
            ErrorKind::RateLimited => Some("Wait a moment and try again."),
            ErrorKind::Network => Some("Check your network connection."),
            _ => None,
        }
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
