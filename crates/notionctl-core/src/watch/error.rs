use std::io;

use thiserror::Error;

use crate::changes::ChangeQueryError;
use crate::client::ErrorKind;

/// Errors that end a watch session
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("invalid watch options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Poll(#[from] ChangeQueryError),

    #[error("start webhook listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("webhook listener failed: {0}")]
    Server(String),

    #[error("write {what} event: {source}")]
    Output {
        what: &'static str,
        #[source]
        source: io::Error,
    },
}

impl WatchError {
    /// Taxonomy kind, when the failure came from the API
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            WatchError::InvalidOptions(_) => Some(ErrorKind::Validation),
            WatchError::Poll(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Whether a fresh session could succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(self, WatchError::Poll(e) if e.is_retryable())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WatchError::Poll(e) if e.is_cancelled())
    }
}
