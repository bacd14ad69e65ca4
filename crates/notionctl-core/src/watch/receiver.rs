//! Webhook push receiver
//!
//! An axum listener that verifies and queues deliveries, acknowledging each
//! one immediately. The queue is bounded; when it is full the new delivery is
//! dropped rather than blocking the sender, since polling backstops pushes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::Delivery;
use super::signature;
use super::WatchError;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8914";
pub const DEFAULT_CALLBACK_PATH: &str = "/webhook";
pub const WEBHOOK_QUEUE_CAPACITY: usize = 16;
pub const WEBHOOK_MAX_BODY_BYTES: usize = 1 << 20;
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub const SIGNATURE_HEADER: &str = "Notion-Signature";
pub const TIMESTAMP_HEADER: &str = "Notion-Signature-Timestamp";
pub const DELIVERY_ID_HEADER: &str = "Notion-Delivery-ID";

/// Listener settings
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// `host:port`; a bare `:port` binds all interfaces
    pub listen_addr: String,
    pub callback_path: String,
    /// Signatures are only checked when set
    pub secret: Option<String>,
    pub queue_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            secret: None,
            queue_capacity: WEBHOOK_QUEUE_CAPACITY,
        }
    }
}

impl ReceiverConfig {
    /// Callback path with a leading `/`, defaulting when empty
    pub fn normalized_path(&self) -> String {
        let path = self.callback_path.trim();
        if path.is_empty() {
            DEFAULT_CALLBACK_PATH.to_string()
        } else if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        }
    }

    /// Bind address with `:port` expanded to all interfaces
    pub fn bind_addr(&self) -> String {
        if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        }
    }
}

/// Counters for the receiver
#[derive(Debug, Default)]
pub struct ReceiverStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

impl ReceiverStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
struct ReceiverState {
    secret: Option<Arc<str>>,
    queue: mpsc::Sender<Delivery>,
    stats: Arc<ReceiverStats>,
}

/// Build the webhook router
///
/// Only POST is routed; other methods get 405 from axum.
pub fn webhook_router(
    config: &ReceiverConfig,
    queue: mpsc::Sender<Delivery>,
    stats: Arc<ReceiverStats>,
) -> Router {
    let state = ReceiverState {
        secret: config
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(Arc::from),
        queue,
        stats,
    };

    Router::new()
        .route(&config.normalized_path(), post(handle_delivery))
        .layer(DefaultBodyLimit::max(WEBHOOK_MAX_BODY_BYTES))
        .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn handle_delivery(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.secret {
        let verified = signature::verify(
            secret,
            header(&headers, TIMESTAMP_HEADER),
            &body,
            header(&headers, SIGNATURE_HEADER),
        );
        if !verified {
            state.stats.rejected.fetch_add(1, Ordering::Relaxed);
            warn!("Rejecting webhook delivery: invalid signature");
            return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
        }
    }

    let delivery = Delivery::new(
        body.to_vec(),
        header(&headers, DELIVERY_ID_HEADER),
        Utc::now(),
    );

    match state.queue.try_send(delivery) {
        Ok(()) => {
            state.stats.accepted.fetch_add(1, Ordering::Relaxed);
            debug!("Queued webhook delivery");
        }
        Err(TrySendError::Full(dropped)) => {
            state.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Dropping webhook delivery {:?} ({}): queue full",
                dropped.delivery_id, dropped.event_type
            );
        }
        Err(TrySendError::Closed(dropped)) => {
            state.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Dropping webhook delivery {:?}: receiver closed",
                dropped.delivery_id
            );
        }
    }

    Json(serde_json::json!({"ok": true})).into_response()
}

/// A running webhook listener
pub struct WebhookServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    /// Taken once the task has been awaited to completion
    handle: Option<JoinHandle<std::io::Result<()>>>,
    stats: Arc<ReceiverStats>,
}

impl WebhookServer {
    /// Bind and start serving
    ///
    /// Bind failures are returned here; later failures surface through
    /// [`WebhookServer::failed`].
    pub async fn start(
        config: &ReceiverConfig,
        queue: mpsc::Sender<Delivery>,
        shutdown: CancellationToken,
    ) -> Result<Self, WatchError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| WatchError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| WatchError::Bind { addr, source })?;

        let stats = Arc::new(ReceiverStats::default());
        let router = webhook_router(config, queue, stats.clone());
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        info!(
            "Listening for Notion webhooks on http://{}{}",
            local_addr,
            config.normalized_path()
        );

        Ok(Self {
            local_addr,
            shutdown,
            handle: Some(handle),
            stats,
        })
    }

    /// Wrap an already spawned serve task
    #[cfg(test)]
    pub(crate) fn from_handle(handle: JoinHandle<std::io::Result<()>>) -> Self {
        Self {
            local_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            shutdown: CancellationToken::new(),
            handle: Some(handle),
            stats: Arc::new(ReceiverStats::default()),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<ReceiverStats> {
        self.stats.clone()
    }

    /// Resolves when the server task ends on its own; never resolves once
    /// it has already reported
    pub async fn failed(&mut self) -> WatchError {
        let Some(handle) = self.handle.as_mut() else {
            return std::future::pending().await;
        };
        let result = handle.await;
        self.handle = None;
        match result {
            Ok(Ok(())) => WatchError::Server("listener stopped unexpectedly".to_string()),
            Ok(Err(e)) => WatchError::Server(e.to_string()),
            Err(e) => WatchError::Server(format!("listener task failed: {e}")),
        }
    }

    /// Stop accepting connections, waiting up to `grace` for in-flight
    /// requests before aborting
    pub async fn shutdown(mut self, grace: Duration) {
        self.shutdown.cancel();
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(Ok(()))) => info!("Webhook listener stopped"),
            Ok(Ok(Err(e))) => warn!("Webhook listener shutdown error: {}", e),
            Ok(Err(e)) => warn!("Webhook listener task failed: {}", e),
            Err(_) => {
                warn!("Webhook listener did not stop within {:?}, aborting", grace);
                handle.abort();
            }
        }
    }
}
