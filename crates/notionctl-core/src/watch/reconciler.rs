//! Poll and push reconciliation
//!
//! One task owns the cursor and the sink. It selects over cancellation,
//! webhook deliveries and the poll timer, handling one event at a time, so
//! emissions never interleave.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::WatchError;
use super::event::{Delivery, WatchEvent, WatchSink};
use super::receiver::{ReceiverConfig, WebhookServer, SHUTDOWN_GRACE};
use crate::changes::{query_window, ChangeSource, ChangeWindow};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2 * 60);
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(10 * 60);
/// Longest accepted poll interval
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Source of "now" for window bounds
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub data_source_id: String,
    /// Bootstrap lower bound; `now - lookback` when unset
    pub since: Option<DateTime<Utc>>,
    pub lookback: Duration,
    pub poll_interval: Duration,
    /// Skip poll events with no pages
    pub suppress_empty: bool,
}

impl WatchOptions {
    pub fn new(data_source_id: impl Into<String>) -> Self {
        Self {
            data_source_id: data_source_id.into(),
            since: None,
            lookback: DEFAULT_LOOKBACK,
            poll_interval: DEFAULT_POLL_INTERVAL,
            suppress_empty: false,
        }
    }

    pub fn validate(&self) -> Result<(), WatchError> {
        if self.data_source_id.trim().is_empty() {
            return Err(WatchError::InvalidOptions(
                "data source ID cannot be empty".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(WatchError::InvalidOptions(
                "poll interval must be positive".to_string(),
            ));
        }
        if self.poll_interval > MAX_POLL_INTERVAL {
            return Err(WatchError::InvalidOptions(format!(
                "poll interval cannot exceed {}s",
                MAX_POLL_INTERVAL.as_secs()
            )));
        }
        if self.since.is_none() && self.lookback.is_zero() {
            return Err(WatchError::InvalidOptions(
                "lookback must be positive when no start time is given".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the next poll starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchCursor {
    pub last_until: DateTime<Utc>,
    pub lower_inclusive: bool,
}

/// Where deliveries come from during [`Reconciler::run`]
#[derive(Default)]
pub struct Inbox {
    deliveries: Option<mpsc::Receiver<Delivery>>,
    server: Option<WebhookServer>,
}

impl Inbox {
    /// Poll only
    pub fn none() -> Self {
        Self::default()
    }

    pub fn channel(deliveries: mpsc::Receiver<Delivery>) -> Self {
        Self {
            deliveries: Some(deliveries),
            server: None,
        }
    }

    pub fn with_server(deliveries: mpsc::Receiver<Delivery>, server: WebhookServer) -> Self {
        Self {
            deliveries: Some(deliveries),
            server: Some(server),
        }
    }

    pub fn into_server(self) -> Option<WebhookServer> {
        self.server
    }
}

async fn next_delivery(deliveries: &mut Option<mpsc::Receiver<Delivery>>) -> Option<Delivery> {
    match deliveries {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn server_failure(server: &mut Option<WebhookServer>) -> WatchError {
    match server {
        Some(server) => server.failed().await,
        None => std::future::pending().await,
    }
}

pub struct Reconciler<K> {
    source: Arc<dyn ChangeSource>,
    clock: Arc<dyn Clock>,
    sink: K,
    options: WatchOptions,
    cursor: Option<WatchCursor>,
}

impl<K: WatchSink> Reconciler<K> {
    pub fn new(
        source: Arc<dyn ChangeSource>,
        clock: Arc<dyn Clock>,
        sink: K,
        options: WatchOptions,
    ) -> Result<Self, WatchError> {
        options.validate()?;
        Ok(Self {
            source,
            clock,
            sink,
            options,
            cursor: None,
        })
    }

    pub fn cursor(&self) -> Option<WatchCursor> {
        self.cursor
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// First sweep, from the start time (inclusive) up to now
    pub async fn bootstrap(&mut self, cancel: &CancellationToken) -> Result<ChangeWindow, WatchError> {
        let now = self.clock.now();
        let since = match self.options.since {
            Some(since) => since,
            None => {
                chrono::Duration::from_std(self.options.lookback)
                    .ok()
                    .and_then(|lookback| now.checked_sub_signed(lookback))
                    .ok_or_else(|| {
                        WatchError::InvalidOptions("lookback is too large".to_string())
                    })?
            }
        };

        info!(
            "Bootstrapping watch on {} from {}",
            self.options.data_source_id, since
        );
        self.sweep(cancel, since, now, true).await
    }

    /// Next sweep from the cursor up to now
    ///
    /// Bootstraps first when no sweep has completed yet.
    pub async fn poll_next(&mut self, cancel: &CancellationToken) -> Result<ChangeWindow, WatchError> {
        let Some(cursor) = self.cursor else {
            return self.bootstrap(cancel).await;
        };
        let now = self.clock.now();
        self.sweep(cancel, cursor.last_until, now, cursor.lower_inclusive)
            .await
    }

    async fn sweep(
        &mut self,
        cancel: &CancellationToken,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        lower_inclusive: bool,
    ) -> Result<ChangeWindow, WatchError> {
        let pages = query_window(
            self.source.as_ref(),
            cancel,
            &self.options.data_source_id,
            since,
            until,
            lower_inclusive,
        )
        .await?;

        let window = ChangeWindow::new(since, until, lower_inclusive);
        debug!("Window {} returned {} page(s)", window, pages.len());

        if !(pages.is_empty() && self.options.suppress_empty) {
            self.emit(&WatchEvent::poll(window, pages))?;
        }

        self.cursor = Some(WatchCursor {
            last_until: window.until,
            lower_inclusive: false,
        });
        Ok(window)
    }

    /// Forward one push delivery as it arrived
    pub fn handle_delivery(&mut self, delivery: &Delivery) -> Result<(), WatchError> {
        debug!(
            "Webhook delivery {:?} ({})",
            delivery.delivery_id, delivery.event_type
        );
        self.emit(&WatchEvent::webhook(delivery))
    }

    fn emit(&mut self, event: &WatchEvent) -> Result<(), WatchError> {
        self.sink.emit(event).map_err(|source| WatchError::Output {
            what: event.kind(),
            source,
        })
    }

    /// Steady-state loop until cancellation or a fatal error
    ///
    /// Cancellation returns `Ok`. The first tick fires one poll interval
    /// after entry.
    pub async fn run(&mut self, cancel: &CancellationToken, inbox: &mut Inbox) -> Result<(), WatchError> {
        let period = self.options.poll_interval;
        let first_tick = Instant::now().checked_add(period).ok_or_else(|| {
            WatchError::InvalidOptions("poll interval is too large".to_string())
        })?;
        let mut ticker = time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Watch cancelled");
                    return Ok(());
                }

                err = server_failure(&mut inbox.server) => {
                    return Err(err);
                }

                delivery = next_delivery(&mut inbox.deliveries) => match delivery {
                    Some(delivery) => self.handle_delivery(&delivery)?,
                    None => {
                        debug!("Delivery queue closed");
                        inbox.deliveries = None;
                    }
                },

                _ = ticker.tick() => {
                    match self.poll_next(cancel).await {
                        Ok(_) => {}
                        Err(e) if e.is_cancelled() => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }
}

/// Run a complete watch session
///
/// Starts the webhook listener (when configured) before the bootstrap sweep
/// so no push is lost, then loops until `cancel` fires or a poll fails. The
/// listener is always shut down before returning.
pub async fn run_watch<K: WatchSink>(
    source: Arc<dyn ChangeSource>,
    clock: Arc<dyn Clock>,
    sink: K,
    options: WatchOptions,
    receiver: Option<ReceiverConfig>,
    cancel: CancellationToken,
) -> Result<K, WatchError> {
    let mut reconciler = Reconciler::new(source, clock, sink, options)?;

    let mut inbox = match receiver {
        Some(config) => {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            let server = WebhookServer::start(&config, tx, cancel.child_token()).await?;
            Inbox::with_server(rx, server)
        }
        None => Inbox::none(),
    };

    let result = match reconciler.bootstrap(&cancel).await {
        Ok(_) => reconciler.run(&cancel, &mut inbox).await,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(e),
    };

    if let Some(server) = inbox.into_server() {
        server.shutdown(SHUTDOWN_GRACE).await;
    }

    match result {
        Ok(()) => Ok(reconciler.into_sink()),
        Err(e) => {
            warn!("Watch stopped: {}", e);
            Err(e)
        }
    }
}
