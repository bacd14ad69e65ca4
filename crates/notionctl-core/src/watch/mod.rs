//! Change watching
//!
//! Merges two feeds into one ordered stream of [`WatchEvent`]s:
//!
//! - **Polls** sweep adjacent windows of `last_edited_time`. They are complete
//!   and never overlap: the first window is `[since, now]`, every later one
//!   `(previous until, now]`.
//! - **Webhooks** are forwarded as soon as they arrive. They are best-effort;
//!   a change may be reported by a webhook and again by the next poll.
//!
//! ## Usage
//!
//! ```ignore
//! let sink = JsonLinesSink::new(std::io::stdout());
//! run_watch(source, Arc::new(SystemClock), sink, options, Some(receiver), cancel).await?;
//! ```

mod error;
mod event;
mod receiver;
mod reconciler;
mod signature;

pub use error::WatchError;
pub use event::{extract_event_type, Delivery, JsonLinesSink, WatchEvent, WatchSink};
pub use receiver::{
    webhook_router, ReceiverConfig, ReceiverStats, WebhookServer, DEFAULT_CALLBACK_PATH,
    DEFAULT_LISTEN_ADDR, DELIVERY_ID_HEADER, SHUTDOWN_GRACE, SIGNATURE_HEADER, TIMESTAMP_HEADER,
    WEBHOOK_MAX_BODY_BYTES, WEBHOOK_QUEUE_CAPACITY,
};
pub use reconciler::{
    run_watch, Clock, Inbox, Reconciler, SystemClock, WatchCursor, WatchOptions,
    DEFAULT_LOOKBACK, DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL,
};
pub use signature::{sign, verify};
