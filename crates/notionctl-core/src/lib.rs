//! notionctl core library
//!
//! Talks to the Notion API reliably and turns edits into a stream of change
//! events.
//!
//! # Architecture
//!
//! - **Transport**: every call shares one token bucket and retries transient
//!   failures with backoff
//! - **Change query**: drains one `last_edited_time` window, newest first
//! - **Watch**: adjacent polling windows merged with webhook pushes
//!
//! # Quick Start
//!
//! ```text
//! let profile = Config::load()?.profile("default")?;
//! let client = Client::new(profile.client_config())?;
//!
//! let pages = query_window(&client, &cancel, "data-source-id", since, now, true).await?;
//! ```
//!
//! # Modules
//!
//! - `client`: Transport, error taxonomy, models and typed endpoints
//! - `changes`: Windowed change queries
//! - `watch`: Reconciler, webhook receiver and event sinks
//! - `config`: Profile configuration

pub mod changes;
pub mod client;
pub mod config;
pub mod watch;

pub use changes::{query_window, ChangeQueryError, ChangeSource, ChangeWindow};
pub use client::{ApiError, ApiResult, Client, ClientConfig, ErrorKind, Page, RetryPolicy};
pub use config::{Config, ProfileConfig, DEFAULT_PROFILE};
pub use watch::{run_watch, JsonLinesSink, ReceiverConfig, WatchError, WatchEvent, WatchOptions};
