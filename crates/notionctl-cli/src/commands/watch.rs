//! Sync watch command handler

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use notionctl_core::watch::{run_watch, JsonLinesSink, ReceiverConfig, SystemClock, WatchOptions};
use notionctl_core::{Client, WatchError};

use super::with_hint;

/// Settings collected from the command line
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub data_source_id: String,
    pub listen: String,
    pub callback_path: String,
    pub webhook_secret: Option<String>,
    pub poll_interval: Duration,
    pub lookback: Duration,
    pub since: Option<DateTime<Utc>>,
    pub no_webhook: bool,
    pub suppress_empty: bool,
}

impl WatchSettings {
    fn options(&self) -> WatchOptions {
        WatchOptions {
            data_source_id: self.data_source_id.clone(),
            since: self.since,
            lookback: self.lookback,
            poll_interval: self.poll_interval,
            suppress_empty: self.suppress_empty,
        }
    }

    fn receiver(&self) -> Option<ReceiverConfig> {
        if self.no_webhook {
            return None;
        }
        Some(ReceiverConfig {
            listen_addr: self.listen.clone(),
            callback_path: self.callback_path.clone(),
            secret: self.webhook_secret.clone().filter(|s| !s.is_empty()),
            ..ReceiverConfig::default()
        })
    }
}

/// Stream change events as JSON lines to stdout until cancelled
pub async fn run(client: Client, settings: WatchSettings, cancel: CancellationToken) -> Result<()> {
    let receiver = settings.receiver();
    if receiver.is_none() {
        info!("Webhook listener disabled, polling only");
    }

    let sink = JsonLinesSink::new(io::stdout());
    match run_watch(
        Arc::new(client),
        Arc::new(SystemClock),
        sink,
        settings.options(),
        receiver,
        cancel,
    )
    .await
    {
        Ok(_) => Ok(()),
        Err(WatchError::Poll(e)) => {
            let hint = e.source.recovery_suggestion();
            Err(with_hint(e, hint))
        }
        Err(e) => Err(e.into()),
    }
}
