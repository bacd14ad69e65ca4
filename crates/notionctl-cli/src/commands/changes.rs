//! Changes command handler

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use notionctl_core::{query_window, Client};

use super::with_hint;
use crate::output::{Output, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChangesFormat {
    Json,
    Table,
}

/// Page output format: `--quiet`, then the global `--json`, then `--format`
fn page_format(global: OutputFormat, format: ChangesFormat) -> OutputFormat {
    match (global, format) {
        (OutputFormat::Quiet, _) => OutputFormat::Quiet,
        (OutputFormat::Json, _) | (_, ChangesFormat::Json) => OutputFormat::Json,
        (_, ChangesFormat::Table) => OutputFormat::Human,
    }
}

/// Check the requested window, defaulting the end to now
fn resolve_window(
    since: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let until = until.unwrap_or(now);
    if until < since {
        bail!("--until must not be before --since");
    }
    Ok((since, until))
}

/// List pages edited in `[since, until]`
pub async fn list(
    client: &Client,
    cancel: &CancellationToken,
    data_source_id: &str,
    since: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
    format: ChangesFormat,
    output: &Output,
) -> Result<()> {
    let (since, until) = resolve_window(since, until, Utc::now())?;
    debug!("Listing changes for {} from {} to {}", data_source_id, since, until);

    let pages = query_window(client, cancel, data_source_id, since, until, true)
        .await
        .map_err(|e| {
            let hint = e.source.recovery_suggestion();
            with_hint(e, hint)
        })?;

    Output::new(page_format(output.format, format)).print_pages(&pages)
}
