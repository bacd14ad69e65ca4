//! notionctl CLI
//!
//! Command-line interface for the Notion API: change listing and watching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use notionctl_core::{Config, DEFAULT_PROFILE};

mod commands;
mod output;
mod parse;

use commands::changes::ChangesFormat;
use commands::watch::WatchSettings;
use output::{Output, OutputFormat};
use parse::{parse_duration, parse_timestamp};

#[derive(Parser)]
#[command(name = "notionctl")]
#[command(about = "notionctl - Notion API client with change watching")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration profile to use
    #[arg(long, global = true, default_value = DEFAULT_PROFILE)]
    profile: String,

    /// Debug logging on stderr (NOTIONCTL_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file (overrides NOTIONCTL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List pages edited in a time window, most recent first
    Changes {
        /// Target data source ID
        #[arg(long)]
        data_source_id: String,
        /// Start of the window, inclusive (RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        since: DateTime<Utc>,
        /// End of the window, inclusive (RFC 3339, defaults to now)
        #[arg(long, value_parser = parse_timestamp)]
        until: Option<DateTime<Utc>>,
        /// Output format (--json and --quiet take precedence)
        #[arg(long, value_enum, default_value = "json")]
        format: ChangesFormat,
    },
    /// Keep local consumers in step with remote changes
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Watch a data source via webhooks with polling fallback
    Watch {
        /// Target data source ID
        #[arg(long)]
        data_source_id: String,
        /// Address to bind the webhook listener (host:port)
        #[arg(long, default_value = ":8914")]
        listen: String,
        /// HTTP path for receiving webhook deliveries
        #[arg(long, default_value = "/webhook")]
        callback_path: String,
        /// Shared secret used to verify webhook signatures
        #[arg(long)]
        webhook_secret: Option<String>,
        /// Interval between polling sweeps (e.g. 90s, 2m)
        #[arg(long, default_value = "2m", value_parser = parse_duration)]
        poll_interval: Duration,
        /// Initial lookback window when --since is omitted
        #[arg(long, default_value = "10m", value_parser = parse_duration)]
        lookback: Duration,
        /// Timestamp to start polling from (RFC 3339, overrides --lookback)
        #[arg(long, value_parser = parse_timestamp)]
        since: Option<DateTime<Utc>>,
        /// Disable the webhook listener and rely solely on polling
        #[arg(long)]
        no_webhook: bool,
        /// Suppress poll output when no changes are detected
        #[arg(long)]
        suppress_empty: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show the resolved profile
    Show,
    /// Set a configuration value on the selected profile
    Set {
        /// Configuration key (token, notion_version, base_url, max_retries, backoff_base_ms)
        key: String,
        /// Configuration value (empty to clear)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.clone().unwrap_or_else(Config::config_file_path);

    match cli.command {
        Commands::Config { command } => {
            handle_config_command(command, &config_path, &cli.profile, &output)
        }
        Commands::Changes {
            data_source_id,
            since,
            until,
            format,
        } => {
            let profile = commands::load_profile(&config_path, &cli.profile)?;
            let client = commands::build_client(&profile)?;
            let cancel = cancel_on_ctrl_c();
            commands::changes::list(
                &client,
                &cancel,
                &data_source_id,
                since,
                until,
                format,
                &output,
            )
            .await
        }
        Commands::Sync {
            command:
                SyncCommands::Watch {
                    data_source_id,
                    listen,
                    callback_path,
                    webhook_secret,
                    poll_interval,
                    lookback,
                    since,
                    no_webhook,
                    suppress_empty,
                },
        } => {
            let profile = commands::load_profile(&config_path, &cli.profile)?;
            let client = commands::build_client(&profile)?;
            let settings = WatchSettings {
                data_source_id,
                listen,
                callback_path,
                webhook_secret,
                poll_interval,
                lookback,
                since,
                no_webhook,
                suppress_empty,
            };
            commands::watch::run(client, settings, cancel_on_ctrl_c()).await
        }
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: &Path,
    profile: &str,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, profile, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(config_path, profile, &key, &value, output)
        }
    }
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            token.cancel();
        }
    });
    cancel
}

/// Log to stderr; stdout carries command output
fn init_logging(verbose: bool) {
    let filter = match std::env::var("NOTIONCTL_LOG") {
        Ok(level) if !level.is_empty() => EnvFilter::new(level),
        _ if verbose => EnvFilter::new("notionctl_core=debug,notionctl=debug"),
        _ => EnvFilter::new("warn"),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
