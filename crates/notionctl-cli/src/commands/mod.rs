//! Command handlers

pub mod changes;
pub mod config;
pub mod watch;

use std::path::Path;

use anyhow::{Context, Result};

use notionctl_core::{Client, Config, ProfileConfig};

/// Load the named profile from the config file and environment
pub fn load_profile(config_path: &Path, profile: &str) -> Result<ProfileConfig> {
    Config::load_from_path(config_path)
        .context("Failed to load configuration")?
        .profile(profile)
}

pub fn build_client(profile: &ProfileConfig) -> Result<Client> {
    Client::new(profile.client_config()).context("Failed to create Notion client")
}

/// Attach a recovery hint to a failure, if there is one
pub fn with_hint<E>(err: E, hint: Option<&'static str>) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    match hint {
        Some(hint) => anyhow::anyhow!("{}\nHint: {}", err, hint),
        None => anyhow::Error::new(err),
    }
}
