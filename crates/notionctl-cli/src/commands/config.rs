//! Config command handlers

use std::path::Path;

use anyhow::{Context, Result};

use notionctl_core::Config;

use crate::output::Output;

/// Show the resolved profile
pub fn show(config_path: &Path, profile: &str, output: &Output) -> Result<()> {
    let config = Config::load_from_path(config_path).context("Failed to load configuration")?;
    let resolved = config.profile(profile)?;
    output.print_profile(&resolved, &config_path.display().to_string())
}

/// Set a configuration value on a profile
pub fn set(
    config_path: &Path,
    profile: &str,
    key: &str,
    value: &str,
    output: &Output,
) -> Result<()> {
    let mut config = Config::load_from_path(config_path).context("Failed to load configuration")?;
    config.set(profile, key, value)?;
    config
        .save_to(config_path)
        .context("Failed to save configuration")?;

    let shown = if key == "token" { "(hidden)" } else { value };
    output.success(&format!("Set {}.{} = {}", profile, key, shown));

    Ok(())
}
