//! Profile configuration
//!
//! Configuration is loaded from:
//! 1. Config file (~/.config/notionctl/config.toml, or NOTIONCTL_CONFIG)
//! 2. Environment variables (NOTIONCTL_* prefix), applied to the selected
//!    profile only
//!
//! ```toml
//! [profiles.default]
//! token = "secret_..."
//! notion_version = "2025-09-03"
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{ClientConfig, RetryPolicy, DEFAULT_BASE_URL, DEFAULT_NOTION_VERSION};

/// Environment variable prefix
const ENV_PREFIX: &str = "NOTIONCTL";

pub const DEFAULT_PROFILE: &str = "default";

/// Keys accepted by [`Config::set`]
pub const SETTABLE_KEYS: &[&str] = &[
    "token",
    "notion_version",
    "base_url",
    "max_retries",
    "backoff_base_ms",
];

/// Contents of the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileSettings>,
}

/// One `[profiles.<name>]` table, as written
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
}

/// A resolved profile, ready to build a client from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(skip)]
    pub token: String,
    pub notion_version: String,
    pub base_url: String,
    #[serde(skip)]
    pub retry: RetryPolicy,
}

impl ProfileConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            token: self.token.clone(),
            base_url: Some(self.base_url.clone()),
            notion_version: Some(self.notion_version.clone()),
            retry: self.retry.clone(),
        }
    }

    /// Token with all but a short prefix masked
    pub fn redacted_token(&self) -> String {
        let prefix: String = self.token.chars().take(4).collect();
        if self.token.chars().count() <= 8 {
            "****".to_string()
        } else {
            format!("{prefix}****")
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// If the file doesn't exist, an empty configuration is returned.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::load_from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Load configuration from a TOML string
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        toml::from_str(toml_content).context("Failed to parse config TOML")
    }

    /// Resolve a profile, applying environment overrides
    ///
    /// Order of precedence (highest to lowest):
    /// 1. NOTIONCTL_TOKEN, NOTIONCTL_NOTION_VERSION, NOTIONCTL_BASE_URL
    /// 2. The profile's table in the config file
    /// 3. Built-in defaults (the token has none)
    pub fn profile(&self, name: &str) -> Result<ProfileConfig> {
        let mut settings = self.profiles.get(name).cloned().unwrap_or_default();
        apply_env_overrides(&mut settings);

        let token = settings
            .token
            .filter(|t| !t.trim().is_empty())
            .with_context(|| {
                format!(
                    "No token configured for profile '{}'. Set {}_TOKEN or run: notionctl config set token <token>",
                    name, ENV_PREFIX
                )
            })?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: settings.max_retries.unwrap_or(defaults.max_retries),
            base_delay: settings
                .backoff_base_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            ..defaults
        };

        Ok(ProfileConfig {
            name: name.to_string(),
            token,
            notion_version: settings
                .notion_version
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
            base_url: settings
                .base_url
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            retry,
        })
    }

    /// Set one key of a profile; an empty value clears it
    pub fn set(&mut self, profile: &str, key: &str, value: &str) -> Result<()> {
        let settings = self.profiles.entry(profile.to_string()).or_default();
        let value = value.trim();
        let text = || (!value.is_empty()).then(|| value.to_string());

        match key {
            "token" => settings.token = text(),
            "notion_version" => settings.notion_version = text(),
            "base_url" => settings.base_url = text(),
            "max_retries" => {
                settings.max_retries = text()
                    .map(|v| v.parse::<u32>())
                    .transpose()
                    .with_context(|| format!("Invalid max_retries: {}", value))?;
            }
            "backoff_base_ms" => {
                settings.backoff_base_ms = text()
                    .map(|v| v.parse::<u64>())
                    .transpose()
                    .with_context(|| format!("Invalid backoff_base_ms: {}", value))?;
            }
            other => bail!(
                "Unknown config key '{}'. Valid keys: {}",
                other,
                SETTABLE_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with NOTIONCTL_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notionctl")
            .join("config.toml")
    }
}

fn apply_env_overrides(settings: &mut ProfileSettings) {
    // NOTIONCTL_TOKEN
    if let Ok(val) = std::env::var(format!("{}_TOKEN", ENV_PREFIX)) {
        if !val.is_empty() {
            settings.token = Some(val);
        }
    }

    // NOTIONCTL_NOTION_VERSION
    if let Ok(val) = std::env::var(format!("{}_NOTION_VERSION", ENV_PREFIX)) {
        if !val.is_empty() {
            settings.notion_version = Some(val);
        }
    }

    // NOTIONCTL_BASE_URL
    if let Ok(val) = std::env::var(format!("{}_BASE_URL", ENV_PREFIX)) {
        if !val.is_empty() {
            settings.base_url = Some(val);
        }
    }
}
