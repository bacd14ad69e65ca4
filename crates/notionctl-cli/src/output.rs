//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::time::Duration;

use anyhow::Result;
use notionctl_core::client::Page;
use notionctl_core::ProfileConfig;
use serde_json::Value;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print pages, newest edit first
    pub fn print_pages(&self, pages: &[Page]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if pages.is_empty() {
                    println!("No changes found.");
                    return Ok(());
                }
                println!(
                    "{:<36} | {:<20} | {:<30} | URL",
                    "ID", "LAST EDITED", "TITLE"
                );
                for page in pages {
                    let edited = page
                        .last_edited_time
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!(
                        "{:<36} | {:<20} | {:<30} | {}",
                        page.id,
                        edited,
                        truncate(&page_title(page), 30),
                        page.url
                    );
                }
                println!("\n{} page(s)", pages.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(pages)?);
            }
            OutputFormat::Quiet => {
                for page in pages {
                    println!("{}", page.id);
                }
            }
        }
        Ok(())
    }

    /// Print a resolved profile with its token redacted
    pub fn print_profile(&self, profile: &ProfileConfig, config_path: &str) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("Profile: {}", profile.name);
                println!("  token:           {}", profile.redacted_token());
                println!("  notion_version:  {}", profile.notion_version);
                println!("  base_url:        {}", profile.base_url);
                println!("  max_retries:     {}", profile.retry.max_retries);
                println!(
                    "  backoff_base_ms: {}",
                    profile.retry.base_delay.as_millis()
                );
                println!();
                println!("Config file: {}", config_path);
            }
            OutputFormat::Json => {
                let value = serde_json::json!({
                    "profile": profile.name,
                    "token": profile.redacted_token(),
                    "notion_version": profile.notion_version,
                    "base_url": profile.base_url,
                    "max_retries": profile.retry.max_retries,
                    "backoff_base_ms": whole_millis(profile.retry.base_delay),
                    "config_file": config_path,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            OutputFormat::Quiet => {
                println!("{}", profile.name);
            }
        }
        Ok(())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Plain text of the page's title property
pub fn page_title(page: &Page) -> String {
    page.properties
        .values()
        .find(|prop| prop.get("type").and_then(Value::as_str) == Some("title"))
        .and_then(|prop| prop.get("title"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Milliseconds as u64, saturating
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
