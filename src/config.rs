//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.keyword-tally.toml` files. The bot token is not part of
//! the file format; it only comes from the command line or environment.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".keyword-tally.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Discord API settings.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Delivery settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Discord API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Base URL of the REST API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Channel to search when none is given on the command line.
    #[serde(default)]
    pub channel_id: Option<String>,

    /// Messages requested per history page (1-100).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            channel_id: None,
            page_size: default_page_size(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_timeout() -> u64 {
    30
}

/// Search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// UTC offset that dates are interpreted in, e.g. "+09:00".
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            utc_offset: default_utc_offset(),
        }
    }
}

fn default_utc_offset() -> String {
    "+00:00".to_string()
}

/// Where responses go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Print the ranking and save the CSV locally (default)
    #[default]
    Local,
    /// Post the ranking and CSV into the searched channel
    Discord,
}

/// Delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Delivery mode.
    #[serde(default)]
    pub mode: DeliveryMode,

    /// Directory CSV logs are written to in local mode.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Send a notice before scanning starts.
    #[serde(default = "default_true")]
    pub announce_start: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::default(),
            output_dir: default_output_dir(),
            announce_start: true,
        }
    }
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

/// Parse an offset such as `+09:00`, `-05:30` or `Z`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("Invalid UTC offset");
    }

    let (sign, rest) = if let Some(rest) = value.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix('-') {
        (-1, rest)
    } else {
        anyhow::bail!("UTC offset must start with '+' or '-': {}", value);
    };

    let (hours, minutes) = rest
        .split_once(':')
        .with_context(|| format!("UTC offset must look like +HH:MM: {}", value))?;
    let hours: i32 = hours
        .parse()
        .with_context(|| format!("Invalid hours in UTC offset: {}", value))?;
    let minutes: i32 = minutes
        .parse()
        .with_context(|| format!("Invalid minutes in UTC offset: {}", value))?;

    if !(0..60).contains(&minutes) {
        anyhow::bail!("Invalid minutes in UTC offset: {}", value);
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("UTC offset out of range: {}", value))
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref api_base) = args.api_base {
            self.discord.api_base = api_base.clone();
        }
        if let Some(ref channel) = args.channel {
            self.discord.channel_id = Some(channel.clone());
        }
        if let Some(page_size) = args.page_size {
            self.discord.page_size = page_size;
        }
        if let Some(timeout) = args.timeout {
            self.discord.timeout_seconds = timeout;
        }

        if let Some(ref offset) = args.utc_offset {
            self.search.utc_offset = offset.clone();
        }

        if let Some(mode) = args.deliver {
            self.delivery.mode = mode;
        }
        if let Some(ref output_dir) = args.output_dir {
            self.delivery.output_dir = output_dir.display().to_string();
        }

        // Flags always override
        if args.no_announce {
            self.delivery.announce_start = false;
        }
    }

    /// The configured UTC offset.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.search.utc_offset)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
