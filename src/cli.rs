//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::{parse_utc_offset, DeliveryMode};
use crate::history::discord::MAX_PAGE_SIZE;
use clap::Parser;
use std::path::PathBuf;

/// keyword-tally - count keyword mentions per author in a Discord channel
///
/// Scans a channel's history between two dates (both inclusive), ranks the
/// authors whose messages contain the keyword and writes a CSV log of
/// every matching message.
///
/// Examples:
///   keyword-tally ODC 2024-01-01 2024-01-31 --channel 123456789012345678
///   keyword-tally ODC 2024-01-01 2024-01-31 --deliver discord --utc-offset +09:00
///   keyword-tally ODC 2024-01-01 2024-01-31 --input history.json
///   keyword-tally --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Keyword to search for (case-sensitive substring)
    #[arg(value_name = "KEYWORD", required_unless_present = "init_config")]
    pub keyword: Option<String>,

    /// First day of the search, YYYY-MM-DD
    #[arg(value_name = "START_DATE", required_unless_present = "init_config")]
    pub start_date: Option<String>,

    /// Last day of the search, YYYY-MM-DD (inclusive)
    #[arg(value_name = "END_DATE", required_unless_present = "init_config")]
    pub end_date: Option<String>,

    /// Discord channel id to search
    #[arg(long, value_name = "ID", env = "DISCORD_CHANNEL_ID")]
    pub channel: Option<String>,

    /// Discord bot token
    #[arg(long, value_name = "TOKEN", env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Discord REST API base URL
    #[arg(long, value_name = "URL")]
    pub api_base: Option<String>,

    /// Read history from a JSON export instead of the Discord API
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Where to deliver the ranking and CSV log (local, discord)
    #[arg(long, value_name = "MODE")]
    pub deliver: Option<DeliveryMode>,

    /// Directory the CSV log is written to in local mode
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// UTC offset dates are interpreted in, e.g. +09:00
    #[arg(long, value_name = "OFFSET", allow_hyphen_values = true)]
    pub utc_offset: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Messages requested per history page (1-100)
    #[arg(long, value_name = "COUNT")]
    pub page_size: Option<usize>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .keyword-tally.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Hide the progress spinner while scanning
    #[arg(long)]
    pub no_progress: bool,

    /// Do not send a notice before scanning starts
    #[arg(long)]
    pub no_announce: bool,

    /// Generate a default .keyword-tally.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the keyword, empty if not set (should be validated first).
    pub fn keyword(&self) -> &str {
        self.keyword.as_deref().unwrap_or("")
    }

    /// Get the start date as typed.
    pub fn start_date(&self) -> &str {
        self.start_date.as_deref().unwrap_or("")
    }

    /// Get the end date as typed.
    pub fn end_date(&self) -> &str {
        self.end_date.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    ///
    /// Date formats are not checked here; the search reports malformed
    /// dates to the invoker like any other validation failure.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.keyword().is_empty() {
            return Err("Keyword must not be empty".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref api_base) = self.api_base {
            if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
                return Err("API base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(page_size) = self.page_size {
            if page_size == 0 || page_size > MAX_PAGE_SIZE {
                return Err(format!("Page size must be between 1 and {}", MAX_PAGE_SIZE));
            }
        }

        if let Some(ref offset) = self.utc_offset {
            if let Err(e) = parse_utc_offset(offset) {
                return Err(e.to_string());
            }
        }

        if let Some(ref token) = self.token {
            if token.trim().is_empty() {
                return Err("Bot token must not be empty".to_string());
            }
        }

        // Validate export file if provided
        if let Some(ref input) = self.input {
            if !input.is_file() {
                return Err(format!("Export file does not exist: {}", input.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Whether the scan progress spinner should be drawn.
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.no_progress
    }
}
