//! keyword-tally - keyword ranking and CSV log for a Discord channel
//!
//! Scans a channel's history between two dates, counts the messages that
//! contain a keyword per author, and delivers a ranking together with a
//! CSV log of every match.
//!
//! Exit codes:
//!   0 - Ranking delivered, or no message matched
//!   1 - Search failed (bad date, missing permission, API or I/O error)

mod analysis;
mod cli;
mod config;
mod delivery;
mod error;
mod handler;
mod history;
mod models;
mod report;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, DeliveryMode};
use delivery::{DiscordChannelSink, LocalSink, ResponseSink};
use handler::{HandlerOptions, Outcome, SearchHandler, SearchRequest};
use history::{DiscordHistory, DiscordHistoryConfig, ExportHistory, HistorySource};
use models::ChannelRef;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("keyword-tally v{}", env!("CARGO_PKG_VERSION"));
    debug!(
        "Arguments: keyword={:?} start={:?} end={:?}",
        args.keyword, args.start_date, args.end_date
    );

    match run_search(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Search failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .keyword-tally.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE_NAME);
    println!("   Edit it to set the channel, UTC offset and delivery mode.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG` takes precedence over the verbosity flags. Logs go to stderr
/// so that stdout only carries the search results.
fn init_logging(args: &Args) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(args.log_level()).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Run one search. Returns the process exit code.
async fn run_search(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let options = HandlerOptions {
        utc_offset: config.utc_offset()?,
        announce_start: config.delivery.announce_start,
        show_progress: args.show_progress(),
    };

    // Step 1: Pick the history source
    let (history, channel): (Box<dyn HistorySource>, ChannelRef) = match args.input {
        Some(ref input) => {
            let label = input.display().to_string();
            let id = config
                .discord
                .channel_id
                .clone()
                .unwrap_or_else(|| label.clone());
            let history: Box<dyn HistorySource> = Box::new(ExportHistory::load(input)?);
            (history, ChannelRef::labeled(id, label))
        }
        None => {
            let channel_id = require_channel(&config)?;
            let history = DiscordHistory::new(DiscordHistoryConfig {
                api_base: config.discord.api_base.clone(),
                bot_token: require_token(&args)?,
                page_size: config.discord.page_size,
                timeout_seconds: config.discord.timeout_seconds,
            })?;
            let history: Box<dyn HistorySource> = Box::new(history);
            (history, ChannelRef::new(channel_id))
        }
    };

    // Step 2: Pick the response sink
    let sink: Box<dyn ResponseSink> = match config.delivery.mode {
        DeliveryMode::Local => Box::new(LocalSink::new(PathBuf::from(
            &config.delivery.output_dir,
        ))),
        DeliveryMode::Discord => Box::new(DiscordChannelSink::new(
            config.discord.api_base.clone(),
            require_token(&args)?,
            require_channel(&config)?,
            config.discord.timeout_seconds,
        )?),
    };

    let request = SearchRequest {
        keyword: args.keyword().to_string(),
        start_date: args.start_date().to_string(),
        end_date: args.end_date().to_string(),
        channel,
    };

    info!(
        "Searching {} for '{}' ({} ~ {}), delivering via {:?}",
        request.channel, request.keyword, request.start_date, request.end_date, config.delivery.mode
    );

    // Step 3: Run the search
    let handler = SearchHandler::new(history.as_ref(), sink.as_ref(), options);
    let outcome = handler.handle(&request).await?;

    match outcome {
        Outcome::Delivered {
            matches,
            authors,
            filename,
        } => {
            info!(
                "Delivered ranking of {} authors ({} messages) with {}",
                authors, matches, filename
            );
            Ok(0)
        }
        Outcome::NoMatches => Ok(0),
        Outcome::Failed(kind) => {
            warn!("Search ended with {:?} error", kind);
            Ok(1)
        }
    }
}

/// The bot token, which every Discord API call needs.
fn require_token(args: &Args) -> Result<String> {
    args.token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .context("A bot token is required: pass --token or set DISCORD_BOT_TOKEN")
}

/// The channel to search, from the command line or the config file.
fn require_channel(config: &Config) -> Result<String> {
    config
        .discord
        .channel_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .context(
            "A channel is required: pass --channel, set DISCORD_CHANNEL_ID or discord.channel_id",
        )
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
