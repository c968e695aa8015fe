//! # Channel Digest
//!
//! Collects the posts of every channel in a Telegram folder for the previous
//! day (or week), condenses them into one digest with an OpenAI-compatible
//! LLM, and broadcasts the digest to everyone subscribed to a bot.
//!
//! ## Usage
//!
//! ```sh
//! channel_digest                       # refresh channels, collect, summarize, send
//! channel_digest --send --weekly       # weekly digest from the cached roster
//! channel_digest --send --dry-run      # preview, nothing is sent
//! channel_digest --verify              # probe subscriber reachability
//! channel_digest --backfill            # add everyone who wrote to the bot
//! ```
//!
//! ## Architecture
//!
//! The run is a strictly sequential pipeline (see [`pipeline`]):
//! 1. **Channels**: refresh the roster from the aggregator folder
//! 2. **Collect**: walk each channel's history newest first within the window
//! 3. **Summarize**: one completion request for all collected items
//! 4. **Deliver**: paced, chunked sends; subscribers who blocked the bot are pruned
//!
//! Only one instance may run at a time; the data files are not locked.

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod backfill;
mod cli;
mod config;
mod delivery;
mod error;
mod models;
mod pipeline;
mod sources;
mod storage;
mod summarizer;
mod transport;
mod utils;
mod window;

use api::JadeClient;
use cli::{Cli, RunFlags};
use config::{Config, Settings};
use pipeline::Pipeline;
use transport::telegram::TelegramTransport;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    // A missing .env file is fine; the process environment still applies
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env");
    }

    let start_time = std::time::Instant::now();
    info!("channel_digest starting up");

    let args = Cli::parse();
    let flags = RunFlags::from_cli(&args);
    debug!(?flags, "Parsed CLI arguments");

    let settings = match &args.config {
        Some(path) => Settings::load(path).await?,
        None => Settings::default(),
    };
    let config = Config::resolve(&args, settings)?;
    ensure_writable_dir(&config.data_dir).await?;

    if let Err(e) = run(&config, &flags).await {
        error!(error = %e, "Run aborted");
        return Err(e.into());
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// Build the adapters the selected stages need and run the pipeline.
async fn run(config: &Config, flags: &RunFlags) -> Result<(), error::DigestError> {
    let transport = if flags.needs_bot() {
        Some(TelegramTransport::new(config.require_bot_token()?))
    } else {
        None
    };
    let source = if flags.needs_source() {
        Some(sources::connect(config).await?)
    } else {
        None
    };
    let completion = JadeClient::new(config.llm_config.clone(), config.category.template_name());

    let outcome = Pipeline::new(
        config,
        source.as_ref(),
        &completion,
        transport.as_ref(),
        Utc::now(),
    )
    .run(flags)
    .await?;
    info!(?outcome, "Run finished");
    Ok(())
}
