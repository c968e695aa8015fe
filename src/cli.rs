//! Command-line interface definitions for Channel Digest.
//!
//! Mode flags select which pipeline stages run; every other option can also be
//! provided through an environment variable (or a `.env` file).

use crate::config::DigestCategory;
use clap::Parser;
use std::path::PathBuf;

/// Default output file for `--summary-only` given without a value.
pub const DEFAULT_SUMMARY_PATH: &str = "summary.txt";

/// Command-line arguments for the Channel Digest application.
///
/// # Examples
///
/// ```sh
/// # Full run: refresh the channel folder, collect yesterday, summarize, send
/// channel_digest
///
/// # Weekly digest, preview only
/// channel_digest --send --weekly --dry-run
///
/// # Write the digest to a file instead of sending it
/// channel_digest --summary-only=digest.txt
///
/// # Probe subscriber reachability without sending anything
/// channel_digest --verify
/// ```
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Refresh the channel roster from the aggregator folder
    #[arg(long)]
    pub channels: bool,

    /// Only collect news (no summary, no send)
    #[arg(long)]
    pub news: bool,

    /// Collect, summarize and send the digest
    #[arg(long)]
    pub send: bool,

    /// Cover the last 7 days instead of yesterday
    #[arg(long)]
    pub weekly: bool,

    /// Summarize and print a preview; send nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Write the digest to a file (default summary.txt) and stop
    #[arg(long, value_name = "PATH", num_args = 0..=1, require_equals = true, default_missing_value = DEFAULT_SUMMARY_PATH)]
    pub summary_only: Option<PathBuf>,

    /// Probe subscriber reachability before sending (alone: probe and stop)
    #[arg(long)]
    pub verify: bool,

    /// Add senders of pending bot messages to the subscriber roster
    #[arg(long)]
    pub backfill: bool,

    /// Prompt variant used for the digest
    #[arg(long, value_enum, env = "DIGEST_CATEGORY")]
    pub category: Option<DigestCategory>,

    /// Optional path to a YAML settings file
    #[arg(short, long, env = "DIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding rosters, logs and the session file
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Title of the folder whose channels are aggregated
    #[arg(long, env = "FOLDER_NAME")]
    pub folder_name: Option<String>,

    /// Subscriber roster file (relative paths resolve against the data dir)
    #[arg(long, env = "SUBSCRIBERS_FILE")]
    pub subscribers_file: Option<PathBuf>,

    /// Path to the awful_aj config.yaml used for completions
    #[arg(long, env = "LLM_CONFIG")]
    pub llm_config: Option<PathBuf>,

    /// Aggregator application id
    #[arg(long, env = "TELEGRAM_API_ID")]
    pub api_id: Option<String>,

    /// Aggregator application hash
    #[arg(long, env = "TELEGRAM_API_HASH", hide_env_values = true)]
    pub api_hash: Option<String>,

    /// Bot token used for delivery
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Comma-separated ids that receive the digest in debug mode
    #[arg(long, env = "DEBUG_USER_IDS")]
    pub debug_user_ids: Option<String>,

    /// Restrict delivery to the debug ids (default: on when ids are given)
    #[arg(long, env = "DEBUG_MODE")]
    pub debug_mode: Option<String>,
}

/// Stages selected for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFlags {
    pub refresh_channels: bool,
    pub collect: bool,
    pub summarize: bool,
    pub deliver: bool,
    pub weekly: bool,
    pub dry_run: bool,
    pub summary_only: Option<PathBuf>,
    pub verify: bool,
    pub backfill: bool,
}

impl RunFlags {
    /// Resolve mode flags into stages.
    ///
    /// With no mode flag at all the run refreshes channels and sends.
    pub fn from_cli(cli: &Cli) -> Self {
        let any_mode = cli.channels
            || cli.news
            || cli.send
            || cli.verify
            || cli.dry_run
            || cli.summary_only.is_some()
            || cli.backfill;
        let (refresh_channels, send) = if any_mode {
            (cli.channels, cli.send)
        } else {
            (true, true)
        };

        let summarize = send || cli.dry_run || cli.summary_only.is_some();
        RunFlags {
            refresh_channels,
            collect: summarize || cli.news,
            summarize,
            deliver: summarize && !cli.dry_run && cli.summary_only.is_none(),
            weekly: cli.weekly,
            dry_run: cli.dry_run,
            summary_only: cli.summary_only.clone(),
            verify: cli.verify,
            backfill: cli.backfill,
        }
    }

    /// `true` when `--verify` is the only stage that touches subscribers.
    pub fn verify_only(&self) -> bool {
        self.verify && !self.collect
    }

    /// `true` if the run talks to the aggregator session.
    pub fn needs_source(&self) -> bool {
        self.refresh_channels || self.collect
    }

    /// `true` if the run talks to the bot.
    ///
    /// `--verify` next to `--dry-run` or `--summary-only` never probes: those
    /// runs stop before the probe.
    pub fn needs_bot(&self) -> bool {
        let probes = self.verify && !self.dry_run && self.summary_only.is_none();
        self.deliver || probes || self.backfill
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(args: &[&str]) -> RunFlags {
        let mut argv = vec!["channel_digest"];
        argv.extend_from_slice(args);
        RunFlags::from_cli(&Cli::parse_from(argv))
    }

    #[test]
    fn test_no_flags_is_full_run() {
        let f = flags(&[]);
        assert!(f.refresh_channels && f.collect && f.summarize && f.deliver);
        assert!(!f.verify && !f.dry_run && !f.weekly);
    }

    #[test]
    fn test_news_is_collect_only() {
        let f = flags(&["--news"]);
        assert!(f.collect);
        assert!(!f.summarize && !f.deliver && !f.refresh_channels);
    }

    #[test]
    fn test_dry_run_summarizes_without_delivery() {
        let f = flags(&["--send", "--dry-run", "--weekly"]);
        assert!(f.summarize && f.dry_run && f.weekly);
        assert!(!f.deliver);

        let alone = flags(&["--dry-run"]);
        assert!(alone.collect && alone.summarize && !alone.deliver);
    }

    #[test]
    fn test_summary_only_default_and_explicit_path() {
        let f = flags(&["--summary-only"]);
        assert_eq!(f.summary_only, Some(PathBuf::from("summary.txt")));
        assert!(f.summarize && !f.deliver);

        let f = flags(&["--summary-only=out/digest.txt"]);
        assert_eq!(f.summary_only, Some(PathBuf::from("out/digest.txt")));
    }

    #[test]
    fn test_verify_alone_is_verify_only() {
        let f = flags(&["--verify"]);
        assert!(f.verify_only());
        assert!(!f.needs_source());

        let f = flags(&["--verify", "--send"]);
        assert!(!f.verify_only());
        assert!(f.deliver);
    }

    #[test]
    fn test_channels_alone_only_refreshes() {
        let f = flags(&["--channels"]);
        assert!(f.refresh_channels);
        assert!(!f.collect && !f.needs_bot());
    }

    #[test]
    fn test_backfill_alone_does_not_trigger_default_run() {
        let f = flags(&["--backfill"]);
        assert!(f.backfill && f.needs_bot());
        assert!(!f.collect && !f.refresh_channels);
    }

    #[test]
    fn test_preview_runs_do_not_need_the_bot() {
        assert!(!flags(&["--send", "--dry-run", "--verify"]).needs_bot());
        assert!(!flags(&["--summary-only", "--verify"]).needs_bot());
        assert!(flags(&["--send", "--verify"]).needs_bot());
        assert!(flags(&["--verify"]).needs_bot());
    }
}
