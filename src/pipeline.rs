//! Pipeline Orchestrator.
//!
//! Runs the selected stages strictly in sequence:
//!
//! ```text
//! [backfill] -> [refresh channels] -> collect -> [stop: collect only]
//!   -> [stop: no news] -> summarize -> [stop: summary-only file]
//!   -> summary log -> [stop: dry-run preview] -> [verify] -> deliver -> prune
//! ```
//!
//! Every early stop is a normal termination reported as a [`RunOutcome`].
//! The Subscriber Store is rewritten at most once, after the delivery loop
//! has completed in memory. The process is not safe for concurrent
//! invocation: nothing here locks the data files.

use crate::api::AskAsync;
use crate::backfill::backfill_subscribers;
use crate::cli::RunFlags;
use crate::config::Config;
use crate::delivery::DeliveryEngine;
use crate::error::DigestError;
use crate::models::Subscriber;
use crate::sources::collector::collect_news;
use crate::sources::{ChannelSource, SourceError};
use crate::storage::channels::ChannelRoster;
use crate::storage::logs::{InboundLog, SummaryLog};
use crate::storage::subscribers::SubscriberStore;
use crate::summarizer::Summarizer;
use crate::transport::BotTransport;
use crate::window::{Period, Window};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// How a run ended. All variants are successful terminations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Backfilled { added: usize, updated: usize },
    ChannelsRefreshed { channels: usize },
    Verified { reachable: usize, total: usize },
    Collected { items: usize },
    NoNews,
    SummaryWritten { path: PathBuf },
    Previewed,
    Delivered { delivered: usize, removed: usize },
}

pub struct Pipeline<'a, S, A, T> {
    config: &'a Config,
    source: Option<&'a S>,
    completion: &'a A,
    transport: Option<&'a T>,
    now: DateTime<Utc>,
}

impl<'a, S, A, T> Pipeline<'a, S, A, T>
where
    S: ChannelSource,
    A: AskAsync<Response = String>,
    T: BotTransport,
{
    /// `source` and `transport` may be absent for runs that never use them.
    pub fn new(
        config: &'a Config,
        source: Option<&'a S>,
        completion: &'a A,
        transport: Option<&'a T>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            config,
            source,
            completion,
            transport,
            now,
        }
    }

    fn source(&self) -> Result<&'a S, DigestError> {
        self.source.ok_or_else(|| {
            SourceError::SessionUnavailable("no aggregator session for this run".to_string()).into()
        })
    }

    fn transport(&self) -> Result<&'a T, DigestError> {
        self.transport
            .ok_or(DigestError::MissingCredential("TELEGRAM_BOT_TOKEN"))
    }

    fn store(&self) -> SubscriberStore {
        SubscriberStore::new(&self.config.subscribers_file)
    }

    #[instrument(level = "info", skip_all, fields(weekly = flags.weekly, dry_run = flags.dry_run))]
    pub async fn run(&self, flags: &RunFlags) -> Result<RunOutcome, DigestError> {
        let mut outcome = None;

        if flags.backfill {
            let report = backfill_subscribers(
                self.transport()?,
                &self.store(),
                &InboundLog::new(&self.config.inbound_log),
                self.now,
            )
            .await?;
            outcome = Some(RunOutcome::Backfilled {
                added: report.added,
                updated: report.updated,
            });
        }

        if flags.refresh_channels {
            let channels = self.refresh_channels().await?;
            outcome = Some(RunOutcome::ChannelsRefreshed { channels });
        }

        if flags.verify_only() {
            return self.verify_only().await;
        }
        if !flags.collect {
            return outcome.ok_or_else(|| DigestError::Config("no stage selected".to_string()));
        }

        let window = Window::for_period(Period::from_weekly_flag(flags.weekly), self.now);
        let channels = ChannelRoster::new(&self.config.channels_file).load().await?;
        info!(channels = channels.len(), label = %window.label(), "Collecting news");
        let items = collect_news(self.source()?, &channels, &window).await?;

        if !flags.summarize {
            info!(items = items.len(), "Collect-only run finished");
            return Ok(RunOutcome::Collected { items: items.len() });
        }
        if items.is_empty() {
            info!(label = %window.label(), "No news in window; nothing to summarize");
            return Ok(RunOutcome::NoNews);
        }

        let digest = Summarizer::new(self.completion, self.config.max_payload_chars)
            .summarize(&items, &window)
            .await?;

        if let Some(path) = &flags.summary_only {
            tokio::fs::write(path, &digest)
                .await
                .map_err(|e| DigestError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
            info!(path = %path.display(), "Digest written; not sending");
            return Ok(RunOutcome::SummaryWritten { path: path.clone() });
        }

        if let Err(e) = SummaryLog::new(&self.config.summaries_log)
            .append(&digest, Utc::now())
            .await
        {
            warn!(error = %e, "Could not write sent-summary log");
        }

        if flags.dry_run {
            self.print_preview(&digest);
            return Ok(RunOutcome::Previewed);
        }

        let transport = self.transport()?;
        let store = self.store();
        let recipients = self.targeted(store.load().await?);
        let engine = DeliveryEngine::new(transport, self.config);

        if flags.verify {
            engine.probe(&recipients).await;
        }
        if recipients.is_empty() {
            warn!("No recipients to deliver to");
            return Ok(RunOutcome::Delivered {
                delivered: 0,
                removed: 0,
            });
        }

        let report = engine.deliver(&digest, &recipients).await;
        let removed = store.remove_many(&report.blocked).await?;
        if removed > 0 {
            info!(removed, "Pruned subscribers who blocked the bot");
        }
        Ok(RunOutcome::Delivered {
            delivered: report.delivered.len(),
            removed,
        })
    }

    /// Replace the Channel Roster with the current folder membership.
    async fn refresh_channels(&self) -> Result<usize, DigestError> {
        let folder = &self.config.folder_name;
        let channels = self.source()?.folder_channels(folder).await?;
        if channels.is_empty() {
            warn!(%folder, "Folder has no channels or does not exist");
        }
        ChannelRoster::new(&self.config.channels_file)
            .replace(&channels)
            .await?;
        info!(%folder, count = channels.len(), "Channel roster refreshed");
        Ok(channels.len())
    }

    async fn verify_only(&self) -> Result<RunOutcome, DigestError> {
        let transport = self.transport()?;
        let recipients = self.targeted(self.store().load().await?);
        let report = DeliveryEngine::new(transport, self.config)
            .probe(&recipients)
            .await;
        Ok(RunOutcome::Verified {
            reachable: report.reachable,
            total: report.total,
        })
    }

    /// Apply the debug filter.
    fn targeted(&self, subscribers: Vec<Subscriber>) -> Vec<Subscriber> {
        if !self.config.debug_mode {
            return subscribers;
        }
        let targeted: Vec<Subscriber> = subscribers
            .into_iter()
            .filter(|s| self.config.is_targeted(s.user_id))
            .collect();
        info!(
            ids = ?self.config.debug_user_ids,
            matched = targeted.len(),
            "Debug mode: restricting recipients"
        );
        targeted
    }

    fn print_preview(&self, digest: &str) {
        let total = digest.chars().count();
        let preview: String = digest.chars().take(self.config.preview_chars).collect();
        println!("--- digest preview ({total} chars) ---");
        println!("{preview}");
        if total > self.config.preview_chars {
            println!("... ({} more chars)", total - self.config.preview_chars);
        }
        info!("Dry run: nothing sent");
    }
}
