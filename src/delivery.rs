//! Delivery Engine: chunk the digest and fan it out to subscribers.
//!
//! Recipients are served one at a time with a fixed pause after every send.
//! A failure for one recipient abandons that recipient's remaining chunks and
//! moves on to the next one. The engine never touches the Subscriber Store;
//! it reports which recipients blocked the bot and the caller prunes them in
//! a single write once the whole loop has finished.

use crate::config::Config;
use crate::models::{DeliveryRecord, Subscriber};
use crate::storage::logs::SentLog;
use crate::transport::{BotTransport, DeliveryError};
use chrono::Utc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Room kept for the `Part i/N` prefix of multi-chunk digests.
///
/// A message limit must exceed this so every part carries at least one
/// character of the digest.
pub const PART_HEADER_RESERVE: usize = 32;

/// Split `text` into chunks of at most `max_len` characters.
///
/// Chunks break after a paragraph separator (`\n\n`) whenever possible and
/// are filled first-fit. A paragraph longer than `max_len` is cut hard at the
/// limit. Concatenating the chunks yields `text` unchanged.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.chars().count() <= max_len {
        return if text.is_empty() { Vec::new() } else { vec![text.to_string()] };
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in text.split_inclusive("\n\n") {
        let len = paragraph.chars().count();
        if current_len + len <= max_len {
            current.push_str(paragraph);
            current_len += len;
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if len <= max_len {
            current.push_str(paragraph);
            current_len = len;
            continue;
        }
        let mut rest = paragraph;
        while rest.chars().count() > max_len {
            let cut = rest
                .char_indices()
                .nth(max_len)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            chunks.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        current.push_str(rest);
        current_len = rest.chars().count();
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// The messages actually sent for `digest`.
///
/// Single-chunk digests go out verbatim. Longer ones are split with room for
/// a `Part i/N` prefix, so every message still fits in `max_len` as long as
/// `max_len` exceeds [`PART_HEADER_RESERVE`] (enforced by the config).
/// Whitespace-only chunks are dropped since the transport rejects them.
pub fn prepare_messages(digest: &str, max_len: usize) -> Vec<String> {
    let single = split_message(digest, max_len);
    if single.len() <= 1 {
        return single.into_iter().filter(|c| !c.trim().is_empty()).collect();
    }

    let body_len = max_len.saturating_sub(PART_HEADER_RESERVE).max(1);
    let chunks: Vec<String> = split_message(digest, body_len)
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .collect();
    let total = chunks.len();
    if total == 1 {
        return chunks;
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| format!("Part {}/{total}\n\n{chunk}", i + 1))
        .collect()
}

/// Per-recipient outcomes of one delivery run.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Received every chunk.
    pub delivered: Vec<i64>,
    /// Blocked the bot; to be removed from the store.
    pub blocked: Vec<i64>,
    /// Chat not found; kept.
    pub not_found: Vec<i64>,
    /// Any other failure; kept.
    pub failed: Vec<i64>,
    /// One record per chunk that reached a recipient.
    pub records: Vec<DeliveryRecord>,
}

impl DeliveryReport {
    fn note_failure(&mut self, user_id: i64, err: &DeliveryError) {
        match err {
            DeliveryError::Blocked => self.blocked.push(user_id),
            DeliveryError::NotFound => self.not_found.push(user_id),
            DeliveryError::Transient(_) | DeliveryError::Fatal(_) => self.failed.push(user_id),
        }
    }
}

/// Outcome of the reachability probe.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub total: usize,
    pub reachable: usize,
    pub blocked: Vec<i64>,
    pub not_found: Vec<i64>,
    pub failed: Vec<i64>,
}

/// Sends digests and probes over a [`BotTransport`].
pub struct DeliveryEngine<'a, T> {
    transport: &'a T,
    sent_log: SentLog,
    send_pacing: Duration,
    probe_pacing: Duration,
    max_message_len: usize,
}

impl<'a, T: BotTransport> DeliveryEngine<'a, T> {
    pub fn new(transport: &'a T, config: &Config) -> Self {
        Self {
            transport,
            sent_log: SentLog::new(&config.sent_messages_log),
            send_pacing: config.send_pacing,
            probe_pacing: config.probe_pacing,
            max_message_len: config.max_message_len,
        }
    }

    /// Send `digest` to every subscriber, in roster order.
    #[instrument(level = "info", skip_all, fields(recipients = subscribers.len()))]
    pub async fn deliver(&self, digest: &str, subscribers: &[Subscriber]) -> DeliveryReport {
        let messages = prepare_messages(digest, self.max_message_len);
        info!(chunks = messages.len(), "Delivering digest");

        let mut report = DeliveryReport::default();
        for subscriber in subscribers {
            match self.deliver_one(subscriber.user_id, &messages, &mut report.records).await {
                Ok(()) => report.delivered.push(subscriber.user_id),
                Err(e) => {
                    warn!(
                        user_id = subscriber.user_id,
                        error = %e,
                        permanent = e.is_permanent(),
                        "Delivery failed"
                    );
                    report.note_failure(subscriber.user_id, &e);
                }
            }
        }

        info!(
            delivered = report.delivered.len(),
            blocked = report.blocked.len(),
            not_found = report.not_found.len(),
            failed = report.failed.len(),
            "Delivery finished"
        );
        report
    }

    async fn deliver_one(
        &self,
        user_id: i64,
        messages: &[String],
        records: &mut Vec<DeliveryRecord>,
    ) -> Result<(), DeliveryError> {
        for message in messages {
            let sent = self.transport.send_text(user_id, message).await;
            tokio::time::sleep(self.send_pacing).await;
            let message_id = sent?;

            let record = DeliveryRecord::new(user_id, message_id, message, Utc::now());
            if let Err(e) = self.sent_log.record(&record).await {
                warn!(path = %self.sent_log.path().display(), error = %e, "Could not write sent-message log");
            }
            records.push(record);
        }
        Ok(())
    }

    /// Send a typing signal to each subscriber and classify failures.
    ///
    /// Only reports; removal happens solely after a real delivery attempt.
    #[instrument(level = "info", skip_all, fields(recipients = subscribers.len()))]
    pub async fn probe(&self, subscribers: &[Subscriber]) -> ProbeReport {
        let mut report = ProbeReport {
            total: subscribers.len(),
            ..Default::default()
        };
        for subscriber in subscribers {
            let user_id = subscriber.user_id;
            match self.transport.send_typing(user_id).await {
                Ok(()) => report.reachable += 1,
                Err(DeliveryError::Blocked) => {
                    warn!(user_id, "Subscriber blocked the bot");
                    report.blocked.push(user_id);
                }
                Err(DeliveryError::NotFound) => {
                    warn!(user_id, "Chat not found");
                    report.not_found.push(user_id);
                }
                Err(e) => {
                    warn!(user_id, error = %e, "Probe failed");
                    report.failed.push(user_id);
                }
            }
            tokio::time::sleep(self.probe_pacing).await;
        }
        info!("Reachable: {}/{}", report.reachable, report.total);
        report
    }
}
