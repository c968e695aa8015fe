//! Roster backfill from the bot's pending updates.
//!
//! Everyone who wrote to the bot privately becomes a subscriber. Existing
//! entries only gain profile fields that were recorded as unknown.

use crate::error::DigestError;
use crate::models::InboundMessage;
use crate::storage::logs::InboundLog;
use crate::storage::subscribers::{SubscriberStore, insert_subscriber};
use crate::transport::BotTransport;
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub messages: usize,
    pub added: usize,
    pub updated: usize,
}

/// Drain pending updates, log them, and merge their senders into the store.
///
/// The store is written once, sorted by `user_id`, and only if it changed.
#[instrument(level = "info", skip_all)]
pub async fn backfill_subscribers<T: BotTransport>(
    transport: &T,
    store: &SubscriberStore,
    inbound_log: &InboundLog,
    now: DateTime<Utc>,
) -> Result<BackfillReport, DigestError> {
    let messages = transport.pending_messages().await?;
    for message in &messages {
        if let Err(e) = inbound_log.record(message).await {
            warn!(user_id = message.sender.user_id, error = %e, "Could not write inbound log");
        }
    }

    let mut subscribers = store.load().await?;
    let mut report = BackfillReport {
        messages: messages.len(),
        ..Default::default()
    };
    for InboundMessage { sender, .. } in &messages {
        if insert_subscriber(&mut subscribers, sender, now) {
            info!(user_id = sender.user_id, username = ?sender.username, "New subscriber");
            report.added += 1;
        } else if let Some(existing) = subscribers.iter_mut().find(|s| s.user_id == sender.user_id) {
            if existing.fill_missing(sender, now) {
                report.updated += 1;
            }
        }
    }

    if report.added + report.updated > 0 {
        subscribers.sort_by_key(|s| s.user_id);
        store.save(&subscribers).await?;
    }
    info!(
        messages = report.messages,
        added = report.added,
        updated = report.updated,
        total = subscribers.len(),
        "Backfill finished"
    );
    Ok(report)
}
