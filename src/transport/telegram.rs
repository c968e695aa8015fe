//! Telegram Bot API adapter over `teloxide`.

use super::{BotTransport, DeliveryError};
use crate::models::{InboundMessage, SubscriberProfile};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, ChatAction, UpdateKind};
use teloxide::{ApiError, RequestError};
use tracing::{debug, info, instrument};

const UPDATES_BATCH: u8 = 100;
const UPDATES_TIMEOUT_SECS: u32 = 10;

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Create the adapter. No network call is made here.
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }
}

/// Map a teloxide error onto the delivery taxonomy.
pub fn classify(err: RequestError) -> DeliveryError {
    match err {
        RequestError::Api(ApiError::BotBlocked) => DeliveryError::Blocked,
        RequestError::Api(ApiError::ChatNotFound) => DeliveryError::NotFound,
        e @ (RequestError::Network(_) | RequestError::RetryAfter(_)) => {
            DeliveryError::Transient(e.to_string())
        }
        e => DeliveryError::Fatal(e.to_string()),
    }
}

impl BotTransport for TelegramTransport {
    async fn send_text(&self, user_id: i64, text: &str) -> Result<i32, DeliveryError> {
        let message = self
            .bot
            .send_message(ChatId(user_id), text)
            .await
            .map_err(classify)?;
        Ok(message.id.0)
    }

    async fn send_typing(&self, user_id: i64) -> Result<(), DeliveryError> {
        self.bot
            .send_chat_action(ChatId(user_id), ChatAction::Typing)
            .await
            .map_err(classify)?;
        Ok(())
    }

    /// Page through `getUpdates` until the queue is empty.
    ///
    /// Only private text messages with a known sender are returned. The bot
    /// must not be polled by another process while this runs.
    #[instrument(level = "info", skip_all)]
    async fn pending_messages(&self) -> Result<Vec<InboundMessage>, DeliveryError> {
        let mut offset: Option<i32> = None;
        let mut messages = Vec::new();
        let mut seen = 0usize;

        loop {
            let mut request = self
                .bot
                .get_updates()
                .limit(UPDATES_BATCH)
                .timeout(UPDATES_TIMEOUT_SECS)
                .allowed_updates(vec![AllowedUpdate::Message]);
            if let Some(offset) = offset {
                request = request.offset(offset);
            }
            let updates = request.await.map_err(classify)?;
            if updates.is_empty() {
                break;
            }
            for update in updates {
                seen += 1;
                offset = Some(update.id.as_offset());
                let UpdateKind::Message(msg) = update.kind else {
                    continue;
                };
                if !msg.chat.is_private() {
                    continue;
                }
                let (Some(text), Some(user)) = (msg.text(), msg.from.as_ref()) else {
                    continue;
                };
                messages.push(InboundMessage {
                    sender: SubscriberProfile {
                        user_id: user.id.0 as i64,
                        username: user.username.clone(),
                        first_name: Some(user.first_name.clone()).filter(|n| !n.is_empty()),
                        last_name: user.last_name.clone(),
                    },
                    text: text.to_string(),
                    received_at: msg.date,
                });
            }
            debug!(seen, kept = messages.len(), "Fetched update batch");
        }
        info!(seen, kept = messages.len(), "Drained pending updates");
        Ok(messages)
    }
}
