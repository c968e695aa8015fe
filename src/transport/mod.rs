//! Bot-side messaging transport.
//!
//! The delivery engine only sees [`BotTransport`] and the tagged
//! [`DeliveryError`]. Deciding which platform error means "blocked" versus
//! "not found" is the adapter's job ([`telegram::TelegramTransport`]).

pub mod telegram;

use crate::models::InboundMessage;
use thiserror::Error;

/// Outcome class of a failed bot call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The recipient blocked the bot. Permanent until they write again.
    #[error("recipient blocked the bot")]
    Blocked,

    /// The chat is unknown to the platform. Possibly transient; recipient kept.
    #[error("chat not found")]
    NotFound,

    /// Network trouble or rate limiting.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// Any other platform-side rejection.
    #[error("transport error: {0}")]
    Fatal(String),
}

impl DeliveryError {
    /// `true` if the recipient should be pruned from the roster.
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Blocked)
    }
}

/// Sends to recipients by user id.
pub trait BotTransport {
    /// Send one text message; returns the platform message id.
    async fn send_text(&self, user_id: i64, text: &str) -> Result<i32, DeliveryError>;

    /// Send a lightweight "typing" presence signal.
    async fn send_typing(&self, user_id: i64) -> Result<(), DeliveryError>;

    /// Drain the bot's pending private text messages.
    async fn pending_messages(&self) -> Result<Vec<InboundMessage>, DeliveryError>;
}
