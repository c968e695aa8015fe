//! Data models for subscribers, source channels and the digest pipeline.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Subscriber`]: A durable roster entry for a bot recipient
//! - [`Channel`]: A source channel with opaque, pass-through platform metadata
//! - [`SourceMessage`] and [`NewsItem`]: Raw channel history and the items kept for a window
//! - [`DeliveryRecord`]: One audit line per delivered chunk
//! - [`InboundMessage`]: A private message received by the bot (used by backfill)
//!
//! Persisted models carry a flattened `extra`/`metadata` map so fields written
//! by other tools survive a load/save cycle untouched.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder stored for profile fields the platform did not report.
pub const UNKNOWN_FIELD: &str = "-";

/// Timestamp format used for `added_at` in the subscriber file.
pub const ADDED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn unknown() -> String {
    UNKNOWN_FIELD.to_string()
}

/// A recipient of the digest.
///
/// `user_id` is the platform-assigned identity and the primary key of the
/// roster. `added_at` is written once, when the subscriber first appears.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Subscriber {
    /// Platform user id.
    pub user_id: i64,
    /// Public username without the leading `@`, or `"-"`.
    #[serde(default = "unknown")]
    pub username: String,
    /// First name, or `"-"`.
    #[serde(default = "unknown")]
    pub first_name: String,
    /// Last name, or `"-"`.
    #[serde(default = "unknown")]
    pub last_name: String,
    /// When the subscriber was first added (`YYYY-MM-DD HH:MM:SS`, UTC).
    #[serde(default)]
    pub added_at: String,
    /// Fields written by other tools, kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Subscriber {
    /// Build a new roster entry from a profile, stamping `added_at` with `now`.
    pub fn from_profile(profile: &SubscriberProfile, now: DateTime<Utc>) -> Self {
        Self {
            user_id: profile.user_id,
            username: or_unknown(profile.username.as_deref()),
            first_name: or_unknown(profile.first_name.as_deref()),
            last_name: or_unknown(profile.last_name.as_deref()),
            added_at: now.format(ADDED_AT_FORMAT).to_string(),
            extra: Map::new(),
        }
    }

    /// Fill sentinel profile fields from a fresher profile.
    ///
    /// Known values are never replaced and `added_at` is only set when it was
    /// never recorded. Returns `true` if anything changed.
    pub fn fill_missing(&mut self, profile: &SubscriberProfile, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for (field, fresh) in [
            (&mut self.username, profile.username.as_deref()),
            (&mut self.first_name, profile.first_name.as_deref()),
            (&mut self.last_name, profile.last_name.as_deref()),
        ] {
            if is_unknown(field) {
                if let Some(value) = fresh.filter(|v| !v.is_empty()) {
                    *field = value.to_string();
                    changed = true;
                }
            }
        }
        if self.added_at.is_empty() {
            self.added_at = now.format(ADDED_AT_FORMAT).to_string();
            changed = true;
        }
        changed
    }
}

fn is_unknown(value: &str) -> bool {
    value.is_empty() || value == UNKNOWN_FIELD
}

fn or_unknown(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => unknown(),
    }
}

/// Identity and display fields of a platform user, as reported by the bot API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberProfile {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A private text message received by the bot.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: SubscriberProfile,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Render the raw inbound log line (without trailing newline).
    pub fn to_log_line(&self) -> String {
        format!(
            "{} | user_id: {} | username: @{} | name: {} {} | text: {}",
            self.received_at.format(ADDED_AT_FORMAT),
            self.sender.user_id,
            self.sender.username.as_deref().unwrap_or(UNKNOWN_FIELD),
            self.sender.first_name.as_deref().unwrap_or(UNKNOWN_FIELD),
            self.sender.last_name.as_deref().unwrap_or(UNKNOWN_FIELD),
            escape_newlines(&self.text),
        )
    }
}

/// A source channel in the roster.
///
/// Only `id`, `username` and `title` are interpreted; everything else the
/// platform reported is carried in `metadata` in its original order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Channel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Keys of [`Channel`] that are interpreted rather than passed through.
const CHANNEL_CONTRACT_KEYS: [&str; 3] = ["id", "username", "title"];

impl Channel {
    /// Build a roster entry from what the platform reported.
    ///
    /// `fields` land in `metadata` in the given order. Keys that shadow the
    /// contract fields are dropped so the serialized entry has no duplicates.
    pub fn from_platform<K>(
        id: i64,
        username: Option<&str>,
        title: &str,
        fields: impl IntoIterator<Item = (K, Value)>,
    ) -> Self
    where
        K: Into<String>,
    {
        let metadata = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .filter(|(k, _)| !CHANNEL_CONTRACT_KEYS.contains(&k.as_str()))
            .collect();
        Self {
            id: Some(id),
            username: username.filter(|u| !u.is_empty()).map(str::to_string),
            title: Some(title.to_string()).filter(|t| !t.is_empty()),
            metadata,
        }
    }

    /// Human-readable identifier for logs: `@username`, else the title.
    pub fn display_name(&self) -> String {
        match (&self.username, &self.title) {
            (Some(u), _) if !u.is_empty() => format!("@{u}"),
            (_, Some(t)) if !t.is_empty() => t.clone(),
            _ => self
                .id
                .map(|id| id.to_string())
                .unwrap_or_else(|| UNKNOWN_FIELD.to_string()),
        }
    }

    /// `true` when the channel carries enough identity to be retrieved.
    pub fn is_addressable(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            || self.title.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Back-reference link to a message of this channel.
    ///
    /// Public channels link through their username; private ones through the
    /// `t.me/c/<id>` form. Channels with only a title get `title/message-id`.
    pub fn message_link(&self, message_id: i32) -> String {
        let path = match (&self.username, self.id) {
            (Some(u), _) if !u.is_empty() => format!("{u}/{message_id}"),
            (_, Some(id)) => format!("c/{id}/{message_id}"),
            _ => return format!("{}/{message_id}", self.display_name()),
        };
        url::Url::parse("https://t.me/")
            .and_then(|base| base.join(&path))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("https://t.me/{path}"))
    }
}

/// One message of a channel history as returned by the aggregator session.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMessage {
    pub id: i32,
    pub date: DateTime<Utc>,
    /// Message text; media-only posts carry `None` or an empty string.
    pub text: Option<String>,
}

/// A message kept for summarization, with a link back to its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    pub text: String,
    pub source_link: String,
}

impl NewsItem {
    /// Render the item as one paragraph of the summarizer payload.
    pub fn to_prompt_block(&self) -> String {
        format!("{}\nSource: {}\n", self.text, self.source_link)
    }
}

/// Audit entry for one delivered chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    /// Platform message id returned for the chunk.
    pub message_chunk_id: i32,
    /// Length of `text` in characters.
    pub length: usize,
    pub text: String,
}

impl DeliveryRecord {
    pub fn new(user_id: i64, message_chunk_id: i32, text: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            user_id,
            message_chunk_id,
            length: text.chars().count(),
            text: text.to_string(),
        }
    }

    /// Render the tab-separated log line (without trailing newline).
    pub fn to_log_line(&self) -> String {
        format!(
            "{}\tuser_id={}\tmessage_id={}\tlen={}\t{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.user_id,
            self.message_chunk_id,
            self.length,
            escape_newlines(&self.text),
        )
    }
}

fn escape_newlines(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 8, 30, 0).unwrap()
    }

    fn profile(id: i64) -> SubscriberProfile {
        SubscriberProfile {
            user_id: id,
            username: Some("alice".to_string()),
            first_name: Some("Alice".to_string()),
            last_name: None,
        }
    }

    #[test]
    fn test_subscriber_from_profile_uses_sentinels() {
        let sub = Subscriber::from_profile(&profile(7), now());
        assert_eq!(sub.user_id, 7);
        assert_eq!(sub.username, "alice");
        assert_eq!(sub.last_name, "-");
        assert_eq!(sub.added_at, "2024-06-10 08:30:00");
    }

    #[test]
    fn test_subscriber_deserialization_defaults_and_extra_fields() {
        let json = r#"{"user_id": 42, "language": "ru"}"#;
        let sub: Subscriber = serde_json::from_str(json).unwrap();
        assert_eq!(sub.user_id, 42);
        assert_eq!(sub.username, "-");
        assert_eq!(sub.first_name, "-");
        assert!(sub.added_at.is_empty());
        assert_eq!(sub.extra.get("language"), Some(&Value::from("ru")));

        let back = serde_json::to_string(&sub).unwrap();
        assert!(back.contains("\"language\":\"ru\""));
    }

    #[test]
    fn test_fill_missing_keeps_known_values_and_added_at() {
        let mut sub = Subscriber {
            user_id: 1,
            username: "-".to_string(),
            first_name: "Bob".to_string(),
            last_name: "-".to_string(),
            added_at: "2023-01-01 00:00:00".to_string(),
            extra: Map::new(),
        };
        let fresh = SubscriberProfile {
            user_id: 1,
            username: Some("bobby".to_string()),
            first_name: Some("Robert".to_string()),
            last_name: None,
        };
        assert!(sub.fill_missing(&fresh, now()));
        assert_eq!(sub.username, "bobby");
        assert_eq!(sub.first_name, "Bob");
        assert_eq!(sub.last_name, "-");
        assert_eq!(sub.added_at, "2023-01-01 00:00:00");
        assert!(!sub.fill_missing(&fresh, now()));
    }

    #[test]
    fn test_channel_passthrough_metadata_preserves_order() {
        let json = r#"{"zeta": 1, "username": "news", "alpha": {"nested": true}, "id": 5}"#;
        let channel: Channel = serde_json::from_str(json).unwrap();
        assert_eq!(channel.username.as_deref(), Some("news"));
        assert_eq!(channel.id, Some(5));
        let keys: Vec<&String> = channel.metadata.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_channel_from_platform_keeps_reported_fields() {
        let channel = Channel::from_platform(
            -100123,
            Some("daily"),
            "Daily News",
            [
                ("participants_count", Value::from(5400)),
                ("id", Value::from(1)),
                ("verified", Value::from(true)),
                ("access_hash", Value::Null),
                ("date", Value::from(1_700_000_000)),
            ],
        );
        assert_eq!(channel.id, Some(-100123));
        assert_eq!(channel.username.as_deref(), Some("daily"));
        let keys: Vec<&String> = channel.metadata.keys().collect();
        assert_eq!(keys, vec!["participants_count", "verified", "access_hash", "date"]);

        let json = serde_json::to_string(&channel).unwrap();
        assert_eq!(json.matches("\"id\"").count(), 1);
        let back: Channel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, channel);
    }

    #[test]
    fn test_channel_message_links() {
        let public = Channel {
            username: Some("technews".to_string()),
            ..Default::default()
        };
        assert_eq!(public.message_link(123), "https://t.me/technews/123");

        let private = Channel {
            id: Some(100500),
            title: Some("Closed".to_string()),
            ..Default::default()
        };
        assert_eq!(private.message_link(9), "https://t.me/c/100500/9");

        let titled = Channel {
            title: Some("Only Title".to_string()),
            ..Default::default()
        };
        assert_eq!(titled.message_link(3), "Only Title/3");
        assert!(titled.is_addressable());
        assert!(!Channel::default().is_addressable());
    }

    #[test]
    fn test_delivery_record_log_line_is_single_line() {
        let record = DeliveryRecord::new(5, 77, "Part 1/2\n\nhello", now());
        assert_eq!(record.length, 15);
        let line = record.to_log_line();
        assert_eq!(
            line,
            "2024-06-10T08:30:00Z\tuser_id=5\tmessage_id=77\tlen=15\tPart 1/2\\n\\nhello"
        );
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_news_item_prompt_block() {
        let item = NewsItem {
            text: "Launch".to_string(),
            source_link: "https://t.me/a/1".to_string(),
        };
        assert_eq!(item.to_prompt_block(), "Launch\nSource: https://t.me/a/1\n");
    }
}
