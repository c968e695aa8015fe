//! Message Collector.
//!
//! Walks each roster channel's history newest first and keeps the text
//! messages that fall inside the window. Histories are append-only and
//! monotonically timestamped, so the scan of a channel stops at the first
//! message older than the window start.
//!
//! Channels are processed one at a time. A channel that fails to open or
//! errors mid-scan contributes whatever it yielded before the failure and
//! the collection moves on to the next channel. A lost aggregator session
//! is not a channel failure: it ends the collection with an error.

use super::{ChannelSource, HistoryCursor, SourceError};
use crate::models::{Channel, NewsItem};
use crate::window::Window;
use chrono::{DurationRound, TimeDelta};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument, warn};

/// Collect news items for `window` from every channel in the roster.
///
/// Items keep roster order, and within a channel newest-first order.
///
/// # Errors
///
/// [`SourceError::SessionUnavailable`] as soon as any channel reports it.
/// Every other error only drops the rest of that channel.
#[instrument(level = "info", skip_all, fields(channels = channels.len(), start = %window.start, end = %window.end))]
pub async fn collect_news<S>(
    source: &S,
    channels: &[Channel],
    window: &Window,
) -> Result<Vec<NewsItem>, SourceError>
where
    S: ChannelSource,
{
    let per_channel: Vec<Vec<NewsItem>> = stream::iter(channels)
        .then(|channel| async move {
            if !channel.is_addressable() {
                warn!(channel = %channel.display_name(), "Channel has no username or title; skipping");
                return Ok(Vec::new());
            }
            let mut items = Vec::new();
            match collect_channel(source, channel, window, &mut items).await {
                Ok(()) => {
                    debug!(channel = %channel.display_name(), count = items.len(), "Collected channel");
                }
                Err(e) if e.is_session_error() => return Err(e),
                Err(e) => {
                    warn!(
                        channel = %channel.display_name(),
                        kept = items.len(),
                        error = %e,
                        "Channel retrieval failed; keeping partial results"
                    );
                }
            }
            Ok(items)
        })
        .try_collect()
        .await?;

    let items: Vec<NewsItem> = per_channel.into_iter().flatten().collect();
    info!(count = items.len(), label = %window.label(), "Collected news items");
    Ok(items)
}

/// Scan one channel, pushing in-window items into `items` as they are found.
async fn collect_channel<S>(
    source: &S,
    channel: &Channel,
    window: &Window,
    items: &mut Vec<NewsItem>,
) -> Result<(), SourceError>
where
    S: ChannelSource,
{
    let mut cursor = source.open_history(channel).await?;
    while let Some(message) = cursor.next_message().await? {
        // Sub-second precision is dropped before comparing against the window.
        let date = message
            .date
            .duration_trunc(TimeDelta::seconds(1))
            .unwrap_or(message.date);
        if window.is_before(date) {
            break;
        }
        if !window.contains(date) {
            continue;
        }
        let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        debug!(channel = %channel.display_name(), id = message.id, %date, "Kept message");
        items.push(NewsItem {
            text,
            source_link: channel.message_link(message.id),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::SourceMessage;
    use crate::window::Period;
    use chrono::{DateTime, TimeZone, Utc};
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// In-memory source: per-channel histories (newest first) and optional
    /// failure points. Counts how many messages were pulled per channel.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub histories: HashMap<String, Vec<SourceMessage>>,
        pub fail_open: Vec<String>,
        /// Channel name -> index at which `next_message` errors.
        pub fail_at: HashMap<String, usize>,
        pub folder: Vec<Channel>,
        /// Channels whose open reports a lost session.
        pub session_lost: Vec<String>,
        pub pulled: Rc<Cell<usize>>,
    }

    pub(crate) struct FakeCursor {
        messages: std::vec::IntoIter<SourceMessage>,
        position: usize,
        fail_at: Option<usize>,
        pulled: Rc<Cell<usize>>,
    }

    impl HistoryCursor for FakeCursor {
        async fn next_message(&mut self) -> Result<Option<SourceMessage>, SourceError> {
            if Some(self.position) == self.fail_at {
                return Err(SourceError::Retrieval {
                    channel: "fake".to_string(),
                    message: "flood wait".to_string(),
                });
            }
            self.position += 1;
            let next = self.messages.next();
            if next.is_some() {
                self.pulled.set(self.pulled.get() + 1);
            }
            Ok(next)
        }
    }

    impl ChannelSource for FakeSource {
        type Cursor = FakeCursor;

        async fn folder_channels(&self, _folder: &str) -> Result<Vec<Channel>, SourceError> {
            Ok(self.folder.clone())
        }

        async fn open_history(&self, channel: &Channel) -> Result<FakeCursor, SourceError> {
            let name = channel.username.clone().unwrap_or_default();
            if self.session_lost.contains(&name) {
                return Err(SourceError::SessionUnavailable("AUTH_KEY_UNREGISTERED".to_string()));
            }
            if self.fail_open.contains(&name) {
                return Err(SourceError::Retrieval {
                    channel: name,
                    message: "CHANNEL_PRIVATE".to_string(),
                });
            }
            Ok(FakeCursor {
                messages: self.histories.get(&name).cloned().unwrap_or_default().into_iter(),
                position: 0,
                fail_at: self.fail_at.get(&name).copied(),
                pulled: Rc::clone(&self.pulled),
            })
        }
    }

    pub(crate) fn channel(username: &str) -> Channel {
        Channel {
            username: Some(username.to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn msg(id: i32, date: DateTime<Utc>, text: &str) -> SourceMessage {
        SourceMessage {
            id,
            date,
            text: Some(text.to_string()),
        }
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, 0, 0).unwrap()
    }

    fn daily() -> Window {
        Window::for_period(Period::Day, at(10, 6))
    }

    #[tokio::test]
    async fn test_stops_at_first_message_older_than_start() {
        let mut source = FakeSource::default();
        source.histories.insert(
            "news".to_string(),
            vec![
                msg(6, at(10, 2), "too new"),
                msg(5, at(9, 20), "evening"),
                msg(4, at(9, 8), "morning"),
                msg(3, at(8, 23), "older than start"),
                msg(2, at(9, 12), "out of order, never reached"),
                msg(1, at(8, 1), "never reached"),
            ],
        );

        let items = collect_news(&source, &[channel("news")], &daily()).await.unwrap();
        let texts: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["evening", "morning"]);
        assert_eq!(items[0].source_link, "https://t.me/news/5");
        assert_eq!(source.pulled.get(), 4);
    }

    #[tokio::test]
    async fn test_skips_messages_without_text() {
        let mut source = FakeSource::default();
        let mut photo = msg(3, at(9, 15), "");
        photo.text = None;
        source.histories.insert(
            "news".to_string(),
            vec![photo, msg(2, at(9, 14), "   "), msg(1, at(9, 13), "text")],
        );

        let items = collect_news(&source, &[channel("news")], &daily()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "text");
    }

    #[tokio::test]
    async fn test_window_end_is_exclusive_and_scan_continues() {
        let mut source = FakeSource::default();
        source.histories.insert(
            "news".to_string(),
            vec![
                msg(3, at(10, 0), "exactly at end"),
                msg(2, at(9, 0) + chrono::Duration::milliseconds(250), "at start"),
                msg(1, at(8, 23), "before"),
            ],
        );

        let items = collect_news(&source, &[channel("news")], &daily()).await.unwrap();
        let texts: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["at start"]);
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_abort_collection() {
        let mut source = FakeSource::default();
        source.fail_open.push("broken".to_string());
        source
            .histories
            .insert("partial".to_string(), vec![msg(2, at(9, 10), "kept"), msg(1, at(9, 9), "lost")]);
        source.fail_at.insert("partial".to_string(), 1);
        source
            .histories
            .insert("healthy".to_string(), vec![msg(7, at(9, 11), "fine")]);

        let roster = [channel("broken"), channel("partial"), channel("healthy")];
        let items = collect_news(&source, &roster, &daily()).await.unwrap();
        let texts: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["kept", "fine"]);
    }

    #[tokio::test]
    async fn test_unaddressable_channel_is_skipped() {
        let source = FakeSource::default();
        let items = collect_news(&source, &[Channel::default()], &daily()).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(source.pulled.get(), 0);
    }

    #[tokio::test]
    async fn test_lost_session_aborts_collection() {
        let mut source = FakeSource::default();
        source
            .histories
            .insert("first".to_string(), vec![msg(1, at(9, 10), "collected")]);
        source.session_lost.push("second".to_string());

        let roster = [channel("first"), channel("second"), channel("third")];
        let err = collect_news(&source, &roster, &daily()).await.unwrap_err();
        assert!(matches!(err, SourceError::SessionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unavailable_source_is_fatal() {
        let err = collect_news(&crate::sources::UnavailableSource, &[channel("news")], &daily())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::SessionUnavailable(_)));
    }
}
