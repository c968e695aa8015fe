//! Summarizer: turns the collected news items into one digest.
//!
//! All item texts are joined into a single payload and sent in exactly one
//! completion request. Large payloads are not split; crossing
//! `max_payload_chars` only produces a warning so the capacity boundary is
//! visible in the logs.

use crate::api::AskAsync;
use crate::error::DigestError;
use crate::models::NewsItem;
use crate::utils::truncate_for_log;
use crate::window::Window;
use tracing::{debug, info, instrument, warn};

/// Build the user payload: a period header followed by one paragraph per item.
pub fn build_payload(items: &[NewsItem], window: &Window) -> String {
    let header = format!("Period: {} ({}, UTC)", window.period, window.label());
    let body = items
        .iter()
        .map(NewsItem::to_prompt_block)
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{header}\n\n{body}")
}

#[derive(Debug)]
pub struct Summarizer<'a, A> {
    client: &'a A,
    max_payload_chars: usize,
}

impl<'a, A> Summarizer<'a, A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(client: &'a A, max_payload_chars: usize) -> Self {
        Self {
            client,
            max_payload_chars,
        }
    }

    /// Produce the digest for `items`, trimmed of surrounding whitespace.
    ///
    /// # Errors
    ///
    /// [`DigestError::Completion`] if the request fails or returns only
    /// whitespace. Neither case is retried.
    #[instrument(level = "info", skip_all, fields(items = items.len(), label = %window.label()))]
    pub async fn summarize(&self, items: &[NewsItem], window: &Window) -> Result<String, DigestError> {
        let payload = build_payload(items, window);
        let payload_chars = payload.chars().count();
        if payload_chars > self.max_payload_chars {
            warn!(
                payload_chars,
                limit = self.max_payload_chars,
                "Payload exceeds the configured capacity; sending as a single request anyway"
            );
        }
        debug!(payload_chars, "Sending completion request");

        let response = self
            .client
            .ask(&payload)
            .await
            .map_err(|e| DigestError::Completion(e.to_string()))?;
        let digest = response.trim().to_string();
        if digest.is_empty() {
            return Err(DigestError::Completion("empty response".to_string()));
        }
        info!(
            digest_chars = digest.chars().count(),
            preview = %truncate_for_log(&digest, 120),
            "Digest generated"
        );
        Ok(digest)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::window::Period;
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;
    use std::error::Error;

    /// Records every payload and answers with a fixed response or error.
    pub(crate) struct FakeCompletion {
        pub response: Result<String, String>,
        pub requests: RefCell<Vec<String>>,
    }

    impl FakeCompletion {
        pub(crate) fn ok(response: &str) -> Self {
            Self {
                response: Ok(response.to_string()),
                requests: RefCell::new(Vec::new()),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                response: Err(message.to_string()),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl AskAsync for FakeCompletion {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            self.requests.borrow_mut().push(text.to_string());
            self.response.clone().map_err(|e| e.into())
        }
    }

    fn window() -> Window {
        Window::for_period(Period::Day, Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap())
    }

    fn item(text: &str, link: &str) -> NewsItem {
        NewsItem {
            text: text.to_string(),
            source_link: link.to_string(),
        }
    }

    #[test]
    fn test_payload_joins_items_with_blank_lines() {
        let payload = build_payload(
            &[item("First", "https://t.me/a/1"), item("Second", "https://t.me/b/2")],
            &window(),
        );
        assert_eq!(
            payload,
            "Period: day (2024-06-09, UTC)\n\nFirst\nSource: https://t.me/a/1\n\n\nSecond\nSource: https://t.me/b/2\n"
        );
    }

    #[tokio::test]
    async fn test_single_request_and_trimmed_output() {
        let client = FakeCompletion::ok("\n  Main\n• item  \n\n");
        let items: Vec<NewsItem> = (0..500)
            .map(|i| item(&format!("news {i}"), &format!("https://t.me/c/{i}")))
            .collect();

        let digest = Summarizer::new(&client, 100).summarize(&items, &window()).await.unwrap();
        assert_eq!(digest, "Main\n• item");
        let requests = client.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("news 499"));
    }

    #[tokio::test]
    async fn test_completion_failure_is_fatal() {
        let client = FakeCompletion::failing("rate limited");
        let err = Summarizer::new(&client, 1000)
            .summarize(&[item("x", "y")], &window())
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::Completion(ref m) if m.contains("rate limited")));
        assert_eq!(client.requests.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_response_is_error() {
        let client = FakeCompletion::ok("  \n ");
        let result = Summarizer::new(&client, 1000).summarize(&[item("x", "y")], &window()).await;
        assert!(matches!(result, Err(DigestError::Completion(_))));
    }
}
