//! Channel Roster: the cached list of source channels.
//!
//! The roster is fetched from a named folder on the aggregating account and
//! replaced wholesale on refresh; entries are never edited one by one.

use super::{StoreError, read_json, write_json};
use crate::models::Channel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

#[derive(Debug, Default, Deserialize, Serialize)]
struct ChannelsFile {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Clone)]
pub struct ChannelRoster {
    path: PathBuf,
}

impl ChannelRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the cached roster. A missing file yields an empty roster.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<Channel>, StoreError> {
        match read_json::<ChannelsFile>(&self.path).await? {
            Some(file) => {
                info!(count = file.channels.len(), "Loaded channel roster");
                Ok(file.channels)
            }
            None => {
                warn!("Channel roster not found; run with --channels to fetch it");
                Ok(Vec::new())
            }
        }
    }

    /// Replace the whole roster.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = channels.len()))]
    pub async fn replace(&self, channels: &[Channel]) -> Result<(), StoreError> {
        let file = ChannelsFile {
            channels: channels.to_vec(),
        };
        write_json(&self.path, &file).await?;
        if channels.is_empty() {
            warn!("Saved an empty channel roster");
        } else {
            info!("Saved channel roster");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};
    use tempfile::tempdir;

    fn channel(username: &str) -> Channel {
        let mut metadata = Map::new();
        metadata.insert("participants_count".to_string(), Value::from(1200));
        Channel {
            id: Some(1),
            username: Some(username.to_string()),
            title: Some(username.to_uppercase()),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_missing_roster_is_empty() {
        let dir = tempdir().unwrap();
        let roster = ChannelRoster::new(dir.path().join("channels.json"));
        assert!(roster.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_overwrites_whole_roster() {
        let dir = tempdir().unwrap();
        let roster = ChannelRoster::new(dir.path().join("channels.json"));

        roster.replace(&[channel("a"), channel("b")]).await.unwrap();
        roster.replace(&[channel("c")]).await.unwrap();

        let loaded = roster.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].username.as_deref(), Some("c"));
        assert_eq!(
            loaded[0].metadata.get("participants_count"),
            Some(&Value::from(1200))
        );
    }

    #[tokio::test]
    async fn test_roster_file_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("channels.json");
        ChannelRoster::new(&path).replace(&[channel("a")]).await.unwrap();

        let raw: Value = serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(raw["channels"][0]["username"], Value::from("a"));
        assert_eq!(raw["channels"][0]["title"], Value::from("A"));
    }
}
