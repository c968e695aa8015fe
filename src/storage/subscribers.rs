//! Subscriber Store: the durable roster of digest recipients.
//!
//! The file holds `{ "subscribers": [ ... ] }`. Every save first copies the
//! previous content to `<file>.<YYYYmmdd-HHMMSS>.bak` and then rewrites the
//! whole file. `user_id` is unique; duplicates found on load are dropped
//! (first occurrence wins).

use super::{StoreError, read_json, write_json};
use crate::models::{Subscriber, SubscriberProfile};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

#[derive(Debug, Default, Deserialize, Serialize)]
struct SubscribersFile {
    #[serde(default)]
    subscribers: Vec<Subscriber>,
}

/// File-backed subscriber roster.
#[derive(Debug, Clone)]
pub struct SubscriberStore {
    path: PathBuf,
}

impl SubscriberStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all subscribers.
    ///
    /// A missing file is an empty roster. An unreadable or malformed file is
    /// an error: silently treating it as empty would let the next save wipe it.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<Subscriber>, StoreError> {
        let Some(file) = read_json::<SubscribersFile>(&self.path).await? else {
            warn!("Subscriber file not found; roster is empty");
            return Ok(Vec::new());
        };
        let total = file.subscribers.len();
        let subscribers: Vec<Subscriber> = file
            .subscribers
            .into_iter()
            .unique_by(|s| s.user_id)
            .collect();
        if subscribers.len() != total {
            warn!(
                dropped = total - subscribers.len(),
                "Duplicate user_id entries dropped while loading"
            );
        }
        info!(count = subscribers.len(), "Loaded subscribers");
        Ok(subscribers)
    }

    /// Persist the full roster, backing up the previous file first.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = subscribers.len()))]
    pub async fn save(&self, subscribers: &[Subscriber]) -> Result<(), StoreError> {
        self.backup().await;
        let file = SubscribersFile {
            subscribers: subscribers.to_vec(),
        };
        write_json(&self.path, &file).await?;
        info!("Saved subscribers");
        Ok(())
    }

    /// Add a subscriber unless the id is already present.
    ///
    /// Returns `true` if the subscriber was newly added.
    pub async fn add(&self, profile: &SubscriberProfile) -> Result<bool, StoreError> {
        let mut subscribers = self.load().await?;
        if !insert_subscriber(&mut subscribers, profile, Utc::now()) {
            info!(user_id = profile.user_id, "Subscriber already present");
            return Ok(false);
        }
        self.save(&subscribers).await?;
        info!(user_id = profile.user_id, "Added subscriber");
        Ok(true)
    }

    /// Remove one subscriber. Returns `true` if it was present.
    pub async fn remove(&self, user_id: i64) -> Result<bool, StoreError> {
        Ok(self.remove_many(&[user_id]).await? > 0)
    }

    /// Remove every listed id in one read-modify-write cycle.
    ///
    /// Returns the number of removed entries. Nothing is written when none of
    /// the ids are present.
    #[instrument(level = "info", skip_all, fields(requested = user_ids.len()))]
    pub async fn remove_many(&self, user_ids: &[i64]) -> Result<usize, StoreError> {
        if user_ids.is_empty() {
            return Ok(0);
        }
        let mut subscribers = self.load().await?;
        let before = subscribers.len();
        subscribers.retain(|s| !user_ids.contains(&s.user_id));
        let removed = before - subscribers.len();
        if removed > 0 {
            self.save(&subscribers).await?;
            info!(removed, remaining = subscribers.len(), "Removed subscribers");
        }
        Ok(removed)
    }

    fn backup_path(&self, now: DateTime<Utc>) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.bak", now.format("%Y%m%d-%H%M%S")));
        self.path.with_file_name(name)
    }

    /// Copy the current file aside. Failure is logged; the save still proceeds.
    async fn backup(&self) {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return;
        }
        let backup = self.backup_path(Utc::now());
        match tokio::fs::copy(&self.path, &backup).await {
            Ok(_) => info!(backup = %backup.display(), "Backed up subscriber file"),
            Err(e) => warn!(backup = %backup.display(), error = %e, "Subscriber backup failed"),
        }
    }
}

/// Insert a subscriber into an in-memory roster, keyed by `user_id`.
///
/// Returns `false` (and leaves the roster untouched) if the id is present.
pub fn insert_subscriber(
    subscribers: &mut Vec<Subscriber>,
    profile: &SubscriberProfile,
    now: DateTime<Utc>,
) -> bool {
    if subscribers.iter().any(|s| s.user_id == profile.user_id) {
        return false;
    }
    subscribers.push(Subscriber::from_profile(profile, now));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile(id: i64, username: &str) -> SubscriberProfile {
        SubscriberProfile {
            user_id: id,
            username: Some(username.to_string()),
            first_name: None,
            last_name: None,
        }
    }

    async fn backups_in(dir: &Path) -> usize {
        let mut entries = tokio::fs::read_dir(dir).await.unwrap();
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().ends_with(".bak") {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = SubscriberStore::new(dir.path().join("subscribers.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subscribers.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let store = SubscriberStore::new(&path);
        assert!(matches!(store.load().await, Err(StoreError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = SubscriberStore::new(dir.path().join("subscribers.json"));

        assert!(store.add(&profile(10, "first")).await.unwrap());
        assert!(!store.add(&profile(10, "second")).await.unwrap());

        let subs = store.load().await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].username, "first");
    }

    #[tokio::test]
    async fn test_save_writes_backup_of_previous_content() {
        let dir = tempdir().unwrap();
        let store = SubscriberStore::new(dir.path().join("subscribers.json"));

        store.add(&profile(1, "a")).await.unwrap();
        assert_eq!(backups_in(dir.path()).await, 0);

        store.add(&profile(2, "b")).await.unwrap();
        assert_eq!(backups_in(dir.path()).await, 1);
    }

    #[tokio::test]
    async fn test_remove_many_only_touches_listed_ids() {
        let dir = tempdir().unwrap();
        let store = SubscriberStore::new(dir.path().join("subscribers.json"));
        for id in 1..=3 {
            store.add(&profile(id, "u")).await.unwrap();
        }

        assert_eq!(store.remove_many(&[2, 99]).await.unwrap(), 1);
        let ids: Vec<i64> = store.load().await.unwrap().iter().map(|s| s.user_id).collect();
        assert_eq!(ids, vec![1, 3]);

        assert!(!store.remove(2).await.unwrap());
        assert!(store.remove(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_load_drops_duplicate_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subscribers.json");
        let json = r#"{"subscribers": [
            {"user_id": 5, "username": "keep"},
            {"user_id": 5, "username": "drop"},
            {"user_id": 6}
        ]}"#;
        tokio::fs::write(&path, json).await.unwrap();

        let subs = SubscriberStore::new(&path).load().await.unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].username, "keep");
    }

    #[test]
    fn test_backup_path_appends_timestamp_suffix() {
        use chrono::TimeZone;
        let store = SubscriberStore::new("/data/subscribers.json");
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 5).unwrap();
        assert_eq!(
            store.backup_path(now),
            PathBuf::from("/data/subscribers.json.20240610-080005.bak")
        );
    }
}
