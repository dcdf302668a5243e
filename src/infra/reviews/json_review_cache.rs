// JSON file backed review cache.
//
// In memory: DashMap of host -> Vec<PendingNotification>, so enqueue and
// consume for one host are atomic without a global lock.
// On disk: { "host": [ { "nick": ..., "message": {...} }, ... ] }, rewritten
// through a temp file + rename on every mutation.

use crate::core::reviews::{CacheError, NotificationCache, PendingNotification, ReviewSummary};
use crate::core::tracking::OutboundMessage;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

type Snapshot = BTreeMap<String, Vec<PendingNotification>>;

pub struct JsonReviewCache {
    path: PathBuf,
    entries: DashMap<String, Vec<PendingNotification>>,
    // Held while snapshotting + writing so files land in mutation order
    persist_lock: Mutex<()>,
}

impl JsonReviewCache {
    /// Open the cache, loading whatever was flushed before.
    ///
    /// An unreadable file is logged, moved aside to `*.corrupt`, and the
    /// cache starts empty.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = DashMap::new();

        match Self::load(&path).await {
            Ok(snapshot) => {
                for (host, pending) in snapshot {
                    entries.insert(host, pending);
                }
            }
            Err(e) => {
                tracing::error!(path = %path.display(), "Starting with an empty review cache: {}", e);
                let aside = path.with_extension("corrupt");
                if let Err(e) = fs::rename(&path, &aside).await {
                    tracing::warn!("Failed to move corrupt review cache aside: {}", e);
                }
            }
        }

        let cache = Self {
            path,
            entries,
            persist_lock: Mutex::new(()),
        };
        tracing::info!(pending = cache.len(), "Review cache opened");
        cache
    }

    async fn load(path: &Path) -> Result<Snapshot, CacheError> {
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::new()),
            Err(e) => return Err(CacheError::Corruption(e.to_string())),
        };
        if text.trim().is_empty() {
            return Ok(Snapshot::new());
        }
        serde_json::from_str(&text).map_err(|e| CacheError::Corruption(e.to_string()))
    }

    fn snapshot(&self) -> Snapshot {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    async fn persist(&self) -> Result<(), CacheError> {
        let _guard = self.persist_lock.lock().await;
        let text = serde_json::to_string_pretty(&self.snapshot())?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationCache for JsonReviewCache {
    async fn enqueue(
        &self,
        host: &str,
        nick: &str,
        message: OutboundMessage,
    ) -> Result<(), CacheError> {
        self.entries
            .entry(host.to_string())
            .or_default()
            .push(PendingNotification {
                nick: nick.to_string(),
                message,
            });
        // Queued in memory either way; the next successful write or the
        // flush on close picks it up
        if let Err(e) = self.persist().await {
            tracing::warn!(host, "Failed to persist review cache after enqueue: {}", e);
        }
        Ok(())
    }

    async fn lookup_and_consume(&self, host: &str) -> Result<Vec<PendingNotification>, CacheError> {
        let Some((_, pending)) = self.entries.remove(host) else {
            return Ok(Vec::new());
        };
        // Already removed from memory; a failed write only delays durability
        if let Err(e) = self.persist().await {
            tracing::warn!(host, "Failed to persist review cache after delivery: {}", e);
        }
        Ok(pending)
    }

    async fn summarize(&self) -> ReviewSummary {
        let snapshot = self.snapshot();
        ReviewSummary::from_entries(snapshot.values().flatten())
    }

    fn len(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.persist().await
    }

    async fn reopen(&self) -> Result<(), CacheError> {
        let snapshot = Self::load(&self.path).await?;
        self.entries.clear();
        for (host, pending) in snapshot {
            self.entries.insert(host, pending);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        self.persist().await
    }

    fn discard(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_persistent_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_reviews.json");

        let msg1 = OutboundMessage::privmsg("nick", "Hello World");
        let msg2 = OutboundMessage::privmsg("nick", "Hello World");
        let msg3 = OutboundMessage::notice("#chan", "Hello World");
        let msg4 = OutboundMessage::privmsg("nick_", "Hello World");

        let cache = JsonReviewCache::open(&path).await;
        cache.enqueue("host.net", "op", msg1.clone()).await.unwrap();
        cache.enqueue("host.net", "op", msg2.clone()).await.unwrap();
        cache.enqueue("host.net", "op_", msg3.clone()).await.unwrap();
        cache.enqueue("home.net", "dude", msg4.clone()).await.unwrap();
        assert_eq!(cache.len(), 4);

        let before = cache.summarize().await;
        assert_eq!(before.to_string(), "Pending ban reviews (4): dude:1 op:2 op_:1");
        cache.flush().await.unwrap();
        drop(cache);

        let cache = JsonReviewCache::open(&path).await;
        assert_eq!(cache.summarize().await, before);

        let items = cache.lookup_and_consume("host.net").await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!((items[0].nick.as_str(), &items[0].message), ("op", &msg1));
        assert_eq!((items[1].nick.as_str(), &items[1].message), ("op", &msg2));
        assert_eq!((items[2].nick.as_str(), &items[2].message), ("op_", &msg3));

        let items = cache.lookup_and_consume("home.net").await.unwrap();
        assert_eq!(items[0].nick, "dude");
        assert_eq!(items[0].message, msg4);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_reopen_discards_unflushed_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_reviews.json");

        let cache = JsonReviewCache::open(&path).await;
        cache
            .enqueue("host.net", "op", OutboundMessage::privmsg("op", "a"))
            .await
            .unwrap();
        cache.flush().await.unwrap();

        // Simulate memory drifting from disk, then reload
        cache.entries.clear();
        assert!(cache.is_empty());
        cache.reopen().await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_discard_then_reopen_keeps_flushed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_reviews.json");

        let cache = JsonReviewCache::open(&path).await;
        cache
            .enqueue("host.net", "op", OutboundMessage::privmsg("op", "a"))
            .await
            .unwrap();
        cache.flush().await.unwrap();

        cache.discard();
        assert!(cache.is_empty());
        cache.reopen().await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.summarize().await.to_string(), "Pending ban reviews (1): op:1");
    }

    #[tokio::test]
    async fn test_enqueue_survives_unwritable_file() {
        let dir = tempfile::tempdir().unwrap();
        // Parent "directory" is a regular file, so every write fails
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let cache = JsonReviewCache::open(blocker.join("pending_reviews.json")).await;

        cache
            .enqueue("host.net", "op", OutboundMessage::privmsg("op", "a"))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.flush().await.is_err());

        // Still delivered exactly once
        assert_eq!(cache.lookup_and_consume("host.net").await.unwrap().len(), 1);
        assert!(cache.lookup_and_consume("host.net").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_consume_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonReviewCache::open(dir.path().join("c.json")).await;
        cache
            .enqueue("host.net", "op", OutboundMessage::privmsg("op", "a"))
            .await
            .unwrap();
        cache
            .enqueue("host.net", "op", OutboundMessage::privmsg("op", "b"))
            .await
            .unwrap();

        assert_eq!(cache.lookup_and_consume("host.net").await.unwrap().len(), 2);
        assert!(cache.lookup_and_consume("host.net").await.unwrap().is_empty());
        assert!(cache.lookup_and_consume("nowhere.net").await.unwrap().is_empty());

        // Delivery is remembered across a restart
        let reopened = JsonReviewCache::open(dir.path().join("c.json")).await;
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_and_consume_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(JsonReviewCache::open(dir.path().join("c.json")).await);

        let producer = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for i in 0..50 {
                    cache
                        .enqueue("host.net", "op", OutboundMessage::privmsg("op", format!("{}", i)))
                        .await
                        .unwrap();
                }
            })
        };

        let mut delivered = 0;
        for _ in 0..20 {
            delivered += cache.lookup_and_consume("host.net").await.unwrap().len();
            tokio::task::yield_now().await;
        }
        producer.await.unwrap();
        delivered += cache.lookup_and_consume("host.net").await.unwrap().len();

        assert_eq!(delivered, 50);
    }

    #[tokio::test]
    async fn test_clear_empties_disk_too() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let cache = JsonReviewCache::open(&path).await;
        cache
            .enqueue("host.net", "op", OutboundMessage::privmsg("op", "a"))
            .await
            .unwrap();
        cache.clear().await.unwrap();

        let reopened = JsonReviewCache::open(&path).await;
        assert!(reopened.is_empty());
        assert_eq!(reopened.summarize().await.to_string(), "No pending ban reviews.");
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cache = JsonReviewCache::open(&path).await;
        assert!(cache.is_empty());
        assert!(dir.path().join("c.corrupt").exists());

        // Still usable afterwards
        cache
            .enqueue("host.net", "op", OutboundMessage::privmsg("op", "a"))
            .await
            .unwrap();
        assert_eq!(JsonReviewCache::open(&path).await.len(), 1);
    }
}
