// Deferred review notifications, keyed by the host part of a hostmask.
//
// Hosts survive nick changes, so a review queued for "op" at host.net reaches
// the same person later speaking as "op_" from host.net.

use crate::core::tracking::OutboundMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Durable state exists but can't be read back
    #[error("Review cache corrupted: {0}")]
    Corruption(String),
}

/// One queued message and the nick its target had when it was queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub nick: String,
    pub message: OutboundMessage,
}

/// Pending entries counted per enqueue-time nick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewSummary {
    pub counts: BTreeMap<String, usize>,
}

impl ReviewSummary {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a PendingNotification>) -> Self {
        let mut counts = BTreeMap::new();
        for entry in entries {
            *counts.entry(entry.nick.clone()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl fmt::Display for ReviewSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No pending ban reviews.");
        }
        let parts: Vec<String> = self
            .counts
            .iter()
            .map(|(nick, count)| format!("{}:{}", nick, count))
            .collect();
        write!(f, "Pending ban reviews ({}): {}", self.total(), parts.join(" "))
    }
}

/// Durable multi-map of host -> FIFO list of pending notifications.
#[async_trait]
pub trait NotificationCache: Send + Sync {
    /// Append to the host's list, creating it if needed. Once this returns
    /// `Ok` the entry is queued, even if writing it to disk has to wait for
    /// the next flush.
    async fn enqueue(
        &self,
        host: &str,
        nick: &str,
        message: OutboundMessage,
    ) -> Result<(), CacheError>;

    /// Remove and return everything queued for the host, in enqueue order.
    /// All or nothing: a second call sees an empty list.
    async fn lookup_and_consume(&self, host: &str) -> Result<Vec<PendingNotification>, CacheError>;

    async fn summarize(&self) -> ReviewSummary;

    /// Total entries across all hosts (not the number of hosts).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the current contents to durable storage.
    async fn flush(&self) -> Result<(), CacheError>;

    /// Drop the in-memory contents and reload whatever was last flushed.
    async fn reopen(&self) -> Result<(), CacheError>;

    /// Empty both memory and durable storage.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Empty memory only. Whatever was flushed comes back on `reopen`.
    fn discard(&self);
}
