// Ban tracker service - core business logic for moderation records.
//
// This service handles:
// - Storing bans, quiets and removals as records
// - Closing records when the matching unban/unquiet arrives
// - Asking operators to comment on what they did
// - Periodic review requests, deferred until the operator shows up
//
// NO transport dependencies here - just pure domain logic.

use super::classifier::{self, Classified};
use super::request_router;
use super::tracking_config::TrackerConfig;
use super::tracking_models::{
    Comment, CommentOutcome, EventOutcome, IdentitySighting, ModerationEvent, ModerationRecord,
    NewRecord, OutboundMessage,
};
use crate::core::reviews::review_scheduler::{self, SweepReport};
use crate::core::reviews::{CacheError, NotificationCache, ReviewSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum TrackingError {
    /// Backing store unavailable; callers retry, never drop the event
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Closing a record that is already closed or doesn't exist
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl TrackingError {
    /// Worth retrying the same call later?
    pub fn is_transient(&self) -> bool {
        matches!(self, TrackingError::StorageError(_))
    }
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Trait for persisting moderation records and their comments.
///
/// Every write is durable before the call returns.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record and return it as stored, with its newly assigned id.
    async fn create_record(&self, record: NewRecord) -> Result<ModerationRecord, TrackingError>;

    async fn get_record(&self, record_id: i64) -> Result<Option<ModerationRecord>, TrackingError>;

    /// Most recently created open ban/quiet in the channel with exactly this
    /// stored mask.
    async fn find_open_record(
        &self,
        channel: &str,
        mask: &str,
    ) -> Result<Option<i64>, TrackingError>;

    /// Close an open record. `InvalidTransition` if it is missing or closed.
    async fn close_record(
        &self,
        record_id: i64,
        removal_operator: &str,
        removed_at: DateTime<Utc>,
    ) -> Result<(), TrackingError>;

    /// Append a comment. Closed records take comments too.
    async fn add_comment(&self, comment: Comment) -> Result<(), TrackingError>;

    /// Comments on a record, oldest first.
    async fn list_comments(&self, record_id: i64) -> Result<Vec<Comment>, TrackingError>;

    /// Channels that have at least one open record.
    async fn open_channels(&self) -> Result<Vec<String>, TrackingError>;

    /// Open bans/quiets in the channel created before `older_than` that have
    /// no review request yet, minus those whose operator matches `ignore`.
    async fn list_stale_open_records(
        &self,
        channel: &str,
        older_than: DateTime<Utc>,
        ignore: &[String],
    ) -> Result<Vec<ModerationRecord>, TrackingError>;

    async fn mark_review_requested(&self, record_id: i64) -> Result<(), TrackingError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Ban tracker tying the record store and the review cache together.
pub struct BanTrackerService<S: RecordStore, C: NotificationCache> {
    store: S,
    reviews: C,
    // Serializes record creation, closing and review marking so a sweep never
    // interleaves with a close of the same record.
    write_lock: Mutex<()>,
}

impl<S: RecordStore, C: NotificationCache> BanTrackerService<S, C> {
    pub fn new(store: S, reviews: C) -> Self {
        Self {
            store,
            reviews,
            write_lock: Mutex::new(()),
        }
    }

    /// Process one moderation event.
    ///
    /// Only storage failures come back as `Err`; malformed events and
    /// impossible transitions are logged and reported as `Discarded`.
    pub async fn handle_event(
        &self,
        config: &TrackerConfig,
        event: ModerationEvent,
    ) -> Result<EventOutcome, TrackingError> {
        if !config.channel(event.channel()).enabled {
            return Ok(EventOutcome::Ignored);
        }

        let classified = match classifier::classify(event) {
            Ok(classified) => classified,
            Err(e) => {
                tracing::warn!("Discarding moderation event: {}", e);
                return Ok(EventOutcome::Discarded(e));
            }
        };

        match classified {
            Classified::Ignore => Ok(EventOutcome::Ignored),
            Classified::Create(new_record) => {
                let record = {
                    let _guard = self.write_lock.lock().await;
                    self.store.create_record(new_record).await?
                };

                tracing::info!(
                    record_id = record.id,
                    channel = %record.channel,
                    kind = %record.kind,
                    mask = %record.display_mask(),
                    operator = %record.operator,
                    "Recorded moderation action"
                );

                let messages = self.create_comment_request(config, &record);
                Ok(EventOutcome::Recorded { record, messages })
            }
            Classified::Close {
                channel,
                mask,
                operator,
                at,
            } => {
                let _guard = self.write_lock.lock().await;
                let Some(record_id) = self.store.find_open_record(&channel, &mask).await? else {
                    let e = TrackingError::InvalidTransition(format!(
                        "no open record for {} in {}",
                        mask, channel
                    ));
                    tracing::warn!("{}", e);
                    return Ok(EventOutcome::Discarded(e));
                };

                match self.store.close_record(record_id, &operator, at).await {
                    Ok(()) => {
                        tracing::info!(record_id, channel = %channel, operator = %operator, "Closed record");
                        Ok(EventOutcome::Closed { record_id })
                    }
                    Err(e @ TrackingError::InvalidTransition(_)) => {
                        tracing::warn!(record_id, "{}", e);
                        Ok(EventOutcome::Discarded(e))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Comment request messages for a record; empty when nobody should be asked.
    pub fn create_comment_request(
        &self,
        config: &TrackerConfig,
        record: &ModerationRecord,
    ) -> Vec<OutboundMessage> {
        request_router::comment_request(
            config.channel(&record.channel),
            record,
            &config.command_prefix,
        )
    }

    /// Attach a comment to a record, answering "no such record" for unknown ids.
    pub async fn attach_comment(
        &self,
        record_id: i64,
        author: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<CommentOutcome, TrackingError> {
        if self.store.get_record(record_id).await?.is_none() {
            return Ok(CommentOutcome::NoSuchRecord(record_id));
        }

        self.store
            .add_comment(Comment {
                record_id,
                author: author.to_string(),
                text: text.to_string(),
                time: at,
            })
            .await?;

        tracing::debug!(record_id, author, "Comment added");
        Ok(CommentOutcome::Added(record_id))
    }

    /// Pending deferred reviews per nick.
    pub async fn pending_review_summary(&self) -> ReviewSummary {
        self.reviews.summarize().await
    }

    /// Issue review requests for stale records as of `now`.
    pub async fn run_review_sweep(
        &self,
        config: &TrackerConfig,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, TrackingError> {
        let _guard = self.write_lock.lock().await;
        review_scheduler::sweep(&self.store, &self.reviews, config, now).await
    }

    /// Deliver deferred reviews to whoever just spoke from a matching host.
    pub async fn deliver_pending(
        &self,
        sighting: &IdentitySighting,
    ) -> Result<Vec<OutboundMessage>, TrackingError> {
        review_scheduler::deliver(&self.reviews, sighting).await
    }

    pub async fn record(&self, record_id: i64) -> Result<Option<ModerationRecord>, TrackingError> {
        self.store.get_record(record_id).await
    }

    pub async fn comments(&self, record_id: i64) -> Result<Vec<Comment>, TrackingError> {
        self.store.list_comments(record_id).await
    }

    /// Flush the review cache; call on shutdown.
    pub async fn close(&self) -> Result<(), TrackingError> {
        self.reviews.flush().await?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
