// Review scheduler - periodic sweep over stale open records, plus delivery of
// whatever the sweep deferred once the operator's host shows up again.

use super::review_cache::NotificationCache;
use crate::core::tracking::glob;
use crate::core::tracking::{
    ChannelConfig, Hostmask, IdentitySighting, ModerationRecord, OutboundMessage, RecordStore,
    TrackerConfig, TrackingError,
};
use chrono::{DateTime, Utc};

/// What one sweep did.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Direct review requests deferred into the cache
    pub queued: usize,
    /// Forwarded review requests, to be sent right away
    pub forwarded: Vec<OutboundMessage>,
    /// Channels or records that could not be handled this time
    pub failed: usize,
}

/// Records created before this instant are due for review.
///
/// `None` when reviews are off or the interval reaches past the earliest
/// representable time, in which case nothing is stale yet.
pub fn cutoff(config: &TrackerConfig, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    config
        .review_interval()
        .and_then(|interval| now.checked_sub_signed(interval))
}

/// Review request addressed to the operator; retargeted on delivery.
pub fn direct_review_message(config: &TrackerConfig, record: &ModerationRecord) -> OutboundMessage {
    OutboundMessage::privmsg(
        record.operator.clone(),
        format!(
            "Hi, please review the {} '{}' that you set on {} in {}, link: {}",
            record.kind,
            record.display_mask(),
            record.asctime(),
            record.channel,
            config.record_link(record.id)
        ),
    )
}

/// Review request sent to the channel's review forward destinations.
pub fn forwarded_review_messages(
    config: &TrackerConfig,
    channel: &ChannelConfig,
    record: &ModerationRecord,
) -> Vec<OutboundMessage> {
    let text = format!(
        "Hi, please somebody review the {} '{}' set by {} on {} in {}, link: {}",
        record.kind,
        record.display_mask(),
        record.operator,
        record.asctime(),
        record.channel,
        config.record_link(record.id)
    );
    channel
        .review
        .forward_channels
        .iter()
        .map(|dest| OutboundMessage::notice(dest.clone(), text.clone()))
        .collect()
}

/// Find stale open records without a review request and issue one each.
///
/// Every handled record is marked review-requested, whichever way the request
/// went, so running the sweep again right away finds nothing new. A failure on
/// one channel or record is logged and counted; the rest of the sweep goes on
/// and the report keeps everything already produced.
pub async fn sweep<S: RecordStore, C: NotificationCache>(
    store: &S,
    cache: &C,
    config: &TrackerConfig,
    now: DateTime<Utc>,
) -> Result<SweepReport, TrackingError> {
    let mut report = SweepReport::default();

    let Some(older_than) = cutoff(config, now) else {
        return Ok(report);
    };

    for channel_name in store.open_channels().await? {
        let channel = config.channel(&channel_name);
        if !channel.enabled || !channel.review.enabled {
            continue;
        }

        let stale = match store
            .list_stale_open_records(&channel_name, older_than, &channel.review.ignore)
            .await
        {
            Ok(stale) => stale,
            Err(e) => {
                tracing::error!(channel = %channel_name, "Failed to list stale records: {}", e);
                report.failed += 1;
                continue;
            }
        };

        for record in stale {
            if let Err(e) = request_review(store, cache, config, channel, &record, &mut report).await
            {
                tracing::error!(record_id = record.id, "Review request failed: {}", e);
                report.failed += 1;
            }
        }
    }

    if report.queued > 0 || !report.forwarded.is_empty() || report.failed > 0 {
        tracing::info!(
            queued = report.queued,
            forwarded = report.forwarded.len(),
            failed = report.failed,
            "Review sweep issued requests"
        );
    }

    Ok(report)
}

/// Mark one record and issue its review request.
///
/// The marker is written first: a request is issued at most once per record,
/// even when queueing it fails afterwards.
async fn request_review<S: RecordStore, C: NotificationCache>(
    store: &S,
    cache: &C,
    config: &TrackerConfig,
    channel: &ChannelConfig,
    record: &ModerationRecord,
    report: &mut SweepReport,
) -> Result<(), TrackingError> {
    store.mark_review_requested(record.id).await?;

    if glob::matches_any(&channel.review.forward, &record.operator) {
        report
            .forwarded
            .extend(forwarded_review_messages(config, channel, record));
    } else if let Some(host) = record.operator_host() {
        cache
            .enqueue(&host, &record.operator, direct_review_message(config, record))
            .await?;
        report.queued += 1;
    } else {
        tracing::warn!(
            record_id = record.id,
            operator = %record.operator,
            "No operator host on record, cannot queue review"
        );
    }
    Ok(())
}

/// Hand over everything queued for the sighting's host, addressed to the
/// nick it is using now.
pub async fn deliver<C: NotificationCache>(
    cache: &C,
    sighting: &IdentitySighting,
) -> Result<Vec<OutboundMessage>, TrackingError> {
    let identity = Hostmask::parse(&sighting.hostmask)?;

    let pending = cache.lookup_and_consume(&identity.host).await?;
    if !pending.is_empty() {
        tracing::info!(
            host = %identity.host,
            nick = %identity.nick,
            count = pending.len(),
            "Delivering deferred reviews"
        );
    }

    Ok(pending
        .into_iter()
        .map(|entry| entry.message.with_target(identity.nick.clone()))
        .collect())
}
