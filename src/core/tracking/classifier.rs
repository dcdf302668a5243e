// Event classifier - turns raw moderation events into store operations.

use super::tracking_models::{Hostmask, ModerationEvent, NewRecord, RecordKind};
use super::tracking_service::TrackingError;
use chrono::{DateTime, Utc};

/// Part reasons that name an enforcer start with this.
const ENFORCED_PART_PREFIX: &str = "requested by ";

/// What the store should do with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Create(NewRecord),
    /// Close the most recent open record with this stored mask
    Close {
        channel: String,
        mask: String,
        operator: String,
        at: DateTime<Utc>,
    },
    Ignore,
}

/// Classify one event. Fails only with `MalformedEvent`.
pub fn classify(event: ModerationEvent) -> Result<Classified, TrackingError> {
    match event {
        ModerationEvent::Ban {
            channel,
            mask,
            source,
            at,
        } => create(channel, mask, RecordKind::Ban, &source, at),
        ModerationEvent::Quiet {
            channel,
            mask,
            source,
            at,
        } => create(channel, mask, RecordKind::Quiet, &source, at),
        ModerationEvent::Kick {
            channel,
            target,
            source,
            at,
            ..
        } => {
            if target.trim().is_empty() {
                return Err(TrackingError::MalformedEvent(
                    "kick without a target nick".to_string(),
                ));
            }
            create(channel, target, RecordKind::Removal, &source, at)
        }
        ModerationEvent::Part {
            channel,
            source,
            reason,
            at,
        } => {
            let Some(enforcer) = reason.as_deref().and_then(enforcer_from_reason) else {
                return Ok(Classified::Ignore);
            };
            let departing = Hostmask::parse(&source)?;
            require_channel(&channel)?;
            Ok(Classified::Create(NewRecord {
                channel,
                mask: departing.nick,
                kind: RecordKind::Removal,
                operator: enforcer,
                operator_hostmask: None,
                created_at: at,
            }))
        }
        ModerationEvent::Unban {
            channel,
            mask,
            source,
            at,
        } => close(channel, RecordKind::Ban.stored_mask(&mask), &source, at),
        ModerationEvent::Unquiet {
            channel,
            mask,
            source,
            at,
        } => close(channel, RecordKind::Quiet.stored_mask(&mask), &source, at),
    }
}

/// Pull the enforcer nick out of `requested by <nick> (reason)`.
pub fn enforcer_from_reason(reason: &str) -> Option<String> {
    let rest = reason.trim_start().strip_prefix(ENFORCED_PART_PREFIX)?;
    let nick = rest.split_whitespace().next()?;
    let nick = nick.trim_end_matches(&[':', ','][..]);
    if nick.is_empty() {
        None
    } else {
        Some(nick.to_string())
    }
}

fn require_channel(channel: &str) -> Result<(), TrackingError> {
    if channel.trim().is_empty() {
        return Err(TrackingError::MalformedEvent(
            "event without a channel".to_string(),
        ));
    }
    Ok(())
}

fn create(
    channel: String,
    mask: String,
    kind: RecordKind,
    source: &str,
    at: DateTime<Utc>,
) -> Result<Classified, TrackingError> {
    require_channel(&channel)?;
    if mask.trim().is_empty() {
        return Err(TrackingError::MalformedEvent(format!("{kind} without a mask")));
    }
    let operator = Hostmask::parse(source)?;

    Ok(Classified::Create(NewRecord {
        channel,
        mask,
        kind,
        operator: operator.nick.clone(),
        operator_hostmask: Some(operator.to_string()),
        created_at: at,
    }))
}

fn close(
    channel: String,
    mask: String,
    source: &str,
    at: DateTime<Utc>,
) -> Result<Classified, TrackingError> {
    require_channel(&channel)?;
    let operator = Hostmask::parse(source)?;
    Ok(Classified::Close {
        channel,
        mask,
        operator: operator.nick,
        at,
    })
}
