// Inbound side of the relay: JSON lines in, outbound messages back.
//
// Each line is one transport event, tagged by "type":
//   {"type":"ban","channel":"#chan","mask":"nick!*@*","source":"op!user@host"}
//   {"type":"message","source":"op!user@host","channel":"#chan","text":"@banreview"}

use super::commands;
use crate::core::reviews::NotificationCache;
use crate::core::tracking::{
    BanTrackerService, Hostmask, IdentitySighting, ModerationEvent, OutboundMessage, RecordStore,
    TrackerConfig, TrackingError,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Ban {
        channel: String,
        mask: String,
        source: String,
        at: Option<DateTime<Utc>>,
    },
    Unban {
        channel: String,
        mask: String,
        source: String,
        at: Option<DateTime<Utc>>,
    },
    Quiet {
        channel: String,
        mask: String,
        source: String,
        at: Option<DateTime<Utc>>,
    },
    Unquiet {
        channel: String,
        mask: String,
        source: String,
        at: Option<DateTime<Utc>>,
    },
    Kick {
        channel: String,
        target: String,
        source: String,
        reason: Option<String>,
        at: Option<DateTime<Utc>>,
    },
    Part {
        channel: String,
        source: String,
        reason: Option<String>,
        at: Option<DateTime<Utc>>,
    },
    Message {
        source: String,
        text: String,
        channel: Option<String>,
        at: Option<DateTime<Utc>>,
    },
}

/// What an inbound event means to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Moderation(ModerationEvent),
    Message {
        sighting: IdentitySighting,
        text: String,
        at: DateTime<Utc>,
    },
}

impl InboundEvent {
    /// Resolve into a core event, stamping missing times with `now`.
    pub fn route(self, now: DateTime<Utc>) -> Routed {
        let stamp = |at: Option<DateTime<Utc>>| at.unwrap_or(now);
        match self {
            InboundEvent::Ban { channel, mask, source, at } => {
                Routed::Moderation(ModerationEvent::Ban { channel, mask, source, at: stamp(at) })
            }
            InboundEvent::Unban { channel, mask, source, at } => {
                Routed::Moderation(ModerationEvent::Unban { channel, mask, source, at: stamp(at) })
            }
            InboundEvent::Quiet { channel, mask, source, at } => {
                Routed::Moderation(ModerationEvent::Quiet { channel, mask, source, at: stamp(at) })
            }
            InboundEvent::Unquiet { channel, mask, source, at } => {
                Routed::Moderation(ModerationEvent::Unquiet { channel, mask, source, at: stamp(at) })
            }
            InboundEvent::Kick { channel, target, source, reason, at } => {
                Routed::Moderation(ModerationEvent::Kick {
                    channel,
                    target,
                    source,
                    reason,
                    at: stamp(at),
                })
            }
            InboundEvent::Part { channel, source, reason, at } => {
                Routed::Moderation(ModerationEvent::Part {
                    channel,
                    source,
                    reason,
                    at: stamp(at),
                })
            }
            InboundEvent::Message { source, text, channel, at } => Routed::Message {
                sighting: IdentitySighting {
                    hostmask: source,
                    channel,
                },
                text,
                at: stamp(at),
            },
        }
    }
}

/// Handle one inbound line and return everything that should be sent.
///
/// Never fails: bad lines and exhausted retries are logged.
pub async fn handle_line<S: RecordStore, C: NotificationCache>(
    tracker: &BanTrackerService<S, C>,
    config: &TrackerConfig,
    line: &str,
) -> Vec<OutboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let event: InboundEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Skipping undecodable input line: {}", e);
            return Vec::new();
        }
    };

    match event.route(Utc::now()) {
        Routed::Moderation(event) => {
            let result = with_retry("handle moderation event", || {
                tracker.handle_event(config, event.clone())
            })
            .await;
            match result {
                Ok(outcome) => outcome.into_messages(),
                Err(e) => {
                    tracing::error!(channel = %event.channel(), "Moderation event lost: {}", e);
                    Vec::new()
                }
            }
        }
        Routed::Message { sighting, text, at } => {
            let mut out = handle_command(tracker, config, &sighting, &text, at).await;

            match with_retry("deliver pending reviews", || tracker.deliver_pending(&sighting)).await {
                Ok(delivered) => out.extend(delivered),
                Err(e) => tracing::error!("Failed to deliver pending reviews: {}", e),
            }
            out
        }
    }
}

async fn handle_command<S: RecordStore, C: NotificationCache>(
    tracker: &BanTrackerService<S, C>,
    config: &TrackerConfig,
    sighting: &IdentitySighting,
    text: &str,
    at: DateTime<Utc>,
) -> Vec<OutboundMessage> {
    let private = sighting.channel.is_none();
    let Some(command) = commands::parse(&config.command_prefix, text, private) else {
        return Vec::new();
    };

    let author = match Hostmask::parse(&sighting.hostmask) {
        Ok(hostmask) => hostmask.nick,
        Err(e) => {
            tracing::warn!("Ignoring command from bad source: {}", e);
            return Vec::new();
        }
    };

    let reply = match with_retry("run command", || {
        commands::execute(tracker, command.clone(), &author, at)
    })
    .await
    {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(author = %author, "Command failed: {}", e);
            "Sorry, something went wrong. Try again later.".to_string()
        }
    };

    match &sighting.channel {
        Some(channel) => vec![OutboundMessage::privmsg(
            channel.as_str(),
            format!("{}: {}", author, reply),
        )],
        None => vec![OutboundMessage::privmsg(author, reply)],
    }
}

/// Retry storage failures with a linear backoff; other errors return at once.
async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, TrackingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TrackingError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, "Failed to {}, retrying: {}", what, e);
                tokio::time::sleep(RETRY_DELAY * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
