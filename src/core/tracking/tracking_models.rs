// Ban tracking domain models - records, comments, events and outbound messages.
//
// These are pure domain types with no transport dependencies.
// The relay layer converts raw inbound lines into these and renders
// the outbound messages back onto the wire.

use super::tracking_service::TrackingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker prepended to stored quiet masks so they stay distinct from bans
/// sharing the same raw mask text.
pub const QUIET_MARKER: char = '%';

/// What kind of moderation action a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Ban,
    Quiet,
    /// A kick, or a part forced by a named enforcer
    Removal,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Ban => "ban",
            RecordKind::Quiet => "quiet",
            RecordKind::Removal => "removal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ban" => Some(RecordKind::Ban),
            "quiet" => Some(RecordKind::Quiet),
            "removal" => Some(RecordKind::Removal),
            _ => None,
        }
    }

    /// Turn a raw mask into the form it is stored under.
    pub fn stored_mask(&self, raw: &str) -> String {
        match self {
            RecordKind::Quiet => format!("{}{}", QUIET_MARKER, raw),
            _ => raw.to_string(),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `nick!user@host` identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostmask {
    pub nick: String,
    pub user: String,
    pub host: String,
}

impl Hostmask {
    pub fn parse(raw: &str) -> Result<Self, TrackingError> {
        let (nick, rest) = raw
            .split_once('!')
            .ok_or_else(|| TrackingError::MalformedEvent(format!("hostmask without '!': {raw}")))?;
        let (user, host) = rest
            .split_once('@')
            .ok_or_else(|| TrackingError::MalformedEvent(format!("hostmask without '@': {raw}")))?;

        if nick.is_empty() || host.is_empty() {
            return Err(TrackingError::MalformedEvent(format!(
                "hostmask missing nick or host: {raw}"
            )));
        }

        Ok(Self {
            nick: nick.to_string(),
            user: user.to_string(),
            host: host.to_string(),
        })
    }
}

impl fmt::Display for Hostmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}@{}", self.nick, self.user, self.host)
    }
}

/// One stored ban/quiet/removal action.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationRecord {
    pub id: i64,
    pub channel: String,
    /// Mask as stored, quiets carry the `%` marker
    pub mask: String,
    pub kind: RecordKind,
    pub operator: String,
    /// Operator identity at the time of the action. Parts forced by an
    /// enforcer only name the enforcer, so there is no hostmask to keep.
    pub operator_hostmask: Option<String>,
    pub created_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
    pub removal_operator: Option<String>,
    pub log: Option<String>,
    pub review_requested: bool,
}

impl ModerationRecord {
    pub fn is_open(&self) -> bool {
        self.removed_at.is_none()
    }

    /// The mask as people typed it, without the quiet marker.
    pub fn display_mask(&self) -> &str {
        match self.kind {
            RecordKind::Quiet => self.mask.strip_prefix(QUIET_MARKER).unwrap_or(&self.mask),
            _ => &self.mask,
        }
    }

    /// `time.asctime()` style timestamp used in review messages.
    pub fn asctime(&self) -> String {
        self.created_at.format("%a %b %e %H:%M:%S %Y").to_string()
    }

    /// Host portion of the operator hostmask, the key deferred reviews are filed under.
    pub fn operator_host(&self) -> Option<String> {
        self.operator_hostmask
            .as_deref()
            .and_then(|mask| Hostmask::parse(mask).ok())
            .map(|mask| mask.host)
    }
}

/// Everything needed to insert a record; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub channel: String,
    /// Raw mask, the store applies the quiet marker
    pub mask: String,
    pub kind: RecordKind,
    pub operator: String,
    pub operator_hostmask: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A free-text annotation on a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub record_id: i64,
    pub author: String,
    pub text: String,
    pub time: DateTime<Utc>,
}

/// Raw moderation events as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationEvent {
    Ban {
        channel: String,
        mask: String,
        source: String,
        at: DateTime<Utc>,
    },
    Unban {
        channel: String,
        mask: String,
        source: String,
        at: DateTime<Utc>,
    },
    Quiet {
        channel: String,
        mask: String,
        source: String,
        at: DateTime<Utc>,
    },
    Unquiet {
        channel: String,
        mask: String,
        source: String,
        at: DateTime<Utc>,
    },
    Kick {
        channel: String,
        target: String,
        source: String,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    Part {
        channel: String,
        /// Hostmask of the departing user
        source: String,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
}

impl ModerationEvent {
    pub fn channel(&self) -> &str {
        match self {
            ModerationEvent::Ban { channel, .. }
            | ModerationEvent::Unban { channel, .. }
            | ModerationEvent::Quiet { channel, .. }
            | ModerationEvent::Unquiet { channel, .. }
            | ModerationEvent::Kick { channel, .. }
            | ModerationEvent::Part { channel, .. } => channel,
        }
    }
}

/// Somebody with a known hostmask said something, somewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentitySighting {
    pub hostmask: String,
    /// `None` for private messages
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Privmsg,
    Notice,
}

/// A fully composed message for the transport to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub kind: MessageKind,
    pub target: String,
    pub text: String,
}

impl OutboundMessage {
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Privmsg,
            target: target.into(),
            text: text.into(),
        }
    }

    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Notice,
            target: target.into(),
            text: text.into(),
        }
    }

    /// Same payload, addressed to someone else.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

impl fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let command = match self.kind {
            MessageKind::Privmsg => "PRIVMSG",
            MessageKind::Notice => "NOTICE",
        };
        write!(f, "{} {} :{}", command, self.target, self.text)
    }
}

/// What happened to one inbound moderation event.
#[derive(Debug)]
pub enum EventOutcome {
    /// A new record was stored; `messages` holds any comment request.
    Recorded {
        record: ModerationRecord,
        messages: Vec<OutboundMessage>,
    },
    Closed {
        record_id: i64,
    },
    /// Channel not tracked, or an event shape we don't care about
    Ignored,
    /// Malformed event or impossible transition, already logged
    Discarded(TrackingError),
}

impl EventOutcome {
    pub fn into_messages(self) -> Vec<OutboundMessage> {
        match self {
            EventOutcome::Recorded { messages, .. } => messages,
            _ => Vec::new(),
        }
    }
}

/// Reply to a comment attach request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentOutcome {
    Added(i64),
    NoSuchRecord(i64),
}

impl fmt::Display for CommentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentOutcome::Added(id) => write!(f, "Comment added to record {}.", id),
            CommentOutcome::NoSuchRecord(id) => write!(f, "No such record: {}.", id),
        }
    }
}
