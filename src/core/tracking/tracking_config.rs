// Configuration snapshot consumed by the tracker.
//
// Loaded once at startup and handed to every core call by reference, so the
// core never reaches for process-wide settings.

use super::tracking_models::RecordKind;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

fn default_bot_ignores() -> Vec<String> {
    vec![
        "FloodBot?".to_string(),
        "FloodBotK?".to_string(),
        "ChanServ".to_string(),
    ]
}

fn default_request_types() -> BTreeSet<RecordKind> {
    [RecordKind::Ban, RecordKind::Quiet, RecordKind::Removal]
        .into_iter()
        .collect()
}

/// Comment request settings for a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub enabled: bool,
    /// Kinds of action that warrant asking for a comment
    pub types: BTreeSet<RecordKind>,
    /// Operator nick globs we never ask
    pub ignore: Vec<String>,
    /// Operator nick globs whose requests go to `forward_channels` instead
    pub forward: Vec<String>,
    pub forward_channels: Vec<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            types: default_request_types(),
            ignore: default_bot_ignores(),
            forward: Vec::new(),
            forward_channels: Vec::new(),
        }
    }
}

/// Review request settings for a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub enabled: bool,
    pub ignore: Vec<String>,
    pub forward: Vec<String>,
    pub forward_channels: Vec<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ignore: default_bot_ignores(),
            forward: Vec::new(),
            forward_channels: Vec::new(),
        }
    }
}

/// Timed ban removal settings. The removal itself is carried out by the
/// transport side, which owns channel modes; they are kept here so a single
/// config file describes a channel completely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoremoveConfig {
    pub enabled: bool,
    pub notify: bool,
    pub notify_channels: Vec<String>,
}

impl Default for AutoremoveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notify: true,
            notify_channels: Vec::new(),
        }
    }
}

/// Per-channel settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Track moderation actions in this channel at all
    pub enabled: bool,
    pub request: RequestConfig,
    pub review: ReviewConfig,
    pub autoremove: AutoremoveConfig,
}

/// Global settings plus the per-channel table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub database: String,
    pub review_cache: String,
    /// Web interface base URL, without the trailing `bans.cgi`
    pub bansite: String,
    pub command_prefix: String,
    /// Days before an open ban gets a review request. Zero disables reviews.
    pub review_interval_days: f64,
    /// Used for every channel without its own entry
    pub defaults: ChannelConfig,
    pub channels: HashMap<String, ChannelConfig>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            database: "data/bans.db".to_string(),
            review_cache: "data/pending_reviews.json".to_string(),
            bansite: String::new(),
            command_prefix: "@".to_string(),
            review_interval_days: 7.0,
            defaults: ChannelConfig::default(),
            channels: HashMap::new(),
        }
    }
}

impl TrackerConfig {
    /// Read the config file; a missing file means "all defaults".
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: TrackerConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if !config.review_interval_days.is_finite() || config.review_interval_days < 0.0 {
            anyhow::bail!(
                "review_interval_days must be a number >= 0, got {}",
                config.review_interval_days
            );
        }

        Ok(config)
    }

    /// Settings for a channel. Channel names compare case-insensitively.
    pub fn channel(&self, name: &str) -> &ChannelConfig {
        self.channels
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, config)| config)
            .unwrap_or(&self.defaults)
    }

    /// Review threshold, or `None` when reviews are globally off or the
    /// interval is too long to ever elapse.
    pub fn review_interval(&self) -> Option<chrono::Duration> {
        if self.review_interval_days.is_nan() || self.review_interval_days <= 0.0 {
            return None;
        }
        let millis = (self.review_interval_days * 86_400_000.0).round();
        if !millis.is_finite() || millis >= i64::MAX as f64 {
            return None;
        }
        chrono::Duration::try_milliseconds(millis as i64)
    }

    /// Log the effective settings of every configured channel.
    pub fn log_channels(&self) {
        let mut names: Vec<&String> = self.channels.keys().collect();
        names.sort();
        for name in names {
            let channel = &self.channels[name];
            tracing::info!(
                channel = %name,
                tracking = channel.enabled,
                requests = channel.request.enabled,
                reviews = channel.review.enabled,
                autoremove = channel.autoremove.enabled,
                autoremove_notify = channel.autoremove.notify,
                notify_channels = ?channel.autoremove.notify_channels,
                "Channel configured"
            );
        }
    }

    /// Link to the web log of a record.
    pub fn record_link(&self, record_id: i64) -> String {
        format!("{}/bans.cgi?log={}", self.bansite, record_id)
    }
}
