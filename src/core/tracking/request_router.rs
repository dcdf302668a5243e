// Comment request routing - who, if anyone, gets asked about a new record.

use super::glob;
use super::tracking_config::ChannelConfig;
use super::tracking_models::{ModerationRecord, OutboundMessage};

/// Where a comment request ends up.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestRoute {
    Skip,
    /// Ask the operator directly
    Direct,
    /// Ask the forward destinations on the operator's behalf
    Forward,
}

/// Decide the route for a freshly created record.
pub fn route(channel: &ChannelConfig, record: &ModerationRecord) -> RequestRoute {
    let request = &channel.request;

    if !request.enabled || !request.types.contains(&record.kind) {
        return RequestRoute::Skip;
    }
    if glob::matches_any(&request.ignore, &record.operator) {
        return RequestRoute::Skip;
    }
    if glob::matches_any(&request.forward, &record.operator) {
        return RequestRoute::Forward;
    }
    RequestRoute::Direct
}

/// Compose the comment request messages for a record, sent right away.
pub fn comment_request(
    channel: &ChannelConfig,
    record: &ModerationRecord,
    command_prefix: &str,
) -> Vec<OutboundMessage> {
    let usage = format!(
        "use: {}comment {} <comment>",
        command_prefix, record.id
    );

    match route(channel, record) {
        RequestRoute::Skip => Vec::new(),
        RequestRoute::Direct => vec![OutboundMessage::privmsg(
            record.operator.clone(),
            format!(
                "Please comment on the {} of {} in {}, {}",
                record.kind,
                record.display_mask(),
                record.channel,
                usage
            ),
        )],
        RequestRoute::Forward => {
            let text = format!(
                "Please somebody comment on the {} of {} in {} done by {}, {}",
                record.kind,
                record.display_mask(),
                record.channel,
                record.operator,
                usage
            );
            if channel.request.forward_channels.is_empty() {
                tracing::warn!(
                    record_id = record.id,
                    operator = %record.operator,
                    "Comment request forward has no destinations"
                );
            }
            channel
                .request
                .forward_channels
                .iter()
                .map(|dest| OutboundMessage::notice(dest.clone(), text.clone()))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tracking::tracking_models::RecordKind;
    use chrono::Utc;

    fn record(id: i64, kind: RecordKind, mask: &str, operator: &str) -> ModerationRecord {
        ModerationRecord {
            id,
            channel: "#test".into(),
            mask: kind.stored_mask(mask),
            kind,
            operator: operator.into(),
            operator_hostmask: Some(format!("{}!user@host.net", operator)),
            created_at: Utc::now(),
            removed_at: None,
            removal_operator: None,
            log: None,
            review_requested: false,
        }
    }

    fn requesting_channel() -> ChannelConfig {
        let mut channel = ChannelConfig::default();
        channel.enabled = true;
        channel.request.enabled = true;
        channel.request.ignore.clear();
        channel
    }

    #[test]
    fn test_direct_request_per_kind() {
        let channel = requesting_channel();

        let msgs = comment_request(&channel, &record(1, RecordKind::Ban, "asd!*@*", "op"), "@");
        assert_eq!(
            msgs[0].to_string(),
            "PRIVMSG op :Please comment on the ban of asd!*@* in #test, use: @comment 1 <comment>"
        );

        let msgs = comment_request(&channel, &record(2, RecordKind::Quiet, "dude!*@*", "op"), "@");
        assert_eq!(
            msgs[0].to_string(),
            "PRIVMSG op :Please comment on the quiet of dude!*@* in #test, use: @comment 2 <comment>"
        );

        let msgs = comment_request(&channel, &record(3, RecordKind::Removal, "dude", "op"), "@");
        assert_eq!(
            msgs[0].to_string(),
            "PRIVMSG op :Please comment on the removal of dude in #test, use: @comment 3 <comment>"
        );
    }

    #[test]
    fn test_forwarded_request() {
        let mut channel = requesting_channel();
        channel.request.forward = vec!["bot".into()];
        channel.request.forward_channels = vec!["#channel".into()];

        let msgs = comment_request(&channel, &record(2, RecordKind::Ban, "zxc!*@*", "bot"), "@");
        assert_eq!(msgs.len(), 1);
        assert_eq!(
            msgs[0].to_string(),
            "NOTICE #channel :Please somebody comment on the ban of zxc!*@* in #test done by bot, use: @comment 2 <comment>"
        );

        // Not forwarded nick still gets asked directly
        let msgs = comment_request(&channel, &record(1, RecordKind::Ban, "qwe!*@*", "op"), "@");
        assert_eq!(msgs[0].target, "op");
    }

    #[test]
    fn test_skips() {
        let mut channel = requesting_channel();
        channel.request.ignore = vec!["FloodBot?".into()];
        assert_eq!(
            route(&channel, &record(1, RecordKind::Ban, "a!*@*", "floodbot1")),
            RequestRoute::Skip
        );

        channel.request.types.remove(&RecordKind::Removal);
        assert_eq!(
            route(&channel, &record(1, RecordKind::Removal, "a", "op")),
            RequestRoute::Skip
        );

        channel.request.enabled = false;
        assert_eq!(
            route(&channel, &record(1, RecordKind::Ban, "a!*@*", "op")),
            RequestRoute::Skip
        );
    }

    #[test]
    fn test_ignore_wins_over_forward() {
        let mut channel = requesting_channel();
        channel.request.ignore = vec!["bot".into()];
        channel.request.forward = vec!["bot".into()];
        assert_eq!(
            route(&channel, &record(1, RecordKind::Ban, "a!*@*", "bot")),
            RequestRoute::Skip
        );
    }
}
