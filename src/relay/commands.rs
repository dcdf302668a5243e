// User-facing commands: `comment <id> <text>` and `banreview`.

use crate::core::reviews::NotificationCache;
use crate::core::tracking::{BanTrackerService, RecordStore, TrackingError};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Comment { record_id: i64, text: String },
    BanReview,
    /// Recognised command used the wrong way; holds the usage line
    Usage(String),
}

/// Parse a message as a command.
///
/// In channels the prefix is required; in private messages it is optional.
pub fn parse(prefix: &str, text: &str, private: bool) -> Option<Command> {
    let text = text.trim();
    let body = match text.strip_prefix(prefix) {
        Some(body) if !prefix.is_empty() => body,
        _ if private || prefix.is_empty() => text,
        _ => return None,
    };

    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (body, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "comment" => {
            let usage = || Command::Usage(format!("Usage: {}comment <id> <comment>", prefix));
            let Some((id, comment)) = args.split_once(char::is_whitespace) else {
                return Some(usage());
            };
            let comment = comment.trim();
            match id.parse::<i64>() {
                Ok(record_id) if !comment.is_empty() => Some(Command::Comment {
                    record_id,
                    text: comment.to_string(),
                }),
                _ => Some(usage()),
            }
        }
        "banreview" => Some(Command::BanReview),
        _ => None,
    }
}

/// Run a command and produce the reply text.
pub async fn execute<S: RecordStore, C: NotificationCache>(
    tracker: &BanTrackerService<S, C>,
    command: Command,
    author: &str,
    at: DateTime<Utc>,
) -> Result<String, TrackingError> {
    match command {
        Command::Comment { record_id, text } => {
            let outcome = tracker.attach_comment(record_id, author, &text, at).await?;
            Ok(outcome.to_string())
        }
        Command::BanReview => Ok(tracker.pending_review_summary().await.to_string()),
        Command::Usage(usage) => Ok(usage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comment() {
        assert_eq!(
            parse("@", "@comment 12 flooding the channel", false),
            Some(Command::Comment {
                record_id: 12,
                text: "flooding the channel".into()
            })
        );
    }

    #[test]
    fn test_parse_comment_usage() {
        let usage = Some(Command::Usage("Usage: @comment <id> <comment>".into()));
        assert_eq!(parse("@", "@comment", false), usage);
        assert_eq!(parse("@", "@comment 12", false), usage);
        assert_eq!(parse("@", "@comment twelve text", false), usage);
    }

    #[test]
    fn test_parse_banreview() {
        assert_eq!(parse("@", "@banreview", false), Some(Command::BanReview));
        assert_eq!(parse("@", "@BanReview", false), Some(Command::BanReview));
    }

    #[test]
    fn test_prefix_required_in_channels_only() {
        assert_eq!(parse("@", "banreview", false), None);
        assert_eq!(parse("@", "banreview", true), Some(Command::BanReview));
        assert_eq!(parse("@", "Hi!", false), None);
        assert_eq!(parse("@", "Hi!", true), None);
        assert_eq!(parse("@", "@unknown thing", false), None);
    }
}
