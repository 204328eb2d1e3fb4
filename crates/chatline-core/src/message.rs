//! Chat submissions and sequenced messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator between sender and body in a rendered line.
pub const LINE_SEPARATOR: &str = " : ";

/// An inbound `(sender, body)` pair, not yet sequenced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Display name chosen by the client.
    pub sender: String,
    /// Message text.
    pub body: String,
}

impl Submission {
    /// Build a submission from its parts.
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
        }
    }

    /// Parse a raw inbound frame.
    ///
    /// Accepts a JSON object `{"sender": .., "body": ..}` or the plain line
    /// form `"<sender> : <body>"`, split on the first separator. A frame that
    /// looks like JSON but does not decode is tried as a plain line. Returns
    /// `None` for anything else.
    pub fn parse(frame: &str) -> Option<Self> {
        let frame = frame.trim_end_matches(['\r', '\n']);
        if frame.trim_start().starts_with('{') {
            if let Ok(submission) = serde_json::from_str(frame) {
                return Some(submission);
            }
        }
        let (sender, body) = frame.split_once(LINE_SEPARATOR)?;
        Some(Self::new(sender, body))
    }

    /// Both sender and body must be non-empty to be dispatched.
    pub fn is_valid(&self) -> bool {
        !self.sender.is_empty() && !self.body.is_empty()
    }
}

/// A sequenced, immutable chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Display name of the author.
    pub sender: String,
    /// Message text.
    pub body: String,
    /// Position in the hub's total order (starts at 1).
    pub sequence: u64,
    /// When the hub accepted the message.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time.
    pub fn new(sender: impl Into<String>, body: impl Into<String>, sequence: u64) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            sequence,
            timestamp: Utc::now(),
        }
    }

    /// Render as a display line: `"<sender> : <body>"`.
    pub fn render(&self) -> String {
        format!("{}{LINE_SEPARATOR}{}", self.sender, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_line_format() {
        let msg = Message::new("alice", "hi", 1);
        assert_eq!(msg.render(), "alice : hi");
    }

    #[test]
    fn parse_plain_line() {
        let sub = Submission::parse("alice : hi").unwrap();
        assert_eq!(sub, Submission::new("alice", "hi"));
    }

    #[test]
    fn parse_splits_on_first_separator() {
        let sub = Submission::parse("bob : a : b").unwrap();
        assert_eq!(sub.sender, "bob");
        assert_eq!(sub.body, "a : b");
    }

    #[test]
    fn parse_strips_trailing_newline_only() {
        let sub = Submission::parse("carol :  spaced \r\n").unwrap();
        assert_eq!(sub.body, " spaced ");
    }

    #[test]
    fn parse_json_object() {
        let sub = Submission::parse(r#"{"sender":"dave","body":"hello"}"#).unwrap();
        assert_eq!(sub, Submission::new("dave", "hello"));
    }

    #[test]
    fn parse_malformed_json_is_none() {
        assert!(Submission::parse(r#"{"sender":"dave"}"#).is_none());
        assert!(Submission::parse("{not json").is_none());
    }

    #[test]
    fn parse_brace_sender_falls_back_to_line_form() {
        let sub = Submission::parse("{bob} : hi").unwrap();
        assert_eq!(sub, Submission::new("{bob}", "hi"));
        assert!(sub.is_valid());

        let sub = Submission::parse(r#"{"sender":"x"} : body"#).unwrap();
        assert_eq!(sub.sender, r#"{"sender":"x"}"#);
        assert_eq!(sub.body, "body");
    }

    #[test]
    fn parse_without_separator_is_none() {
        assert!(Submission::parse("just some text").is_none());
        assert!(Submission::parse("").is_none());
    }

    #[test]
    fn empty_fields_are_invalid() {
        assert!(!Submission::new("", "hi").is_valid());
        assert!(!Submission::new("alice", "").is_valid());
        assert!(Submission::new("alice", "hi").is_valid());
        assert!(!Submission::parse(" : hi").unwrap().is_valid());
    }

    #[test]
    fn message_serializes_all_fields() {
        let msg = Message::new("erin", "yo", 7);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["sender"], "erin");
        assert_eq!(json["body"], "yo");
        assert_eq!(json["sequence"], 7);
        assert!(json["timestamp"].is_string());
    }
}
