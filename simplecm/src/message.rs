//! Structured messages: a header part followed by body parts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TpError;
use crate::handle::Handle;

pub const MESSAGE_RECEIVED: &str = "message-received";
pub const MESSAGE_SENDER: &str = "message-sender";
pub const MESSAGE_SENDER_ID: &str = "message-sender-id";
pub const MESSAGE_TYPE: &str = "message-type";
pub const CONTENT_TYPE: &str = "content-type";
pub const CONTENT: &str = "content";
pub const TEXT_PLAIN: &str = "text/plain";

/// One part of a message: free-form keys to JSON values.
pub type MessagePart = BTreeMap<String, Value>;

/// Telepathy text message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum MessageType {
    Normal = 0,
    Action = 1,
    Notice = 2,
    AutoReply = 3,
    DeliveryReport = 4,
}

/// A full message. Part 0 is always the header.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageParts(pub Vec<MessagePart>);

impl MessageParts {
    /// An inbound plain-text message from `sender`.
    pub fn incoming_text(sender: Handle, sender_id: &str, text: &str, received: i64) -> Self {
        let mut header = MessagePart::new();
        header.insert(MESSAGE_RECEIVED.into(), Value::from(received));
        header.insert(MESSAGE_SENDER.into(), Value::from(sender));
        header.insert(MESSAGE_SENDER_ID.into(), Value::from(sender_id));
        header.insert(MESSAGE_TYPE.into(), Value::from(MessageType::Normal as u32));
        Self(vec![header, text_part(text)])
    }

    /// An outbound plain-text message as a client would submit it.
    pub fn outgoing_text(text: &str) -> Self {
        let mut header = MessagePart::new();
        header.insert(MESSAGE_TYPE.into(), Value::from(MessageType::Normal as u32));
        Self(vec![header, text_part(text)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn header(&self) -> Option<&MessagePart> {
        self.0.first()
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.header()?.get(MESSAGE_SENDER_ID)?.as_str()
    }

    /// Content of the first `text/plain` body part.
    pub fn plain_text(&self) -> Option<&str> {
        self.0.iter().skip(1).find_map(|part| {
            let is_plain = part.get(CONTENT_TYPE).and_then(Value::as_str) == Some(TEXT_PLAIN);
            if is_plain {
                part.get(CONTENT).and_then(Value::as_str)
            } else {
                None
            }
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    /// Parse a JSON array of part objects.
    pub fn from_json(json: &str) -> Result<Self, TpError> {
        serde_json::from_str::<Vec<MessagePart>>(json)
            .map(Self)
            .map_err(|e| TpError::invalid_argument(format!("Malformed message JSON: {e}")))
    }
}

fn text_part(text: &str) -> MessagePart {
    let mut part = MessagePart::new();
    part.insert(CONTENT_TYPE.into(), Value::from(TEXT_PLAIN));
    part.insert(CONTENT.into(), Value::from(text));
    part
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_header_fields() {
        let msg = MessageParts::incoming_text(2, "alice", "hi", 1_700_000_000);
        let header = msg.header().unwrap();
        assert_eq!(header[MESSAGE_SENDER], 2);
        assert_eq!(header[MESSAGE_RECEIVED], 1_700_000_000i64);
        assert_eq!(header[MESSAGE_TYPE], 0);
        assert_eq!(msg.sender_id(), Some("alice"));
        assert_eq!(msg.plain_text(), Some("hi"));
    }

    #[test]
    fn plain_text_skips_header_and_other_types() {
        let mut html = MessagePart::new();
        html.insert(CONTENT_TYPE.into(), Value::from("text/html"));
        html.insert(CONTENT.into(), Value::from("<b>hey</b>"));

        // A header that itself looks like a text part must be ignored.
        let mut header = MessagePart::new();
        header.insert(CONTENT_TYPE.into(), Value::from(TEXT_PLAIN));
        header.insert(CONTENT.into(), Value::from("header"));

        let msg = MessageParts(vec![header, html, text_part("hey")]);
        assert_eq!(msg.plain_text(), Some("hey"));
    }

    #[test]
    fn plain_text_missing() {
        assert_eq!(MessageParts::default().plain_text(), None);
        let mut only_header = MessageParts::outgoing_text("x");
        only_header.0.truncate(1);
        assert_eq!(only_header.plain_text(), None);
    }

    #[test]
    fn json_codec() {
        let msg = MessageParts::incoming_text(3, "bob", "hello", 42);
        let parsed = MessageParts::from_json(&msg.to_json()).unwrap();
        assert_eq!(parsed, msg);

        let custom = MessageParts::from_json(
            r#"[{"message-type":0},{"content-type":"text/plain","content":"raw"}]"#,
        )
        .unwrap();
        assert_eq!(custom.plain_text(), Some("raw"));
    }

    #[test]
    fn json_rejects_non_array() {
        assert!(matches!(
            MessageParts::from_json(r#"{"content":"x"}"#),
            Err(TpError::InvalidArgument(_))
        ));
    }
}
