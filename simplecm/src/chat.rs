//! Addressing a conversation from the protocol side.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    #[default]
    Invalid,
    Contact,
    Room,
}

/// A conversation: a one-to-one chat with a contact, or a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Chat {
    pub kind: ChatKind,
    pub identifier: String,
}

impl Chat {
    pub fn new(identifier: impl Into<String>, kind: ChatKind) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }

    pub fn contact(identifier: impl Into<String>) -> Self {
        Self::new(identifier, ChatKind::Contact)
    }

    pub fn room(identifier: impl Into<String>) -> Self {
        Self::new(identifier, ChatKind::Room)
    }

    pub fn is_valid(&self) -> bool {
        self.kind != ChatKind::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_needs_kind_and_identifier() {
        assert_eq!(Chat::contact("alice"), Chat::contact("alice"));
        assert_ne!(Chat::contact("alice"), Chat::room("alice"));
        assert!(!Chat::default().is_valid());
    }
}
