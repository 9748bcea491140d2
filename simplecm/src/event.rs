//! Notifications emitted by a connection.
//!
//! These replace framework signals: each state change queues one event on
//! the owning connection, in the order the mutations happened. Consumers
//! drain the queue after each call.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::channel::ChannelType;
use crate::chat::Chat;
use crate::connection::{ConnectionStatus, ContactListState, StatusReason};
use crate::handle::{Handle, HandleType};
use crate::message::MessageParts;
use crate::presence::{SimplePresence, SubscriptionChanges};

/// Events queued by a [`crate::connection::Connection`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ConnectionEvent {
    StatusChanged {
        status: ConnectionStatus,
        reason: StatusReason,
    },

    /// Presence changed for one or more contacts.
    PresencesChanged {
        presences: BTreeMap<Handle, SimplePresence>,
    },

    /// Subscription state changed for one or more contacts.
    ContactsChanged(SubscriptionChanges),

    ContactListStateChanged {
        state: ContactListState,
    },

    /// A channel was created, either by a client request or by an inbound message.
    NewChannel {
        object_path: String,
        channel_type: ChannelType,
        target_handle_type: HandleType,
        target_handle: Handle,
        target_id: String,
        initiator_handle: Handle,
        requested: bool,
    },

    ChannelClosed {
        object_path: String,
    },

    /// An inbound message was queued as pending on a channel.
    MessageReceived {
        object_path: String,
        pending_id: u32,
        message: MessageParts,
    },

    /// A client sent a message; the protocol side should deliver it to `chat`.
    MessageSent {
        chat: Chat,
        text: String,
        token: String,
    },
}

/// Versioned wrapper around a [`ConnectionEvent`] for serialization.
///
/// - `version`: schema version (always 1 for now).
/// - `seq`: monotonically increasing per service instance.
/// - `timestamp_ms`: UTC milliseconds when the envelope was created.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub version: u32,
    pub seq: u64,
    pub timestamp_ms: i64,
    pub event: ConnectionEvent,
}

impl EventEnvelope {
    pub fn new(seq: u64, event: ConnectionEvent) -> Self {
        Self {
            version: 1,
            seq,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serialization() {
        let event = ConnectionEvent::StatusChanged {
            status: ConnectionStatus::Connected,
            reason: StatusReason::Requested,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["data"]["status"], "connected");
        assert_eq!(json["data"]["reason"], "requested");
    }

    #[test]
    fn envelope_serialization() {
        let event = ConnectionEvent::MessageSent {
            chat: Chat::contact("alice"),
            text: "hello".to_string(),
            token: "01TOKEN".to_string(),
        };
        let envelope = EventEnvelope::new(7, event);
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["seq"], 7);
        assert!(json["timestamp_ms"].as_i64().unwrap() > 0);
        assert_eq!(json["event"]["type"], "message_sent");
        assert_eq!(json["event"]["data"]["chat"]["identifier"], "alice");
        assert_eq!(json["event"]["data"]["chat"]["kind"], "contact");
    }

    #[test]
    fn presence_map_keys_are_strings_on_the_wire() {
        let mut presences = BTreeMap::new();
        presences.insert(2, SimplePresence::default());
        let json = serde_json::to_value(ConnectionEvent::PresencesChanged { presences }).unwrap();
        assert_eq!(json["data"]["presences"]["2"]["presence_type"], "unset");
    }
}
