//! Text channels and the per-connection channel table.
//!
//! A channel is bound to one target contact. The connection owns a
//! [`ChannelManager`] holding at most one live text channel per target;
//! request validation and the ensure/create policy live in
//! `connection::requests`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::TpError;
use crate::handle::{Handle, HandleType};
use crate::message::{MessageParts, MessageType, TEXT_PLAIN};
use crate::token;

pub const CHANNEL_INTERFACE: &str = "org.freedesktop.Telepathy.Channel";
pub const TEXT_CHANNEL_INTERFACE: &str = "org.freedesktop.Telepathy.Channel.Type.Text";

/// Channel types this manager can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Text,
}

impl ChannelType {
    pub fn interface_name(self) -> &'static str {
        match self {
            Self::Text => TEXT_CHANNEL_INTERFACE,
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.interface_name())
    }
}

impl FromStr for ChannelType {
    type Err = TpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            TEXT_CHANNEL_INTERFACE => Ok(Self::Text),
            other => Err(TpError::not_implemented(format!(
                "Unsupported channel type {other}"
            ))),
        }
    }
}

/// A channel request, as a client would submit it.
///
/// Exactly one of `target_handle` / `target_id` is normally set; when both
/// are present the handle wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub channel_type: String,
    pub target_handle_type: HandleType,
    pub target_handle: Option<Handle>,
    pub target_id: Option<String>,
    pub initiator_handle: Option<Handle>,
}

impl ChannelRequest {
    pub fn text_to_handle(target_handle: Handle) -> Self {
        Self {
            channel_type: TEXT_CHANNEL_INTERFACE.to_string(),
            target_handle_type: HandleType::Contact,
            target_handle: Some(target_handle),
            target_id: None,
            initiator_handle: None,
        }
    }

    pub fn text_to_id(target_id: &str) -> Self {
        Self {
            channel_type: TEXT_CHANNEL_INTERFACE.to_string(),
            target_handle_type: HandleType::Contact,
            target_handle: None,
            target_id: Some(target_id.to_string()),
            initiator_handle: None,
        }
    }

    pub fn with_initiator(mut self, initiator: Handle) -> Self {
        self.initiator_handle = Some(initiator);
        self
    }
}

/// A requestable channel class: fixed properties plus the ones a request may add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestableChannelClass {
    pub fixed_properties: BTreeMap<String, String>,
    pub allowed_properties: Vec<String>,
}

/// The one class this protocol supports: one-to-one text chats.
pub fn text_chat_class() -> RequestableChannelClass {
    let mut fixed_properties = BTreeMap::new();
    fixed_properties.insert(
        format!("{CHANNEL_INTERFACE}.ChannelType"),
        TEXT_CHANNEL_INTERFACE.to_string(),
    );
    fixed_properties.insert(
        format!("{CHANNEL_INTERFACE}.TargetHandleType"),
        (HandleType::Contact as u32).to_string(),
    );
    RequestableChannelClass {
        fixed_properties,
        allowed_properties: vec![
            format!("{CHANNEL_INTERFACE}.TargetHandle"),
            format!("{CHANNEL_INTERFACE}.TargetID"),
        ],
    }
}

/// An inbound message waiting for the client to acknowledge it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingMessage {
    pub id: u32,
    pub message: MessageParts,
}

/// What a channel hands back to the connection when a client sends text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub target_id: String,
    pub text: String,
    pub token: String,
}

/// A one-to-one text channel.
#[derive(Debug)]
pub struct TextChannel {
    object_path: String,
    target_handle: Handle,
    target_id: String,
    initiator_handle: Handle,
    requested: bool,
    pending: Vec<PendingMessage>,
    next_pending_id: u32,
}

impl TextChannel {
    pub(crate) fn new(
        object_path: String,
        target_handle: Handle,
        target_id: String,
        initiator_handle: Handle,
        requested: bool,
    ) -> Self {
        Self {
            object_path,
            target_handle,
            target_id,
            initiator_handle,
            requested,
            pending: Vec::new(),
            next_pending_id: 1,
        }
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    pub fn channel_type(&self) -> ChannelType {
        ChannelType::Text
    }

    pub fn target_handle_type(&self) -> HandleType {
        HandleType::Contact
    }

    pub fn target_handle(&self) -> Handle {
        self.target_handle
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn initiator_handle(&self) -> Handle {
        self.initiator_handle
    }

    /// Whether a local client asked for this channel (vs. an inbound message).
    pub fn requested(&self) -> bool {
        self.requested
    }

    pub fn supported_content_types(&self) -> &'static [&'static str] {
        &[TEXT_PLAIN]
    }

    pub fn message_types(&self) -> &'static [MessageType] {
        &[MessageType::Normal]
    }

    pub fn pending_messages(&self) -> &[PendingMessage] {
        &self.pending
    }

    /// Queue a fully-formed message. Returns its pending id.
    pub(crate) fn add_received_message(&mut self, message: MessageParts) -> u32 {
        let id = self.next_pending_id;
        self.next_pending_id += 1;
        self.pending.push(PendingMessage { id, message });
        id
    }

    /// Queue plain text from the target contact, stamped with `received` (unix secs).
    pub(crate) fn add_incoming_message(&mut self, text: &str, received: i64) -> (u32, MessageParts) {
        let message =
            MessageParts::incoming_text(self.target_handle, &self.target_id, text, received);
        let id = self.add_received_message(message.clone());
        (id, message)
    }

    /// Remove the given pending messages. Nothing is removed if any id is unknown.
    pub(crate) fn acknowledge_pending(&mut self, ids: &[u32]) -> Result<(), TpError> {
        if let Some(missing) = ids.iter().find(|id| !self.pending.iter().any(|m| m.id == **id)) {
            return Err(TpError::invalid_argument(format!(
                "Unknown pending message id {missing}"
            )));
        }
        self.pending.retain(|m| !ids.contains(&m.id));
        Ok(())
    }

    /// Extract the text a client is sending to the target.
    pub(crate) fn send_message(
        &self,
        message: &MessageParts,
        flags: u32,
    ) -> Result<OutboundMessage, TpError> {
        let text = message
            .plain_text()
            .ok_or_else(|| TpError::invalid_argument("Message has no text/plain content"))?;
        tracing::debug!(
            channel = %self.object_path,
            target = %self.target_id,
            flags,
            "Outgoing message"
        );
        Ok(OutboundMessage {
            target_id: self.target_id.clone(),
            text: text.to_string(),
            token: token::message_token(),
        })
    }
}

/// Result of an ensure request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredChannel {
    pub object_path: String,
    /// True when this call created the channel.
    pub yours: bool,
}

/// Live channels of one connection, at most one per target.
#[derive(Debug)]
pub struct ChannelManager {
    base_path: String,
    channels: BTreeMap<String, TextChannel>,
    by_target: HashMap<(HandleType, Handle), String>,
    next_id: u64,
}

impl ChannelManager {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            channels: BTreeMap::new(),
            by_target: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn find(&self, handle_type: HandleType, handle: Handle) -> Option<&TextChannel> {
        let path = self.by_target.get(&(handle_type, handle))?;
        self.channels.get(path)
    }

    pub fn get(&self, object_path: &str) -> Option<&TextChannel> {
        self.channels.get(object_path)
    }

    pub(crate) fn get_mut(&mut self, object_path: &str) -> Option<&mut TextChannel> {
        self.channels.get_mut(object_path)
    }

    /// Build and register a channel. The caller has already checked that
    /// no channel exists for the target.
    pub(crate) fn insert(
        &mut self,
        target_handle: Handle,
        target_id: String,
        initiator_handle: Handle,
        requested: bool,
    ) -> &TextChannel {
        let object_path = format!("{}/TextChannel{}", self.base_path, self.next_id);
        self.next_id += 1;
        self.by_target
            .insert((HandleType::Contact, target_handle), object_path.clone());
        self.channels
            .entry(object_path.clone())
            .or_insert_with(|| {
                TextChannel::new(object_path, target_handle, target_id, initiator_handle, requested)
            })
    }

    pub(crate) fn remove(&mut self, object_path: &str) -> Option<TextChannel> {
        let channel = self.channels.remove(object_path)?;
        self.by_target
            .remove(&(channel.target_handle_type(), channel.target_handle()));
        Some(channel)
    }

    /// Drop every channel, returning their object paths.
    pub(crate) fn clear(&mut self) -> Vec<String> {
        self.by_target.clear();
        std::mem::take(&mut self.channels).into_keys().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextChannel> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> TextChannel {
        TextChannel::new("/c/TextChannel0".into(), 2, "alice".into(), 1, true)
    }

    #[test]
    fn channel_type_parsing() {
        assert_eq!(TEXT_CHANNEL_INTERFACE.parse::<ChannelType>().unwrap(), ChannelType::Text);
        let err = "org.freedesktop.Telepathy.Channel.Type.StreamedMedia"
            .parse::<ChannelType>()
            .unwrap_err();
        assert!(matches!(err, TpError::NotImplemented(_)));
    }

    #[test]
    fn incoming_messages_get_increasing_ids() {
        let mut ch = channel();
        let (first, msg) = ch.add_incoming_message("hi", 100);
        let (second, _) = ch.add_incoming_message("there", 101);
        assert_eq!((first, second), (1, 2));
        assert_eq!(msg.sender_id(), Some("alice"));
        assert_eq!(ch.pending_messages().len(), 2);
        assert_eq!(ch.pending_messages()[0].message.plain_text(), Some("hi"));
    }

    #[test]
    fn acknowledge_is_all_or_nothing() {
        let mut ch = channel();
        ch.add_incoming_message("a", 1);
        ch.add_incoming_message("b", 2);

        assert!(ch.acknowledge_pending(&[1, 99]).is_err());
        assert_eq!(ch.pending_messages().len(), 2);

        ch.acknowledge_pending(&[1]).unwrap();
        assert_eq!(ch.pending_messages().len(), 1);
        assert_eq!(ch.pending_messages()[0].id, 2);
    }

    #[test]
    fn send_extracts_plain_text() {
        let ch = channel();
        let out = ch.send_message(&MessageParts::outgoing_text("yo"), 0).unwrap();
        assert_eq!(out.target_id, "alice");
        assert_eq!(out.text, "yo");
        assert_eq!(out.token.len(), 26);
    }

    #[test]
    fn send_without_text_fails() {
        let ch = channel();
        let err = ch.send_message(&MessageParts::default(), 0).unwrap_err();
        assert!(matches!(err, TpError::InvalidArgument(_)));
    }

    #[test]
    fn manager_indexes_by_target() {
        let mut mgr = ChannelManager::new("/conn");
        let path = mgr.insert(2, "alice".into(), 1, true).object_path().to_string();
        assert_eq!(path, "/conn/TextChannel0");
        assert_eq!(mgr.find(HandleType::Contact, 2).unwrap().object_path(), path);
        assert!(mgr.find(HandleType::Contact, 3).is_none());

        mgr.remove(&path).unwrap();
        assert!(mgr.find(HandleType::Contact, 2).is_none());

        // Paths are not reused after a close.
        let again = mgr.insert(2, "alice".into(), 1, false).object_path().to_string();
        assert_eq!(again, "/conn/TextChannel1");
    }

    #[test]
    fn requestable_class_shape() {
        let class = text_chat_class();
        assert_eq!(
            class.fixed_properties["org.freedesktop.Telepathy.Channel.ChannelType"],
            TEXT_CHANNEL_INTERFACE
        );
        assert_eq!(
            class.fixed_properties["org.freedesktop.Telepathy.Channel.TargetHandleType"],
            "1"
        );
        assert_eq!(class.allowed_properties.len(), 2);
    }
}
