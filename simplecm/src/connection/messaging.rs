//! Message relay between the protocol side and text channels.

use super::Connection;
use crate::channel::{PendingMessage, TextChannel};
use crate::chat::Chat;
use crate::error::TpError;
use crate::event::ConnectionEvent;
use crate::message::MessageParts;

impl Connection {
    /// Deliver `text` from `identifier` to self.
    ///
    /// Ensures the contact and its text channel, then queues the message as
    /// pending on that channel. Returns the pending message id.
    pub fn receive_message(&mut self, identifier: &str, text: &str) -> Result<u32, TpError> {
        let ensured = self.ensure_text_channel(&Chat::contact(identifier))?;
        let received = chrono::Utc::now().timestamp();
        let channel = self.channel_mut(&ensured.object_path)?;
        let (pending_id, message) = channel.add_incoming_message(text, received);
        tracing::debug!(channel = %ensured.object_path, pending_id, "Message received");
        self.emit(ConnectionEvent::MessageReceived {
            object_path: ensured.object_path,
            pending_id,
            message,
        });
        Ok(pending_id)
    }

    /// Queue an already-structured message on the channel for `chat`.
    pub fn add_received_message(
        &mut self,
        chat: &Chat,
        message: MessageParts,
    ) -> Result<u32, TpError> {
        if message.is_empty() {
            return Err(TpError::invalid_argument("Empty message"));
        }
        let ensured = self.ensure_text_channel(chat)?;
        let channel = self.channel_mut(&ensured.object_path)?;
        let pending_id = channel.add_received_message(message.clone());
        self.emit(ConnectionEvent::MessageReceived {
            object_path: ensured.object_path,
            pending_id,
            message,
        });
        Ok(pending_id)
    }

    /// A client sends `message` on a channel. The text is handed to the
    /// protocol side as a `MessageSent` event. Returns the message token.
    pub fn send_message(
        &mut self,
        object_path: &str,
        message: &MessageParts,
        flags: u32,
    ) -> Result<String, TpError> {
        let outbound = self.channel(object_path)?.send_message(message, flags)?;
        let token = outbound.token.clone();
        self.emit(ConnectionEvent::MessageSent {
            chat: Chat::contact(outbound.target_id),
            text: outbound.text,
            token: outbound.token,
        });
        Ok(token)
    }

    pub fn list_pending_messages(&self, object_path: &str) -> Result<&[PendingMessage], TpError> {
        Ok(self.channel(object_path)?.pending_messages())
    }

    pub fn acknowledge_pending_messages(
        &mut self,
        object_path: &str,
        ids: &[u32],
    ) -> Result<(), TpError> {
        self.channel_mut(object_path)?.acknowledge_pending(ids)
    }

    fn channel(&self, object_path: &str) -> Result<&TextChannel, TpError> {
        self.channels
            .get(object_path)
            .ok_or_else(|| TpError::invalid_argument(format!("No such channel {object_path}")))
    }

    fn channel_mut(&mut self, object_path: &str) -> Result<&mut TextChannel, TpError> {
        self.channels
            .get_mut(object_path)
            .ok_or_else(|| TpError::invalid_argument(format!("No such channel {object_path}")))
    }
}
