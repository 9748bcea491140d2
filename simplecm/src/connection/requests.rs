//! Channel requests: create, ensure, close.

use super::Connection;
use crate::channel::{ChannelRequest, ChannelType, EnsuredChannel};
use crate::chat::{Chat, ChatKind};
use crate::error::TpError;
use crate::event::ConnectionEvent;
use crate::handle::{Handle, HandleType, NO_HANDLE};

/// A validated request, ready to build a channel from.
struct ResolvedTarget {
    handle: Handle,
    identifier: String,
    initiator: Handle,
}

impl Connection {
    /// Create a new channel. Fails if one already exists for the target.
    pub fn create_channel(&mut self, request: &ChannelRequest) -> Result<String, TpError> {
        let target = self.resolve_request(request)?;
        if let Some(existing) = self.channels.find(HandleType::Contact, target.handle) {
            return Err(TpError::not_available(format!(
                "Channel to '{}' already exists at {}",
                target.identifier,
                existing.object_path()
            )));
        }
        Ok(self.open_channel(target, true))
    }

    /// Return the channel for the request's target, creating it if needed.
    ///
    /// `yours` is true only on the call that created the channel.
    pub fn ensure_channel(&mut self, request: &ChannelRequest) -> Result<EnsuredChannel, TpError> {
        self.ensure_channel_with(request, true)
    }

    /// Ensure a channel by explicit (type, handle type, handle) triple.
    pub fn create_or_reuse_channel(
        &mut self,
        channel_type: &str,
        target_handle_type: HandleType,
        target_handle: Handle,
    ) -> Result<EnsuredChannel, TpError> {
        let request = ChannelRequest {
            channel_type: channel_type.to_string(),
            target_handle_type,
            target_handle: Some(target_handle),
            target_id: None,
            initiator_handle: None,
        };
        self.ensure_channel(&request)
    }

    /// The text channel for a chat, as used by inbound traffic.
    ///
    /// The remote contact is recorded as the initiator.
    pub fn ensure_text_channel(&mut self, chat: &Chat) -> Result<EnsuredChannel, TpError> {
        if chat.kind != ChatKind::Contact {
            return Err(TpError::invalid_argument(format!(
                "Unsupported chat kind {:?}",
                chat.kind
            )));
        }
        super::contacts::check_identifiers(&[chat.identifier.as_str()])?;
        let handle = self.ensure_contact(&chat.identifier);
        let request = ChannelRequest::text_to_handle(handle).with_initiator(handle);
        self.ensure_channel_with(&request, false)
    }

    /// Close a channel. A later ensure for the same target builds a new one.
    pub fn close_channel(&mut self, object_path: &str) -> Result<(), TpError> {
        if self.channels.remove(object_path).is_none() {
            return Err(TpError::invalid_argument(format!(
                "No such channel {object_path}"
            )));
        }
        tracing::debug!(channel = object_path, "Channel closed");
        self.emit(ConnectionEvent::ChannelClosed {
            object_path: object_path.to_string(),
        });
        Ok(())
    }

    fn ensure_channel_with(
        &mut self,
        request: &ChannelRequest,
        requested: bool,
    ) -> Result<EnsuredChannel, TpError> {
        let target = self.resolve_request(request)?;
        if let Some(existing) = self.channels.find(HandleType::Contact, target.handle) {
            return Ok(EnsuredChannel {
                object_path: existing.object_path().to_string(),
                yours: false,
            });
        }
        let object_path = self.open_channel(target, requested);
        Ok(EnsuredChannel {
            object_path,
            yours: true,
        })
    }

    /// Check a request and work out its target.
    ///
    /// Every check runs before the target ID is ensured, so a rejected
    /// request never allocates a handle or queues an event.
    fn resolve_request(&mut self, request: &ChannelRequest) -> Result<ResolvedTarget, TpError> {
        tracing::debug!(?request, "Channel request");
        let _: ChannelType = request.channel_type.parse()?;
        request.target_handle_type.require_contact()?;

        let known = match (request.target_handle, request.target_id.as_deref()) {
            (Some(handle), _) => {
                let identifier = self
                    .handles
                    .lookup(handle)
                    .filter(|_| handle != NO_HANDLE)
                    .ok_or_else(|| TpError::invalid_handle("Target handle is unknown."))?;
                Some((handle, identifier.to_string()))
            }
            (None, Some(identifier)) if !identifier.is_empty() => None,
            _ => return Err(TpError::invalid_handle("Target handle is unknown.")),
        };

        let initiator = request.initiator_handle.unwrap_or(self.self_handle);
        if !self.handles.contains(initiator) {
            return Err(TpError::invalid_handle(format!(
                "Unknown initiator handle {initiator}"
            )));
        }

        let (handle, identifier) = match (known, request.target_id.as_deref()) {
            (Some(target), _) => target,
            (None, Some(identifier)) => (self.ensure_contact(identifier), identifier.to_string()),
            (None, None) => return Err(TpError::invalid_handle("Target handle is unknown.")),
        };

        Ok(ResolvedTarget {
            handle,
            identifier,
            initiator,
        })
    }

    fn open_channel(&mut self, target: ResolvedTarget, requested: bool) -> String {
        let channel = self
            .channels
            .insert(target.handle, target.identifier, target.initiator, requested);
        let event = ConnectionEvent::NewChannel {
            object_path: channel.object_path().to_string(),
            channel_type: channel.channel_type(),
            target_handle_type: channel.target_handle_type(),
            target_handle: channel.target_handle(),
            target_id: channel.target_id().to_string(),
            initiator_handle: channel.initiator_handle(),
            requested,
        };
        let object_path = channel.object_path().to_string();
        tracing::info!(channel = %object_path, target = target.handle, "Text channel created");
        self.emit(event);
        object_path
    }
}
