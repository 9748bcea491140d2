//! The embedding surface: one connection manager with one protocol.
//!
//! A host configures names, starts the service, asks for a connection and
//! then feeds contacts and messages in from the protocol side. Whatever the
//! connection reports back is collected with [`Service::drain_events`].

use serde::{Deserialize, Serialize};

use crate::chat::{Chat, ChatKind};
use crate::connection::Connection;
use crate::error::{ServiceError, TpError};
use crate::event::EventEnvelope;
use crate::handle::Handle;
use crate::message::MessageParts;
use crate::presence::PresenceStatus;
use crate::protocol::{Parameters, Protocol, SELF_ID_PARAM};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Initial,
    Prepared,
    Running,
}

/// A plain-text message arriving from the protocol side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct Service {
    state: ServiceState,
    cm_name: String,
    protocol_name: String,
    self_id: String,
    protocol: Option<Protocol>,
    seq: u64,
}

impl Service {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Running
    }

    pub fn manager_name(&self) -> &str {
        &self.cm_name
    }

    pub fn protocol_name(&self) -> &str {
        &self.protocol_name
    }

    pub fn self_contact_identifier(&self) -> &str {
        &self.self_id
    }

    pub fn set_manager_name(&mut self, name: &str) {
        self.cm_name = name.to_string();
    }

    pub fn set_protocol_name(&mut self, name: &str) {
        self.protocol_name = name.to_string();
    }

    pub fn set_self_contact_identifier(&mut self, self_id: &str) {
        self.self_id = self_id.to_string();
    }

    /// Build the protocol object. Only valid from the initial state.
    pub fn prepare(&mut self) -> Result<(), ServiceError> {
        if self.state != ServiceState::Initial {
            return Err(ServiceError::AlreadyPrepared);
        }
        if self.protocol_name.is_empty() {
            return Err(ServiceError::MissingName("protocol"));
        }
        if self.cm_name.is_empty() {
            return Err(ServiceError::MissingName("connection manager"));
        }
        self.protocol = Some(Protocol::new(&self.cm_name, &self.protocol_name));
        self.state = ServiceState::Prepared;
        tracing::debug!(cm = %self.cm_name, protocol = %self.protocol_name, "Service prepared");
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), ServiceError> {
        match self.state {
            ServiceState::Running => return Err(ServiceError::AlreadyRunning),
            ServiceState::Initial => self.prepare()?,
            ServiceState::Prepared => {}
        }
        self.state = ServiceState::Running;
        tracing::info!(cm = %self.cm_name, protocol = %self.protocol_name, "Service started");
        Ok(())
    }

    /// Tear down the protocol and its connection. Undrained events are lost.
    pub fn stop(&mut self) -> Result<(), ServiceError> {
        if self.state != ServiceState::Running {
            return Err(ServiceError::NotRunning);
        }
        if let Some(conn) = self.protocol.as_ref().and_then(Protocol::connection) {
            let dropped = conn.pending_events().len();
            if dropped > 0 {
                tracing::warn!(dropped, "Stopping with undrained events");
            }
        }
        self.protocol = None;
        self.state = ServiceState::Initial;
        tracing::info!("Service stopped");
        Ok(())
    }

    pub fn protocol(&self) -> Option<&Protocol> {
        self.protocol.as_ref()
    }

    /// Create a connection for the configured self identifier.
    pub fn request_connection(&mut self) -> Result<&mut Connection, ServiceError> {
        if self.self_id.is_empty() {
            return Err(ServiceError::MissingName("self contact"));
        }
        let mut parameters = Parameters::new();
        parameters.insert(SELF_ID_PARAM.to_string(), self.self_id.clone());
        Ok(self.running_protocol()?.create_connection(&parameters)?)
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.protocol.as_ref().and_then(Protocol::connection)
    }

    /// The live connection, for client-side calls.
    pub fn connection_mut(&mut self) -> Result<&mut Connection, ServiceError> {
        self.running_protocol()?
            .connection_mut()
            .ok_or_else(|| TpError::not_available("No connection has been requested").into())
    }

    pub fn add_contact(&mut self, identifier: &str) -> Result<Handle, ServiceError> {
        Ok(self.running_protocol()?.add_contact(identifier)?)
    }

    pub fn set_contact_list<S: AsRef<str>>(&mut self, identifiers: &[S]) -> Result<(), ServiceError> {
        Ok(self.running_protocol()?.set_contact_list(identifiers)?)
    }

    /// Set a contact's presence by status name (`available`, `offline`, `unknown`).
    pub fn set_contact_presence(&mut self, identifier: &str, status: &str) -> Result<Handle, ServiceError> {
        let status: PresenceStatus = status.parse()?;
        Ok(self
            .running_protocol()?
            .set_contact_presence(identifier, status)?)
    }

    /// Deliver a text message. Returns the pending message id.
    pub fn add_message(&mut self, message: &Message) -> Result<u32, ServiceError> {
        if message.chat.kind != ChatKind::Contact {
            return Err(TpError::invalid_argument(format!(
                "Unsupported chat kind {:?}",
                message.chat.kind
            ))
            .into());
        }
        if !message.from.is_empty() && message.from != message.chat.identifier {
            tracing::debug!(
                from = %message.from,
                chat = %message.chat.identifier,
                "Sender differs from chat, using chat identifier"
            );
        }
        Ok(self
            .running_protocol()?
            .add_message(&message.chat.identifier, &message.text)?)
    }

    /// Deliver a message given as a JSON array of parts.
    ///
    /// Malformed JSON or an empty part list is dropped with a warning and
    /// yields `None`. A stopped service fails before the JSON is looked at.
    pub fn add_json_message(&mut self, chat: &Chat, json: &str) -> Result<Option<u32>, ServiceError> {
        let protocol = self.running_protocol()?;
        let parts = match MessageParts::from_json(json) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(chat = %chat.identifier, "Ignoring JSON message: {e}");
                return Ok(None);
            }
        };
        if parts.is_empty() {
            tracing::warn!(chat = %chat.identifier, "Ignoring empty JSON message");
            return Ok(None);
        }
        Ok(Some(protocol.add_structured_message(chat, parts)?))
    }

    /// Take every queued connection event, wrapped and numbered.
    pub fn drain_events(&mut self) -> Vec<EventEnvelope> {
        let Some(conn) = self.protocol.as_mut().and_then(Protocol::connection_mut) else {
            return Vec::new();
        };
        conn.take_events()
            .into_iter()
            .map(|event| {
                self.seq += 1;
                EventEnvelope::new(self.seq, event)
            })
            .collect()
    }

    fn running_protocol(&mut self) -> Result<&mut Protocol, ServiceError> {
        if self.state != ServiceState::Running {
            return Err(ServiceError::NotRunning);
        }
        self.protocol.as_mut().ok_or(ServiceError::NotRunning)
    }
}
