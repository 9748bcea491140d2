//! The protocol object: connection parameters, creation, and the
//! protocol-side entry points that feed contacts and messages in.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::channel::{RequestableChannelClass, text_chat_class};
use crate::chat::Chat;
use crate::connection::{Connection, check_identifiers};
use crate::error::TpError;
use crate::handle::Handle;
use crate::message::MessageParts;
use crate::presence::{PresenceStatus, StatusSpec, status_specs};

pub const SELF_ID_PARAM: &str = "self_id";

/// Connection parameters as key/value strings.
pub type Parameters = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamFlags {
    pub required: bool,
    pub register: bool,
    pub has_default: bool,
    pub secret: bool,
}

/// A parameter a connection request may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolParameter {
    pub name: String,
    /// D-Bus type signature.
    pub signature: String,
    pub flags: ParamFlags,
}

/// Addressing metadata: which vCard fields and URI schemes can name a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Addressing {
    pub vcard_fields: Vec<String>,
    pub uri_schemes: Vec<String>,
}

impl Default for Addressing {
    fn default() -> Self {
        Self {
            vcard_fields: vec!["x-example-vcard-field".to_string()],
            uri_schemes: vec!["example-uri-scheme".to_string()],
        }
    }
}

/// One protocol of the connection manager.
///
/// The protocol keeps the most recently created connection and routes
/// protocol-side calls (contacts, presence, inbound messages) to it.
#[derive(Debug)]
pub struct Protocol {
    name: String,
    cm_name: String,
    parameters: Vec<ProtocolParameter>,
    addressing: Addressing,
    connection: Option<Connection>,
}

impl Protocol {
    pub fn new(cm_name: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            cm_name: cm_name.to_string(),
            parameters: vec![ProtocolParameter {
                name: SELF_ID_PARAM.to_string(),
                signature: "s".to_string(),
                flags: ParamFlags {
                    required: true,
                    register: false,
                    has_default: false,
                    secret: false,
                },
            }],
            addressing: Addressing::default(),
            connection: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection_manager_name(&self) -> &str {
        &self.cm_name
    }

    pub fn set_connection_manager_name(&mut self, name: &str) {
        self.cm_name = name.to_string();
    }

    pub fn parameters(&self) -> &[ProtocolParameter] {
        &self.parameters
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    pub fn requestable_channel_classes(&self) -> Vec<RequestableChannelClass> {
        vec![text_chat_class()]
    }

    pub fn statuses(&self) -> BTreeMap<String, StatusSpec> {
        status_specs()
    }

    /// Build a connection from `parameters` and make it the current one.
    ///
    /// A previous connection, if any, is dropped.
    pub fn create_connection(&mut self, parameters: &Parameters) -> Result<&mut Connection, TpError> {
        for param in self.parameters.iter().filter(|p| p.flags.required) {
            if !parameters.contains_key(&param.name) {
                return Err(TpError::invalid_argument(format!(
                    "Missing required parameter '{}'",
                    param.name
                )));
            }
        }
        if let Some(unknown) = parameters
            .keys()
            .find(|key| !self.parameters.iter().any(|p| &p.name == *key))
        {
            return Err(TpError::invalid_argument(format!(
                "Unknown parameter '{unknown}'"
            )));
        }

        let self_id = parameters
            .get(SELF_ID_PARAM)
            .map(String::as_str)
            .unwrap_or_default();
        if self.connection.is_some() {
            tracing::info!(protocol = %self.name, "Replacing existing connection");
        }
        Ok(self
            .connection
            .insert(Connection::new(&self.cm_name, &self.name, self_id)))
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.connection.as_mut()
    }

    /// Drop the current connection.
    pub fn release_connection(&mut self) -> Option<Connection> {
        self.connection.take()
    }

    pub fn identify_account(&self, parameters: &Parameters) -> Result<String, TpError> {
        tracing::debug!(?parameters, "IdentifyAccount");
        Err(TpError::not_implemented("IdentifyAccount"))
    }

    pub fn normalize_contact(&self, contact_id: &str) -> Result<String, TpError> {
        tracing::debug!(contact_id, "NormalizeContact");
        Err(TpError::not_implemented("NormalizeContact"))
    }

    pub fn normalize_vcard_address(&self, field: &str, address: &str) -> Result<String, TpError> {
        tracing::debug!(field, address, "NormalizeVCardAddress");
        Err(TpError::not_implemented("NormalizeVCardAddress"))
    }

    pub fn normalize_contact_uri(&self, uri: &str) -> Result<String, TpError> {
        tracing::debug!(uri, "NormalizeContactUri");
        Err(TpError::not_implemented("NormalizeContactUri"))
    }

    pub fn add_contact(&mut self, identifier: &str) -> Result<Handle, TpError> {
        let conn = self.require_connection()?;
        check_identifiers(&[identifier])?;
        Ok(conn.ensure_contact(identifier))
    }

    pub fn set_contact_list<S: AsRef<str>>(&mut self, identifiers: &[S]) -> Result<(), TpError> {
        self.require_connection()?.set_contact_list(identifiers)
    }

    pub fn set_contact_presence(
        &mut self,
        identifier: &str,
        status: PresenceStatus,
    ) -> Result<Handle, TpError> {
        self.require_connection()?
            .set_contact_presence(identifier, status)
    }

    pub fn add_message(&mut self, sender: &str, text: &str) -> Result<u32, TpError> {
        self.require_connection()?.receive_message(sender, text)
    }

    pub fn add_structured_message(
        &mut self,
        chat: &Chat,
        message: MessageParts,
    ) -> Result<u32, TpError> {
        self.require_connection()?.add_received_message(chat, message)
    }

    fn require_connection(&mut self) -> Result<&mut Connection, TpError> {
        self.connection
            .as_mut()
            .ok_or_else(|| TpError::not_available("No connection has been created"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(self_id: &str) -> Parameters {
        let mut p = Parameters::new();
        p.insert(SELF_ID_PARAM.to_string(), self_id.to_string());
        p
    }

    #[test]
    fn create_connection_needs_self_id() {
        let mut proto = Protocol::new("simplecm", "simple");
        let err = proto.create_connection(&Parameters::new()).unwrap_err();
        assert!(matches!(err, TpError::InvalidArgument(_)));
        assert!(proto.connection().is_none());
    }

    #[test]
    fn create_connection_rejects_unknown_parameters() {
        let mut proto = Protocol::new("simplecm", "simple");
        let mut p = params("me");
        p.insert("password".to_string(), "x".to_string());
        assert!(proto.create_connection(&p).is_err());
    }

    #[test]
    fn created_connection_is_current() {
        let mut proto = Protocol::new("simplecm", "simple");
        let conn = proto.create_connection(&params("me")).unwrap();
        assert_eq!(conn.self_id(), "me");
        assert_eq!(conn.cm_name(), "simplecm");
        assert_eq!(proto.add_contact("alice").unwrap(), 2);
    }

    #[test]
    fn protocol_side_calls_need_a_connection() {
        let mut proto = Protocol::new("simplecm", "simple");
        assert!(matches!(
            proto.add_contact("alice"),
            Err(TpError::NotAvailable(_))
        ));
        assert!(proto.add_message("alice", "hi").is_err());
    }

    #[test]
    fn empty_contact_identifiers_are_rejected() {
        let mut proto = Protocol::new("simplecm", "simple");
        proto.create_connection(&params("me")).unwrap().connect();

        assert!(matches!(proto.add_contact(""), Err(TpError::InvalidHandle(_))));
        assert!(matches!(
            proto.set_contact_presence("", PresenceStatus::Available),
            Err(TpError::InvalidHandle(_))
        ));
        assert!(matches!(proto.add_message("", "hi"), Err(TpError::InvalidHandle(_))));
        let conn = proto.connection().unwrap();
        assert_eq!(conn.handles().len(), 1);
        assert!(conn.channels().is_empty());
    }

    #[test]
    fn normalization_is_not_implemented() {
        let proto = Protocol::new("simplecm", "simple");
        assert!(matches!(
            proto.normalize_contact("Alice"),
            Err(TpError::NotImplemented(_))
        ));
        assert!(proto.normalize_contact_uri("example-uri-scheme:alice").is_err());
        assert!(proto.normalize_vcard_address("x-example-vcard-field", "a").is_err());
        assert!(proto.identify_account(&params("me")).is_err());
    }

    #[test]
    fn advertised_metadata() {
        let proto = Protocol::new("simplecm", "simple");
        assert_eq!(proto.parameters().len(), 1);
        assert!(proto.parameters()[0].flags.required);
        assert_eq!(proto.requestable_channel_classes().len(), 1);
        assert_eq!(proto.statuses().len(), 3);
        assert_eq!(proto.addressing().uri_schemes, vec!["example-uri-scheme"]);
    }

    #[test]
    fn protocol_side_presence_and_messages() {
        let mut proto = Protocol::new("simplecm", "simple");
        proto.create_connection(&params("me")).unwrap().connect();

        let bob = proto
            .set_contact_presence("bob", PresenceStatus::Available)
            .unwrap();
        proto.add_message("bob", "yo").unwrap();

        let conn = proto.connection().unwrap();
        assert_eq!(conn.presence(bob).status, "available");
        assert_eq!(conn.channels().len(), 1);
    }
}
