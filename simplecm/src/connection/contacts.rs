//! Handle inspection and requests, contact attributes, presence and subscriptions.

use std::collections::BTreeMap;

use serde_json::Value;

use super::Connection;
use crate::error::TpError;
use crate::handle::{Handle, HandleType, NO_HANDLE};
use crate::presence::{PresenceStatus, SimplePresence, SubscriptionState};

pub const CONNECTION_INTERFACE: &str = "org.freedesktop.Telepathy.Connection";
pub const CONTACT_LIST_INTERFACE: &str = "org.freedesktop.Telepathy.Connection.Interface.ContactList";
pub const SIMPLE_PRESENCE_INTERFACE: &str =
    "org.freedesktop.Telepathy.Connection.Interface.SimplePresence";

/// Attribute name (`interface/attribute`) to value, for one contact.
pub type ContactAttributes = BTreeMap<String, Value>;

/// Attributes keyed by contact handle.
pub type ContactAttributesMap = BTreeMap<Handle, ContactAttributes>;

impl Connection {
    /// Identifiers for `handles`, in order.
    ///
    /// All or nothing: one unknown handle fails the whole call.
    pub fn inspect_handles(
        &self,
        handle_type: HandleType,
        handles: &[Handle],
    ) -> Result<Vec<String>, TpError> {
        tracing::debug!(?handle_type, ?handles, "InspectHandles");
        handle_type.require_contact()?;

        handles
            .iter()
            .map(|&handle| {
                self.handles
                    .lookup(handle)
                    .map(str::to_string)
                    .ok_or_else(|| TpError::invalid_handle(format!("Unknown handle {handle}")))
            })
            .collect()
    }

    /// Handles for `identifiers`, allocating new ones as needed.
    pub fn request_handles<S: AsRef<str>>(
        &mut self,
        handle_type: HandleType,
        identifiers: &[S],
    ) -> Result<Vec<Handle>, TpError> {
        tracing::debug!(?handle_type, count = identifiers.len(), "RequestHandles");
        handle_type.require_contact()?;
        check_identifiers(identifiers)?;
        Ok(self.ensure_contacts(identifiers))
    }

    /// Known contacts other than self, in handle order.
    pub fn contacts(&self) -> impl Iterator<Item = (Handle, &str)> {
        let self_handle = self.self_handle;
        self.handles.iter().filter(move |(h, _)| *h != self_handle)
    }

    /// Attributes for every contact on the list (self excluded).
    ///
    /// Contact lists always report id, subscription and presence; `interfaces`
    /// and `hold` are accepted for interface compatibility.
    pub fn contact_list_attributes(&self, interfaces: &[&str], hold: bool) -> ContactAttributesMap {
        tracing::debug!(?interfaces, hold, "GetContactListAttributes");
        self.contacts()
            .map(|(handle, identifier)| {
                let mut attrs = ContactAttributes::new();
                attrs.insert(contact_id_key(), Value::from(identifier));
                self.insert_subscription_attributes(handle, &mut attrs);
                self.insert_presence_attribute(handle, &mut attrs);
                (handle, attrs)
            })
            .collect()
    }

    /// Attributes for the given handles. Unknown handles are left out.
    pub fn contact_attributes(
        &self,
        handles: &[Handle],
        interfaces: &[&str],
        hold: bool,
    ) -> ContactAttributesMap {
        tracing::debug!(?handles, ?interfaces, hold, "GetContactAttributes");
        let mut result = ContactAttributesMap::new();
        for &handle in handles {
            let Some(identifier) = self.handles.lookup(handle) else {
                continue;
            };
            let mut attrs = ContactAttributes::new();
            attrs.insert(contact_id_key(), Value::from(identifier));
            if interfaces.contains(&CONTACT_LIST_INTERFACE) {
                self.insert_subscription_attributes(handle, &mut attrs);
            }
            if interfaces.contains(&SIMPLE_PRESENCE_INTERFACE) {
                self.insert_presence_attribute(handle, &mut attrs);
            }
            result.insert(handle, attrs);
        }
        result
    }

    /// Last presence set for `handle`; unset for unknown handles.
    pub fn presence(&self, handle: Handle) -> SimplePresence {
        self.tracker.presence(handle)
    }

    /// Presences for several handles. Fails on the first unknown handle.
    pub fn presences(&self, handles: &[Handle]) -> Result<BTreeMap<Handle, SimplePresence>, TpError> {
        handles
            .iter()
            .map(|&handle| {
                self.require_known(handle)?;
                Ok((handle, self.tracker.presence(handle)))
            })
            .collect()
    }

    pub fn subscription(&self, handle: Handle) -> SubscriptionState {
        self.tracker.subscription(handle)
    }

    /// A client asking to change the self presence. Statuses here are
    /// driven by the protocol side only, so this always fails.
    pub fn set_presence(&mut self, status: &str, message: &str) -> Result<Handle, TpError> {
        tracing::debug!(status, message, "SetPresence not implemented");
        Err(TpError::not_implemented(
            "Presence is controlled by the protocol side",
        ))
    }

    /// Bulk-set presence for known handles and notify listeners once.
    pub fn set_presence_state(
        &mut self,
        handles: &[Handle],
        status: PresenceStatus,
    ) -> Result<(), TpError> {
        for &handle in handles {
            self.require_known(handle)?;
        }
        self.apply_presence(handles, status);
        Ok(())
    }

    /// Record a subscription state for known handles and notify listeners once.
    pub fn set_subscription_state(
        &mut self,
        identifiers: &[String],
        handles: &[Handle],
        state: SubscriptionState,
    ) -> Result<(), TpError> {
        if identifiers.len() != handles.len() {
            return Err(TpError::invalid_argument(format!(
                "{} identifiers for {} handles",
                identifiers.len(),
                handles.len()
            )));
        }
        for (identifier, &handle) in identifiers.iter().zip(handles) {
            if self.handles.lookup(handle) != Some(identifier.as_str()) {
                return Err(TpError::invalid_handle(format!(
                    "Handle {handle} does not belong to '{identifier}'"
                )));
            }
        }
        self.apply_subscription(identifiers, handles, state);
        Ok(())
    }

    /// Replace-or-extend the contact list from the protocol side.
    ///
    /// Every identifier is ensured and marked subscribed. Contacts missing
    /// from `identifiers` are kept: there is no removal. An empty list
    /// changes nothing.
    pub fn set_contact_list<S: AsRef<str>>(&mut self, identifiers: &[S]) -> Result<(), TpError> {
        check_identifiers(identifiers)?;
        if identifiers.is_empty() {
            return Ok(());
        }
        let handles = self.ensure_contacts(identifiers);
        let identifiers: Vec<String> = identifiers.iter().map(|s| s.as_ref().to_string()).collect();
        self.apply_subscription(&identifiers, &handles, SubscriptionState::Yes);
        Ok(())
    }

    /// Presence update for one contact from the protocol side.
    ///
    /// Anyone other than self reporting presence is treated as subscribed.
    pub fn set_contact_presence(
        &mut self,
        identifier: &str,
        status: PresenceStatus,
    ) -> Result<Handle, TpError> {
        check_identifiers(&[identifier])?;
        let handle = self.ensure_contact(identifier);
        self.apply_presence(&[handle], status);
        if handle != self.self_handle {
            self.apply_subscription(&[identifier.to_string()], &[handle], SubscriptionState::Yes);
        }
        Ok(handle)
    }

    fn require_known(&self, handle: Handle) -> Result<(), TpError> {
        if handle != NO_HANDLE && self.handles.contains(handle) {
            Ok(())
        } else {
            Err(TpError::invalid_handle(format!("Unknown handle {handle}")))
        }
    }

    fn insert_subscription_attributes(&self, handle: Handle, attrs: &mut ContactAttributes) {
        let subs = self.tracker.contact_subscriptions(handle);
        attrs.insert(
            format!("{CONTACT_LIST_INTERFACE}/subscribe"),
            Value::from(subs.subscribe as u32),
        );
        attrs.insert(
            format!("{CONTACT_LIST_INTERFACE}/publish"),
            Value::from(subs.publish as u32),
        );
    }

    fn insert_presence_attribute(&self, handle: Handle, attrs: &mut ContactAttributes) {
        let presence = self.tracker.presence(handle);
        attrs.insert(
            format!("{SIMPLE_PRESENCE_INTERFACE}/presence"),
            Value::from(vec![
                Value::from(presence.presence_type as u32),
                Value::from(presence.status),
                Value::from(presence.status_message),
            ]),
        );
    }
}

/// Contact identifiers coming from outside must be non-empty.
pub(crate) fn check_identifiers<S: AsRef<str>>(identifiers: &[S]) -> Result<(), TpError> {
    if identifiers.iter().any(|id| id.as_ref().is_empty()) {
        return Err(TpError::invalid_handle("Empty contact identifier"));
    }
    Ok(())
}

fn contact_id_key() -> String {
    format!("{CONNECTION_INTERFACE}/contact-id")
}
