//! A connection: one self contact, its handle table, presence and channels.
//!
//! The connection owns every piece of per-session state and dies with it.
//! Calls are synchronous; each mutation queues its [`ConnectionEvent`]
//! afterwards, so a consumer draining [`Connection::take_events`] always
//! sees notifications in mutation order.
//!
//! The implementation is split into submodules for readability:
//! - [`contacts`]: handle inspection/requests, contact attributes, presence
//! - [`requests`]: channel creation and the ensure-channel pattern
//! - [`messaging`]: inbound/outbound message relay and pending queues

mod contacts;
mod messaging;
mod requests;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::channel::ChannelManager;
use crate::event::ConnectionEvent;
use crate::handle::{Handle, HandleRegistry, NO_HANDLE};
use crate::presence::{PresenceStatus, PresenceTracker, StatusSpec, SubscriptionState, status_specs};

pub use contacts::{
    CONNECTION_INTERFACE, CONTACT_LIST_INTERFACE, ContactAttributes, ContactAttributesMap,
    SIMPLE_PRESENCE_INTERFACE,
};
pub(crate) use contacts::check_identifiers;

const OBJECT_PATH_BASE: &str = "/org/freedesktop/Telepathy/Connection";

/// Connection status codes (Telepathy numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ConnectionStatus {
    Connected = 0,
    Connecting = 1,
    Disconnected = 2,
}

/// Why the status last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum StatusReason {
    NoneSpecified = 0,
    Requested = 1,
    NetworkError = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ContactListState {
    None = 0,
    Waiting = 1,
    Failure = 2,
    Success = 3,
}

/// One session of the fake protocol.
#[derive(Debug)]
pub struct Connection {
    cm_name: String,
    protocol_name: String,
    self_id: String,
    self_handle: Handle,
    object_path: String,
    status: ConnectionStatus,
    status_reason: StatusReason,
    contact_list_state: ContactListState,
    statuses: BTreeMap<String, StatusSpec>,
    handles: HandleRegistry,
    tracker: PresenceTracker,
    channels: ChannelManager,
    events: Vec<ConnectionEvent>,
}

impl Connection {
    /// New disconnected connection. The self contact gets the first handle.
    pub fn new(cm_name: &str, protocol_name: &str, self_id: &str) -> Self {
        let object_path = format!(
            "{OBJECT_PATH_BASE}/{}/{}/{}",
            escape_path_component(cm_name),
            escape_path_component(protocol_name),
            escape_path_component(self_id),
        );
        let mut conn = Self {
            cm_name: cm_name.to_string(),
            protocol_name: protocol_name.to_string(),
            self_id: self_id.to_string(),
            self_handle: NO_HANDLE,
            channels: ChannelManager::new(object_path.clone()),
            object_path,
            status: ConnectionStatus::Disconnected,
            status_reason: StatusReason::NoneSpecified,
            contact_list_state: ContactListState::None,
            statuses: BTreeMap::new(),
            handles: HandleRegistry::new(),
            tracker: PresenceTracker::new(),
            events: Vec::new(),
        };
        conn.self_handle = conn.ensure_contact(self_id);
        tracing::info!(
            path = %conn.object_path,
            self_handle = conn.self_handle,
            "Connection created"
        );
        conn
    }

    pub fn cm_name(&self) -> &str {
        &self.cm_name
    }

    pub fn protocol_name(&self) -> &str {
        &self.protocol_name
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn self_handle(&self) -> Handle {
        self.self_handle
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn status_reason(&self) -> StatusReason {
        self.status_reason
    }

    pub fn contact_list_state(&self) -> ContactListState {
        self.contact_list_state
    }

    /// Statuses published by [`Connection::connect`]; empty before that.
    pub fn statuses(&self) -> &BTreeMap<String, StatusSpec> {
        &self.statuses
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    /// Bring the connection online.
    ///
    /// Goes through `Connecting`, publishes the status table, marks the
    /// self contact available and finishes `Connected` with the contact
    /// list ready. Already-connected connections are left alone.
    pub fn connect(&mut self) {
        if self.status == ConnectionStatus::Connected {
            tracing::debug!(path = %self.object_path, "Connect on a connected connection");
            return;
        }
        self.set_status(ConnectionStatus::Connecting, StatusReason::Requested);

        self.statuses = status_specs();
        let self_handle = self.self_handle;
        self.apply_presence(&[self_handle], PresenceStatus::Available);

        self.set_status(ConnectionStatus::Connected, StatusReason::Requested);
        self.set_contact_list_state(ContactListState::Success);
    }

    /// Take the connection offline, closing every channel.
    pub fn disconnect(&mut self) {
        if self.status == ConnectionStatus::Disconnected {
            return;
        }
        for object_path in self.channels.clear() {
            self.emit(ConnectionEvent::ChannelClosed { object_path });
        }
        self.set_status(ConnectionStatus::Disconnected, StatusReason::Requested);
        self.set_contact_list_state(ContactListState::None);
    }

    /// Handle for `identifier`, creating the contact if needed.
    pub fn ensure_contact(&mut self, identifier: &str) -> Handle {
        self.ensure_contacts(&[identifier])
            .into_iter()
            .next()
            .unwrap_or(NO_HANDLE)
    }

    /// Handles for every identifier, in order.
    ///
    /// New contacts start with unknown presence and unknown subscription;
    /// one notification of each kind covers the whole batch.
    pub fn ensure_contacts<S: AsRef<str>>(&mut self, identifiers: &[S]) -> Vec<Handle> {
        let mut result = Vec::with_capacity(identifiers.len());
        let mut new_ids = Vec::new();
        let mut new_handles = Vec::new();

        for identifier in identifiers {
            let identifier = identifier.as_ref();
            let existing = self.handles.reverse_lookup(identifier);
            if existing != NO_HANDLE {
                result.push(existing);
                continue;
            }
            let handle = self.handles.ensure(identifier);
            new_ids.push(identifier.to_string());
            new_handles.push(handle);
            result.push(handle);
        }

        if !new_handles.is_empty() {
            self.apply_presence(&new_handles, PresenceStatus::Unknown);
            self.apply_subscription(&new_ids, &new_handles, SubscriptionState::Unknown);
        }
        result
    }

    /// Remove and return every queued event.
    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Events queued since the last [`Connection::take_events`].
    pub fn pending_events(&self) -> &[ConnectionEvent] {
        &self.events
    }

    fn emit(&mut self, event: ConnectionEvent) {
        self.events.push(event);
    }

    fn set_status(&mut self, status: ConnectionStatus, reason: StatusReason) {
        tracing::info!(path = %self.object_path, ?status, ?reason, "Connection status changed");
        self.status = status;
        self.status_reason = reason;
        self.emit(ConnectionEvent::StatusChanged { status, reason });
    }

    fn set_contact_list_state(&mut self, state: ContactListState) {
        self.contact_list_state = state;
        self.emit(ConnectionEvent::ContactListStateChanged { state });
    }

    fn apply_presence(&mut self, handles: &[Handle], status: PresenceStatus) {
        let presences = self.tracker.set_presence(handles, status);
        self.emit(ConnectionEvent::PresencesChanged { presences });
    }

    fn apply_subscription(
        &mut self,
        identifiers: &[String],
        handles: &[Handle],
        state: SubscriptionState,
    ) {
        let changes = self.tracker.set_subscription(identifiers, handles, state);
        self.emit(ConnectionEvent::ContactsChanged(changes));
    }
}

/// Escape `s` so it is a valid D-Bus object path element.
///
/// ASCII letters and digits pass through; every other byte becomes `_xx`
/// (lowercase hex). The empty string becomes `_`.
pub fn escape_path_component(s: &str) -> String {
    if s.is_empty() {
        return "_".to_string();
    }
    let mut out = String::with_capacity(s.len());
    for (i, b) in s.bytes().enumerate() {
        let keep = b.is_ascii_alphabetic() || (b.is_ascii_digit() && i > 0);
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{b:02x}"));
        }
    }
    out
}
