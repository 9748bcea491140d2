//! Presence and subscription tracking per contact handle.
//!
//! The tracker never changes state on its own. Every setter returns the
//! change set it applied so the owning connection can queue the matching
//! notification after the mutation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TpError;
use crate::handle::Handle;

/// Telepathy presence type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum PresenceType {
    #[default]
    Unset = 0,
    Offline = 1,
    Available = 2,
    Unknown = 7,
}

/// The statuses this protocol knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Available,
    Offline,
    Unknown,
}

impl PresenceStatus {
    pub const ALL: [PresenceStatus; 3] = [Self::Available, Self::Offline, Self::Unknown];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }

    pub fn spec(self) -> StatusSpec {
        match self {
            Self::Available => StatusSpec {
                presence_type: PresenceType::Available,
                may_set_on_self: false,
                can_have_message: true,
            },
            Self::Offline => StatusSpec {
                presence_type: PresenceType::Offline,
                may_set_on_self: false,
                can_have_message: false,
            },
            Self::Unknown => StatusSpec {
                presence_type: PresenceType::Unknown,
                may_set_on_self: false,
                can_have_message: false,
            },
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = TpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TpError::invalid_argument(format!("Unknown presence status '{s}'")))
    }
}

/// How a status behaves: its type and whether clients may use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSpec {
    pub presence_type: PresenceType,
    pub may_set_on_self: bool,
    pub can_have_message: bool,
}

/// The status table advertised by the protocol and the connection.
pub fn status_specs() -> BTreeMap<String, StatusSpec> {
    PresenceStatus::ALL
        .into_iter()
        .map(|status| (status.as_str().to_string(), status.spec()))
        .collect()
}

/// A contact's presence as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SimplePresence {
    pub presence_type: PresenceType,
    pub status: String,
    pub status_message: String,
}

impl SimplePresence {
    pub fn from_status(status: PresenceStatus) -> Self {
        Self {
            presence_type: status.spec().presence_type,
            status: status.as_str().to_string(),
            status_message: String::new(),
        }
    }
}

/// Subscription state codes (Telepathy numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum SubscriptionState {
    #[default]
    Unknown = 0,
    No = 1,
    Yes = 4,
}

/// Subscription details for one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactSubscriptions {
    pub subscribe: SubscriptionState,
    pub publish: SubscriptionState,
    pub publish_request: String,
}

impl ContactSubscriptions {
    fn with_subscribe(subscribe: SubscriptionState) -> Self {
        // Publishing is unconditional in this protocol.
        Self {
            subscribe,
            publish: SubscriptionState::Yes,
            publish_request: String::new(),
        }
    }
}

/// One batch of subscription changes, as emitted to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SubscriptionChanges {
    pub changes: BTreeMap<Handle, ContactSubscriptions>,
    pub identifiers: BTreeMap<Handle, String>,
    /// Always empty: contacts are never removed.
    pub removals: BTreeMap<Handle, String>,
}

/// Per-handle presence and subscription state.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    presences: HashMap<Handle, SimplePresence>,
    subscriptions: HashMap<Handle, SubscriptionState>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the same status on every handle. Returns what changed.
    pub(crate) fn set_presence(
        &mut self,
        handles: &[Handle],
        status: PresenceStatus,
    ) -> BTreeMap<Handle, SimplePresence> {
        let presence = SimplePresence::from_status(status);
        handles
            .iter()
            .map(|&handle| {
                self.presences.insert(handle, presence.clone());
                (handle, presence.clone())
            })
            .collect()
    }

    /// Last presence set for `handle`, or an unset presence.
    pub fn presence(&self, handle: Handle) -> SimplePresence {
        self.presences.get(&handle).cloned().unwrap_or_default()
    }

    /// Record `state` for each (identifier, handle) pair.
    pub(crate) fn set_subscription(
        &mut self,
        identifiers: &[String],
        handles: &[Handle],
        state: SubscriptionState,
    ) -> SubscriptionChanges {
        if identifiers.len() != handles.len() {
            tracing::warn!(
                identifiers = identifiers.len(),
                handles = handles.len(),
                "Subscription update with mismatched lengths, extra entries ignored"
            );
        }
        let mut changes = SubscriptionChanges::default();
        for (identifier, &handle) in identifiers.iter().zip(handles) {
            self.subscriptions.insert(handle, state);
            changes
                .changes
                .insert(handle, ContactSubscriptions::with_subscribe(state));
            changes.identifiers.insert(handle, identifier.clone());
        }
        changes
    }

    pub fn subscription(&self, handle: Handle) -> SubscriptionState {
        self.subscriptions.get(&handle).copied().unwrap_or_default()
    }

    pub fn contact_subscriptions(&self, handle: Handle) -> ContactSubscriptions {
        ContactSubscriptions::with_subscribe(self.subscription(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_set_presence_wins() {
        let mut tracker = PresenceTracker::new();
        tracker.set_presence(&[2, 3], PresenceStatus::Unknown);
        tracker.set_presence(&[2], PresenceStatus::Available);
        tracker.set_presence(&[2], PresenceStatus::Offline);

        assert_eq!(tracker.presence(2).status, "offline");
        assert_eq!(tracker.presence(2).presence_type, PresenceType::Offline);
        assert_eq!(tracker.presence(3).status, "unknown");
    }

    #[test]
    fn missing_presence_is_unset() {
        let tracker = PresenceTracker::new();
        let p = tracker.presence(5);
        assert_eq!(p.presence_type, PresenceType::Unset);
        assert!(p.status.is_empty());
    }

    #[test]
    fn set_presence_reports_changes() {
        let mut tracker = PresenceTracker::new();
        let changed = tracker.set_presence(&[4, 7], PresenceStatus::Available);
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[&4].presence_type, PresenceType::Available);
    }

    #[test]
    fn subscription_changes_carry_identifiers() {
        let mut tracker = PresenceTracker::new();
        let ids = vec!["alice".to_string(), "bob".to_string()];
        let changes = tracker.set_subscription(&ids, &[2, 3], SubscriptionState::Yes);

        assert_eq!(changes.identifiers[&2], "alice");
        assert_eq!(changes.identifiers[&3], "bob");
        assert_eq!(changes.changes[&3].subscribe, SubscriptionState::Yes);
        assert_eq!(changes.changes[&3].publish, SubscriptionState::Yes);
        assert!(changes.removals.is_empty());
        assert_eq!(tracker.subscription(2), SubscriptionState::Yes);
        assert_eq!(tracker.subscription(9), SubscriptionState::Unknown);
    }

    #[test]
    fn mismatched_subscription_lengths_are_truncated() {
        let mut tracker = PresenceTracker::new();
        let ids = vec!["alice".to_string()];
        let changes = tracker.set_subscription(&ids, &[2, 3], SubscriptionState::No);
        assert_eq!(changes.changes.len(), 1);
        assert_eq!(tracker.subscription(3), SubscriptionState::Unknown);
    }

    #[test]
    fn status_parsing() {
        assert_eq!("available".parse::<PresenceStatus>().unwrap(), PresenceStatus::Available);
        assert!(matches!(
            "busy".parse::<PresenceStatus>(),
            Err(TpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn status_table() {
        let specs = status_specs();
        assert_eq!(specs.len(), 3);
        assert!(specs["available"].can_have_message);
        assert!(!specs["offline"].can_have_message);
        assert!(specs.values().all(|s| !s.may_set_on_self));
    }
}
