//! Contact handle registry.
//!
//! Handles are small integers standing in for contact identifiers on the
//! wire. Within one connection the mapping is bijective and handles are
//! never reused: the registry only grows.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::TpError;

/// Integer standing in for a contact within one connection.
pub type Handle = u32;

/// "No handle". Never allocated.
pub const NO_HANDLE: Handle = 0;

/// Kind of entity a handle refers to. Only [`HandleType::Contact`] is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum HandleType {
    None = 0,
    Contact = 1,
    Room = 2,
    List = 3,
    Group = 4,
}

impl HandleType {
    /// Reject anything but contact handles.
    pub fn require_contact(self) -> Result<(), TpError> {
        if self == Self::Contact {
            Ok(())
        } else {
            Err(TpError::invalid_argument(format!(
                "Unsupported handle type {self:?}"
            )))
        }
    }
}

impl TryFrom<u32> for HandleType {
    type Error = TpError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Contact),
            2 => Ok(Self::Room),
            3 => Ok(Self::List),
            4 => Ok(Self::Group),
            other => Err(TpError::invalid_argument(format!(
                "Unknown handle type {other}"
            ))),
        }
    }
}

/// Bidirectional handle ↔ identifier table.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    identifiers: BTreeMap<Handle, String>,
    handles: HashMap<String, Handle>,
    last_allocated: Handle,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `identifier`, allocating the next integer if it's new.
    pub fn ensure(&mut self, identifier: &str) -> Handle {
        if let Some(&handle) = self.handles.get(identifier) {
            return handle;
        }
        self.last_allocated += 1;
        let handle = self.last_allocated;
        self.identifiers.insert(handle, identifier.to_string());
        self.handles.insert(identifier.to_string(), handle);
        tracing::debug!(handle, identifier, "Allocated handle");
        handle
    }

    pub fn lookup(&self, handle: Handle) -> Option<&str> {
        self.identifiers.get(&handle).map(String::as_str)
    }

    /// Handle for `identifier`, or [`NO_HANDLE`] if it was never ensured.
    pub fn reverse_lookup(&self, identifier: &str) -> Handle {
        self.handles.get(identifier).copied().unwrap_or(NO_HANDLE)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.identifiers.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// All entries in ascending handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &str)> {
        self.identifiers.iter().map(|(h, id)| (*h, id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_is_idempotent() {
        let mut reg = HandleRegistry::new();
        let a = reg.ensure("alice");
        let b = reg.ensure("bob");
        assert_eq!(reg.ensure("alice"), a);
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn handles_start_at_one_and_increase() {
        let mut reg = HandleRegistry::new();
        assert_eq!(reg.ensure("self"), 1);
        assert_eq!(reg.ensure("alice"), 2);
        assert_eq!(reg.ensure("bob"), 3);
    }

    #[test]
    fn lookup_roundtrip() {
        let mut reg = HandleRegistry::new();
        for id in ["alice", "bob", "carol@example.com", ""] {
            let h = reg.ensure(id);
            assert_eq!(reg.lookup(h), Some(id));
            assert_eq!(reg.reverse_lookup(id), h);
        }
    }

    #[test]
    fn unknown_entries() {
        let mut reg = HandleRegistry::new();
        reg.ensure("alice");
        assert_eq!(reg.lookup(0), None);
        assert_eq!(reg.lookup(42), None);
        assert_eq!(reg.reverse_lookup("nobody"), NO_HANDLE);
        assert!(!reg.contains(NO_HANDLE));
    }

    #[test]
    fn iter_is_sorted_by_handle() {
        let mut reg = HandleRegistry::new();
        reg.ensure("zed");
        reg.ensure("amy");
        let entries: Vec<_> = reg.iter().collect();
        assert_eq!(entries, vec![(1, "zed"), (2, "amy")]);
    }

    #[test]
    fn handle_type_validation() {
        assert!(HandleType::Contact.require_contact().is_ok());
        let err = HandleType::Room.require_contact().unwrap_err();
        assert!(matches!(err, TpError::InvalidArgument(_)));
        assert_eq!(HandleType::try_from(1).unwrap(), HandleType::Contact);
        assert!(HandleType::try_from(9).is_err());
    }
}
