//! Local and external identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Caller-side identifier of a domain object.
///
/// Object IDs are random UUIDs assigned when a [`crate::DomainObject`] is
/// constructed. Clones of an object share its ID, which is how an object
/// embedded as a reference inside another object is linked back to the
/// copy pushed on its own.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Creates a new random object ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an object ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity assigned by the external engine to a pushed object.
///
/// `name` is unique among objects of the same kind in the external store.
/// `persistent_id`, when present, survives renames for the lifetime of the
/// external object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// External name or number.
    pub name: String,
    /// Human readable label.
    pub label: String,
    /// Opaque id that never changes, empty if the engine provides none.
    pub persistent_id: String,
}

impl ExternalIdentity {
    /// Creates an identity with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            persistent_id: String::new(),
        }
    }

    /// Creates a fully populated identity.
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        persistent_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            persistent_id: persistent_id.into(),
        }
    }

    /// Returns the persistent id if the engine assigned one.
    #[must_use]
    pub fn persistent_id(&self) -> Option<&str> {
        if self.persistent_id.is_empty() {
            None
        } else {
            Some(&self.persistent_id)
        }
    }
}

impl fmt::Display for ExternalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unique() {
        assert_ne!(ObjectId::new(), ObjectId::new());
    }

    #[test]
    fn uuid_roundtrip() {
        let uuid = Uuid::new_v4();
        assert_eq!(*ObjectId::from_uuid(uuid).as_uuid(), uuid);
    }

    #[test]
    fn persistent_id_empty_is_none() {
        assert_eq!(ExternalIdentity::named("1").persistent_id(), None);
        let identity = ExternalIdentity::new("1", "N1", "abc");
        assert_eq!(identity.persistent_id(), Some("abc"));
        assert_eq!(identity.to_string(), "1");
    }
}
