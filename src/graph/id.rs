//! Opaque string identifiers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random (UUID v4) identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap an existing identifier string
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(
    /// Unique identifier for a concept node
    NodeId
);
opaque_id!(
    /// Unique identifier for a co-occurrence edge
    EdgeId
);
opaque_id!(
    /// Owner of a graph partition (a user of the host application)
    OwnerId
);
opaque_id!(
    /// A structured unit of work whose phases are tracked as clusters
    TaskId
);
opaque_id!(ClusterId);
opaque_id!(CheckpointId);
opaque_id!(DomainId);
opaque_id!(FieldId);
opaque_id!(MasterEntryId);
opaque_id!(
    /// Contact record in the host application's address book
    ContactId
);
