//! Strongly typed identifiers.
//!
//! Newtype wrappers around UUIDs for every platform entity. The wrappers
//! prevent accidental misuse of one ID type where another is expected,
//! at zero runtime cost.
//!
//! # Example
//!
//! ```
//! use stratus_core::{BucketId, OrgId};
//!
//! let org = OrgId::new();
//! let bucket = BucketId::new();
//!
//! fn requires_org(id: OrgId) -> String {
//!     id.to_string()
//! }
//!
//! let _ = requires_org(org);
//! // requires_org(bucket); // does not compile
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The underlying UUID parse error message.
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The all-zero placeholder ID, used on create paths before
            /// the backend assigns a real one.
            #[must_use]
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns true for the all-zero placeholder ID.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Identifier for an organization, the tenant boundary of the platform.
    OrgId
);

define_id!(
    /// Identifier for a platform user.
    UserId
);

define_id!(
    /// Identifier for a bucket.
    BucketId
);

define_id!(
    /// Identifier for a label.
    LabelId
);

define_id!(
    /// Identifier for a dashboard.
    DashboardId
);

define_id!(
    /// Identifier for a dashboard variable.
    VariableId
);

define_id!(
    /// Identifier for a telegraf agent configuration.
    TelegrafId
);

define_id!(
    /// Identifier for a notification endpoint.
    EndpointId
);

define_id!(
    /// Kind-erased resource identifier, used where an operation spans
    /// resource kinds (label mappings, clone targets).
    ResourceId
);

macro_rules! impl_into_resource_id {
    ($($name:ident),+ $(,)?) => {
        $(
            impl From<$name> for ResourceId {
                fn from(id: $name) -> Self {
                    ResourceId::from_uuid(*id.as_uuid())
                }
            }
        )+
    };
}

impl_into_resource_id!(BucketId, LabelId, DashboardId, VariableId, TelegrafId, EndpointId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_distinct_ids() {
        assert_ne!(OrgId::new(), OrgId::new());
    }

    #[test]
    fn display_returns_uuid_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = BucketId::from_uuid(uuid);
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn nil_id_is_nil() {
        let id = OrgId::from_uuid(Uuid::nil());
        assert!(id.is_nil());
        assert!(!OrgId::new().is_nil());
    }

    #[test]
    fn parse_invalid_uuid_returns_error() {
        let result: std::result::Result<LabelId, _> = "not-a-uuid".parse();
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "LabelId");
        assert!(!err.message.is_empty());
    }

    #[test]
    fn serializes_as_plain_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = VariableId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }

    #[test]
    fn typed_id_converts_to_resource_id() {
        let bucket = BucketId::new();
        let resource: ResourceId = bucket.into();
        assert_eq!(resource.as_uuid(), bucket.as_uuid());
    }
}
