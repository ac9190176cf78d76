//! # tollgate-types: Core types for `Tollgate`
//!
//! Shared identifiers used across the authorization engine:
//! - Principal IDs ([`SubjectId`])
//! - Tenancy IDs ([`TenantId`], [`GroupId`])
//! - Resource addressing ([`ResourceId`], [`ResourceType`])
//! - Policy IDs ([`PolicyId`])

use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Entity IDs - All Copy (cheap 8-byte values)
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw numeric identifier.
            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a subject (user/principal) requesting access.
    SubjectId
);

define_id!(
    /// Unique identifier for a tenant (organization).
    TenantId
);

define_id!(
    /// Unique identifier for a group (department) inside a tenant.
    GroupId
);

define_id!(
    /// Identifier of a resource, unique within its [`ResourceType`].
    ResourceId
);

define_id!(
    /// Unique, stable identifier for a policy.
    ///
    /// Ids are assigned in ascending creation order, so comparing two ids
    /// tells which policy is older. The evaluator relies on this to break
    /// priority ties.
    PolicyId
);

// ============================================================================
// Resource Type - Clone (Other contains String)
// ============================================================================

/// The kind of domain object being accessed.
///
/// Serializes as a lowercase string (`"entity"`, `"chat"`, ...). Unknown
/// names round-trip through [`ResourceType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceType {
    /// A business entity (contact, client, candidate).
    Entity,
    /// A chat conversation, optionally linked to an entity.
    Chat,
    /// A recorded call, optionally linked to an entity.
    Call,
    /// A department (group) within an organization.
    Department,
    /// An organization (tenant).
    Organization,
    /// A user account.
    User,
    /// Any other resource kind; never loaded by the context builder.
    Other(String),
}

impl ResourceType {
    /// Every concrete kind the resource provider knows how to load.
    pub const LOADABLE: [ResourceType; 6] = [
        ResourceType::Entity,
        ResourceType::Chat,
        ResourceType::Call,
        ResourceType::Department,
        ResourceType::Organization,
        ResourceType::User,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Entity => "entity",
            ResourceType::Chat => "chat",
            ResourceType::Call => "call",
            ResourceType::Department => "department",
            ResourceType::Organization => "organization",
            ResourceType::User => "user",
            ResourceType::Other(name) => name,
        }
    }

    /// Returns `true` for kinds with a loader in the resource provider.
    pub fn is_loadable(&self) -> bool {
        !matches!(self, ResourceType::Other(_))
    }
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ResourceType {
    fn from(name: &str) -> Self {
        match name {
            "entity" => ResourceType::Entity,
            "chat" => ResourceType::Chat,
            "call" => ResourceType::Call,
            "department" => ResourceType::Department,
            "organization" => ResourceType::Organization,
            "user" => ResourceType::User,
            other => ResourceType::Other(other.to_string()),
        }
    }
}

impl From<String> for ResourceType {
    fn from(name: String) -> Self {
        ResourceType::from(name.as_str())
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        match value {
            ResourceType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&PolicyId::new(42)).expect("serialize id");
        assert_eq!(json, "42");

        let id: TenantId = serde_json::from_str("7").expect("deserialize id");
        assert_eq!(id, TenantId::new(7));
    }

    #[test]
    fn test_policy_ids_order_by_creation() {
        assert!(PolicyId::new(1) < PolicyId::new(2));
    }

    #[test]
    fn test_resource_type_known_names() {
        for kind in ResourceType::LOADABLE {
            assert!(kind.is_loadable());
            assert_eq!(ResourceType::from(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_resource_type_other_is_not_loadable() {
        let kind = ResourceType::from("invoice");
        assert_eq!(kind, ResourceType::Other("invoice".to_string()));
        assert!(!kind.is_loadable());
        assert_eq!(kind.to_string(), "invoice");
    }

    #[test]
    fn test_resource_type_serializes_lowercase() {
        let json = serde_json::to_string(&ResourceType::Department).expect("serialize");
        assert_eq!(json, "\"department\"");

        let kind: ResourceType = serde_json::from_str("\"chat\"").expect("deserialize");
        assert_eq!(kind, ResourceType::Chat);
    }

    proptest! {
        #[test]
        fn resource_type_string_conversion_is_stable(name in "[a-z_]{1,16}") {
            let kind = ResourceType::from(name.as_str());
            prop_assert_eq!(String::from(kind), name);
        }
    }
}
