//! Resource Provider collaborator.
//!
//! The surrounding application implements [`ResourceProvider`] on top of
//! its own storage. The engine only reads through it.
//!
//! Lookups distinguish "not found" (`Ok(None)` / empty) from "could not ask"
//! (`Err`). The first degrades to absent facts; the second aborts the check.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tollgate_types::{GroupId, ResourceId, ResourceType, SubjectId, TenantId};

use crate::attributes::{AttributeValue, Namespace};

/// Infrastructure failure in a collaborator (provider, policy store, audit sink).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The backing service could not be reached.
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },

    /// The backing service answered with an error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for collaborator calls.
pub type Result<T> = std::result::Result<T, ProviderError>;

// ============================================================================
// Shapes
// ============================================================================

/// Address of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub id: ResourceId,
}

impl ResourceRef {
    pub fn new(resource_type: ResourceType, id: ResourceId) -> Self {
        Self { resource_type, id }
    }
}

/// The facts about a resource the context builder cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    pub resource_type: ResourceType,
    pub id: ResourceId,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub created_by: Option<SubjectId>,
    #[serde(default)]
    pub owner_id: Option<SubjectId>,
    /// Parent the resource belongs to indirectly, e.g. the entity a call was about.
    #[serde(default)]
    pub linked: Option<ResourceRef>,
    /// Kind-specific fields copied into the resource namespace as-is.
    #[serde(default)]
    pub attributes: Namespace,
}

impl ResourceObject {
    pub fn new(resource_type: ResourceType, id: ResourceId) -> Self {
        Self {
            resource_type,
            id,
            tenant_id: None,
            group_id: None,
            created_by: None,
            owner_id: None,
            linked: None,
            attributes: Namespace::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn created_by(mut self, subject_id: SubjectId) -> Self {
        self.created_by = Some(subject_id);
        self
    }

    pub fn owned_by(mut self, subject_id: SubjectId) -> Self {
        self.owner_id = Some(subject_id);
        self
    }

    pub fn linked_to(mut self, resource_type: ResourceType, id: ResourceId) -> Self {
        self.linked = Some(ResourceRef::new(resource_type, id));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name, value);
        self
    }
}

/// An operator-managed fact attached to a resource without widening its schema.
///
/// Unique per `(resource_type, resource_id, attribute_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAttribute {
    pub resource_type: ResourceType,
    pub resource_id: ResourceId,
    pub attribute_name: String,
    pub attribute_value: AttributeValue,
}

/// A subject's membership in a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub role: String,
}

/// A subject's membership in a group (department).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_id: GroupId,
    pub role: String,
}

// ============================================================================
// Resource Provider
// ============================================================================

/// Read-only access to the application's resource and relationship facts.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Loads a resource. Only called for loadable kinds (see [`ResourceType::is_loadable`]).
    async fn load_resource(
        &self,
        resource_type: &ResourceType,
        id: ResourceId,
    ) -> Result<Option<ResourceObject>>;

    async fn tenant_memberships(&self, subject_id: SubjectId) -> Result<Vec<TenantMembership>>;

    /// Group memberships in a stable order; the first elevated role wins `dept_role`.
    async fn group_memberships(&self, subject_id: SubjectId) -> Result<Vec<GroupMembership>>;

    async fn group_members(&self, group_id: GroupId) -> Result<Vec<SubjectId>>;

    async fn shared_access_level(
        &self,
        subject_id: SubjectId,
        resource_type: &ResourceType,
        resource_id: ResourceId,
    ) -> Result<Option<String>>;

    /// The subject's global role. Used for the creator of a resource.
    async fn subject_role(&self, subject_id: SubjectId) -> Result<Option<String>>;

    /// Ad-hoc attribute overrides for a resource.
    async fn resource_attributes(
        &self,
        _resource_type: &ResourceType,
        _resource_id: ResourceId,
    ) -> Result<Vec<ResourceAttribute>> {
        Ok(Vec::new())
    }
}
