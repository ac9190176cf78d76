//! In-memory [`ResourceProvider`] for tests, fixtures and the CLI.
//!
//! Fixtures are assembled with the `with_*` builders and read-only afterwards.
//! Outages and latency can be simulated at runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tollgate_types::{GroupId, ResourceId, ResourceType, SubjectId, TenantId};

use crate::provider::{
    GroupMembership, ProviderError, ResourceAttribute, ResourceObject, ResourceProvider, Result,
    TenantMembership,
};

/// Serializable fixture set; the CLI reads one of these from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    pub resources: Vec<ResourceObject>,
    pub subject_roles: Vec<SubjectRole>,
    pub tenant_memberships: Vec<TenantMemberFixture>,
    pub group_memberships: Vec<GroupMemberFixture>,
    pub shares: Vec<ShareFixture>,
    pub resource_attributes: Vec<ResourceAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRole {
    pub subject_id: SubjectId,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMemberFixture {
    pub subject_id: SubjectId,
    pub tenant_id: TenantId,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMemberFixture {
    pub subject_id: SubjectId,
    pub group_id: GroupId,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareFixture {
    pub subject_id: SubjectId,
    pub resource_type: ResourceType,
    pub resource_id: ResourceId,
    pub access_level: String,
}

/// Resource provider backed by in-process fixtures.
#[derive(Debug, Default)]
pub struct InMemoryResourceProvider {
    fixtures: Fixtures,
    unavailable: AtomicBool,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl InMemoryResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixtures(fixtures: Fixtures) -> Self {
        Self {
            fixtures,
            ..Self::default()
        }
    }

    pub fn with_resource(mut self, resource: ResourceObject) -> Self {
        self.fixtures.resources.push(resource);
        self
    }

    pub fn with_subject_role(mut self, subject_id: SubjectId, role: impl Into<String>) -> Self {
        self.fixtures.subject_roles.push(SubjectRole {
            subject_id,
            role: role.into(),
        });
        self
    }

    pub fn with_tenant_membership(
        mut self,
        subject_id: SubjectId,
        tenant_id: TenantId,
        role: impl Into<String>,
    ) -> Self {
        self.fixtures.tenant_memberships.push(TenantMemberFixture {
            subject_id,
            tenant_id,
            role: role.into(),
        });
        self
    }

    /// Memberships are returned in insertion order.
    pub fn with_group_membership(
        mut self,
        subject_id: SubjectId,
        group_id: GroupId,
        role: impl Into<String>,
    ) -> Self {
        self.fixtures.group_memberships.push(GroupMemberFixture {
            subject_id,
            group_id,
            role: role.into(),
        });
        self
    }

    pub fn with_share(
        mut self,
        subject_id: SubjectId,
        resource_type: ResourceType,
        resource_id: ResourceId,
        access_level: impl Into<String>,
    ) -> Self {
        self.fixtures.shares.push(ShareFixture {
            subject_id,
            resource_type,
            resource_id,
            access_level: access_level.into(),
        });
        self
    }

    pub fn with_resource_attribute(mut self, attribute: ResourceAttribute) -> Self {
        self.fixtures.resource_attributes.push(attribute);
        self
    }

    /// Every lookup sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// While set, every lookup fails with [`ProviderError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of lookups served (or refused) so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable {
                collaborator: "resource provider",
                reason: "simulated outage".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for InMemoryResourceProvider {
    async fn load_resource(
        &self,
        resource_type: &ResourceType,
        id: ResourceId,
    ) -> Result<Option<ResourceObject>> {
        self.enter().await?;
        Ok(self
            .fixtures
            .resources
            .iter()
            .find(|r| &r.resource_type == resource_type && r.id == id)
            .cloned())
    }

    async fn tenant_memberships(&self, subject_id: SubjectId) -> Result<Vec<TenantMembership>> {
        self.enter().await?;
        Ok(self
            .fixtures
            .tenant_memberships
            .iter()
            .filter(|m| m.subject_id == subject_id)
            .map(|m| TenantMembership {
                tenant_id: m.tenant_id,
                role: m.role.clone(),
            })
            .collect())
    }

    async fn group_memberships(&self, subject_id: SubjectId) -> Result<Vec<GroupMembership>> {
        self.enter().await?;
        Ok(self
            .fixtures
            .group_memberships
            .iter()
            .filter(|m| m.subject_id == subject_id)
            .map(|m| GroupMembership {
                group_id: m.group_id,
                role: m.role.clone(),
            })
            .collect())
    }

    async fn group_members(&self, group_id: GroupId) -> Result<Vec<SubjectId>> {
        self.enter().await?;
        Ok(self
            .fixtures
            .group_memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .map(|m| m.subject_id)
            .collect())
    }

    async fn shared_access_level(
        &self,
        subject_id: SubjectId,
        resource_type: &ResourceType,
        resource_id: ResourceId,
    ) -> Result<Option<String>> {
        self.enter().await?;
        Ok(self
            .fixtures
            .shares
            .iter()
            .find(|s| {
                s.subject_id == subject_id
                    && &s.resource_type == resource_type
                    && s.resource_id == resource_id
            })
            .map(|s| s.access_level.clone()))
    }

    async fn subject_role(&self, subject_id: SubjectId) -> Result<Option<String>> {
        self.enter().await?;
        Ok(self
            .fixtures
            .subject_roles
            .iter()
            .find(|r| r.subject_id == subject_id)
            .map(|r| r.role.clone()))
    }

    async fn resource_attributes(
        &self,
        resource_type: &ResourceType,
        resource_id: ResourceId,
    ) -> Result<Vec<ResourceAttribute>> {
        self.enter().await?;

        // Unique per name; a later fixture replaces an earlier one.
        let mut by_name: HashMap<&str, &ResourceAttribute> = HashMap::new();
        let mut order = Vec::new();
        for attribute in self
            .fixtures
            .resource_attributes
            .iter()
            .filter(|a| &a.resource_type == resource_type && a.resource_id == resource_id)
        {
            if by_name.insert(&attribute.attribute_name, attribute).is_none() {
                order.push(attribute.attribute_name.as_str());
            }
        }
        Ok(order
            .into_iter()
            .filter_map(|name| by_name.get(name).map(|a| (*a).clone()))
            .collect())
    }
}
