//! Policy Store collaborator and the in-memory reference store.
//!
//! [`PolicyStore`] is the read side the authorizer depends on. [`PolicyAdmin`]
//! adds the mutations operators need; every mutation is what invalidates
//! [`CachedPolicyStore`](crate::cache::CachedPolicyStore).

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tollgate_types::{PolicyId, ResourceType, TenantId};
use tracing::info;

use crate::policy::{NewPolicy, Policy};
use crate::provider::{self, ProviderError};

/// Errors from policy persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("policy name already exists: {0}")]
    DuplicateName(String),

    #[error("policy not found: {0}")]
    NotFound(PolicyId),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type for policy administration.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Read access to policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Active policies in scope for `tenant_id` and `resource_type`: global or
    /// same-tenant, and type-agnostic or same-type. Order is unspecified.
    async fn active_policies(
        &self,
        tenant_id: Option<TenantId>,
        resource_type: &ResourceType,
    ) -> provider::Result<Vec<Policy>>;
}

/// Policy mutations.
#[async_trait]
pub trait PolicyAdmin: PolicyStore {
    async fn create_policy(&self, policy: NewPolicy) -> Result<Policy>;

    /// Replaces the stored policy with the same id. `created_at` is preserved.
    async fn update_policy(&self, policy: Policy) -> Result<Policy>;

    /// Deletes the policy and its conditions.
    async fn delete_policy(&self, id: PolicyId) -> Result<()>;

    async fn set_active(&self, id: PolicyId, active: bool) -> Result<Policy>;

    async fn list_policies(&self) -> Result<Vec<Policy>>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct StoreState {
    next_id: u64,
    policies: BTreeMap<PolicyId, Policy>,
}

impl StoreState {
    fn name_taken(&self, name: &str, except: Option<PolicyId>) -> bool {
        self.policies
            .values()
            .any(|p| p.name == name && Some(p.id) != except)
    }
}

/// Policy store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    state: RwLock<StoreState>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `policies`, assigning ids in order.
    pub fn with_policies(policies: impl IntoIterator<Item = NewPolicy>) -> Result<Self> {
        let store = Self::new();
        for policy in policies {
            store.insert(policy)?;
        }
        Ok(store)
    }

    /// Creates a store from already-materialized policies, keeping their ids.
    pub fn from_policies(policies: impl IntoIterator<Item = Policy>) -> Result<Self> {
        let mut state = StoreState::default();
        for policy in policies {
            if state.name_taken(&policy.name, None) {
                return Err(StoreError::DuplicateName(policy.name));
            }
            state.next_id = state.next_id.max(policy.id.as_u64());
            state.policies.insert(policy.id, policy);
        }
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    fn read(&self) -> provider::Result<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| ProviderError::Backend("policy store lock poisoned".to_string()))
    }

    fn write(&self) -> provider::Result<std::sync::RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| ProviderError::Backend("policy store lock poisoned".to_string()))
    }

    fn insert(&self, new: NewPolicy) -> Result<Policy> {
        let mut state = self.write()?;
        if state.name_taken(&new.name, None) {
            return Err(StoreError::DuplicateName(new.name));
        }
        state.next_id += 1;
        let policy = Policy::from_new(PolicyId::new(state.next_id), new, Utc::now());
        state.policies.insert(policy.id, policy.clone());
        Ok(policy)
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn active_policies(
        &self,
        tenant_id: Option<TenantId>,
        resource_type: &ResourceType,
    ) -> provider::Result<Vec<Policy>> {
        let state = self.read()?;
        Ok(state
            .policies
            .values()
            .filter(|p| p.is_active && p.applies_to(tenant_id, resource_type))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PolicyAdmin for InMemoryPolicyStore {
    async fn create_policy(&self, policy: NewPolicy) -> Result<Policy> {
        let created = self.insert(policy)?;
        info!(policy_id = %created.id, name = %created.name, "Policy created");
        Ok(created)
    }

    async fn update_policy(&self, mut policy: Policy) -> Result<Policy> {
        let mut state = self.write()?;
        let Some(existing) = state.policies.get(&policy.id) else {
            return Err(StoreError::NotFound(policy.id));
        };
        let created_at = existing.created_at;
        if state.name_taken(&policy.name, Some(policy.id)) {
            return Err(StoreError::DuplicateName(policy.name));
        }
        policy.created_at = created_at;
        policy.updated_at = Utc::now();
        state.policies.insert(policy.id, policy.clone());
        info!(policy_id = %policy.id, "Policy updated");
        Ok(policy)
    }

    async fn delete_policy(&self, id: PolicyId) -> Result<()> {
        let mut state = self.write()?;
        state.policies.remove(&id).ok_or(StoreError::NotFound(id))?;
        info!(policy_id = %id, "Policy deleted");
        Ok(())
    }

    async fn set_active(&self, id: PolicyId, active: bool) -> Result<Policy> {
        let mut state = self.write()?;
        let policy = state.policies.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        policy.is_active = active;
        policy.updated_at = Utc::now();
        info!(policy_id = %id, active, "Policy activation changed");
        Ok(policy.clone())
    }

    async fn list_policies(&self) -> Result<Vec<Policy>> {
        Ok(self.read()?.policies.values().cloned().collect())
    }
}
