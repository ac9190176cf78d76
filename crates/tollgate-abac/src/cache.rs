//! Process-wide cache of active policies.
//!
//! Keyed by `(tenant, resource_type)`. Every mutation routed through the
//! wrapper clears the whole cache; changes made behind its back need an
//! explicit [`CachedPolicyStore::invalidate`].
//!
//! A read that misses loads from the wrapped store without holding the lock.
//! Its result is only kept if no invalidation happened while it was loading.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tollgate_config::PolicyCacheConfig;
use tollgate_types::{PolicyId, ResourceType, TenantId};
use tracing::{debug, warn};

use crate::policy::{NewPolicy, Policy};
use crate::provider::{self, ProviderError};
use crate::store::{self, PolicyAdmin, PolicyStore};

type CacheKey = (Option<TenantId>, ResourceType);

/// Wraps `store` in a [`CachedPolicyStore`] when the cache is enabled.
pub fn from_config<S: PolicyAdmin + 'static>(
    store: S,
    config: &PolicyCacheConfig,
) -> Arc<dyn PolicyAdmin> {
    if config.enabled {
        Arc::new(CachedPolicyStore::new(store).with_ttl(config.ttl()))
    } else {
        Arc::new(store)
    }
}

#[derive(Debug)]
struct CacheEntry {
    loaded_at: Instant,
    policies: Vec<Policy>,
}

/// Caching wrapper around a [`PolicyAdmin`].
#[derive(Debug)]
pub struct CachedPolicyStore<S> {
    inner: S,
    ttl: Option<Duration>,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    /// Bumped on every invalidation, under the write lock.
    generation: AtomicU64,
}

impl<S: PolicyAdmin> CachedPolicyStore<S> {
    /// Wraps `inner`; entries live until invalidated.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            ttl: None,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Entries older than `ttl` are reloaded on next read.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drops every cached entry.
    pub fn invalidate(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| {
            warn!("policy cache lock poisoned, clearing anyway");
            poisoned.into_inner()
        });
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.clear();
        drop(entries);
        debug!("Policy cache invalidated");
    }

    /// Number of cached `(tenant, resource_type)` keys.
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &CacheKey) -> provider::Result<Option<Vec<Policy>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ProviderError::Backend("policy cache lock poisoned".to_string()))?;
        Ok(entries
            .get(key)
            .filter(|entry| self.ttl.is_none_or(|ttl| entry.loaded_at.elapsed() < ttl))
            .map(|entry| entry.policies.clone()))
    }

    /// Stores `policies` unless the cache was invalidated since `generation`.
    fn fill(&self, key: CacheKey, policies: Vec<Policy>, generation: u64) -> provider::Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ProviderError::Backend("policy cache lock poisoned".to_string()))?;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(resource_type = %key.1, "Discarding policies loaded before invalidation");
            return Ok(());
        }
        entries.insert(
            key,
            CacheEntry {
                loaded_at: Instant::now(),
                policies,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl<S: PolicyAdmin> PolicyStore for CachedPolicyStore<S> {
    async fn active_policies(
        &self,
        tenant_id: Option<TenantId>,
        resource_type: &ResourceType,
    ) -> provider::Result<Vec<Policy>> {
        let key = (tenant_id, resource_type.clone());
        if let Some(policies) = self.lookup(&key)? {
            debug!(tenant_id = ?tenant_id, resource_type = %resource_type, "Policy cache hit");
            return Ok(policies);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let policies = self.inner.active_policies(tenant_id, resource_type).await?;
        self.fill(key, policies.clone(), generation)?;
        Ok(policies)
    }
}

#[async_trait]
impl<S: PolicyAdmin> PolicyAdmin for CachedPolicyStore<S> {
    async fn create_policy(&self, policy: NewPolicy) -> store::Result<Policy> {
        let result = self.inner.create_policy(policy).await;
        self.invalidate();
        result
    }

    async fn update_policy(&self, policy: Policy) -> store::Result<Policy> {
        let result = self.inner.update_policy(policy).await;
        self.invalidate();
        result
    }

    async fn delete_policy(&self, id: PolicyId) -> store::Result<()> {
        let result = self.inner.delete_policy(id).await;
        self.invalidate();
        result
    }

    async fn set_active(&self, id: PolicyId, active: bool) -> store::Result<Policy> {
        let result = self.inner.set_active(id, active).await;
        self.invalidate();
        result
    }

    async fn list_policies(&self) -> store::Result<Vec<Policy>> {
        self.inner.list_policies().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use tokio::sync::Notify;

    use super::*;
    use crate::policy::Effect;
    use crate::store::InMemoryPolicyStore;

    /// Counts reads that reach the wrapped store. While `park` is set, a read
    /// takes its snapshot and then waits for `release`.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryPolicyStore,
        reads: AtomicUsize,
        park: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    #[async_trait]
    impl PolicyStore for CountingStore {
        async fn active_policies(
            &self,
            tenant_id: Option<TenantId>,
            resource_type: &ResourceType,
        ) -> provider::Result<Vec<Policy>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let snapshot = self.inner.active_policies(tenant_id, resource_type).await?;
            if self.park.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            Ok(snapshot)
        }
    }

    #[async_trait]
    impl PolicyAdmin for CountingStore {
        async fn create_policy(&self, policy: NewPolicy) -> store::Result<Policy> {
            self.inner.create_policy(policy).await
        }

        async fn update_policy(&self, policy: Policy) -> store::Result<Policy> {
            self.inner.update_policy(policy).await
        }

        async fn delete_policy(&self, id: PolicyId) -> store::Result<()> {
            self.inner.delete_policy(id).await
        }

        async fn set_active(&self, id: PolicyId, active: bool) -> store::Result<Policy> {
            self.inner.set_active(id, active).await
        }

        async fn list_policies(&self) -> store::Result<Vec<Policy>> {
            self.inner.list_policies().await
        }
    }

    fn reads(cache: &CachedPolicyStore<CountingStore>) -> usize {
        cache.inner().reads.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_hit_after_first_read() {
        let cache = CachedPolicyStore::new(CountingStore::default());
        cache
            .create_policy(NewPolicy::new("p", Effect::Allow, 1))
            .await
            .unwrap();

        let first = cache.active_policies(None, &ResourceType::Entity).await.unwrap();
        let second = cache.active_policies(None, &ResourceType::Entity).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(reads(&cache), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_tenant_and_type() {
        let cache = CachedPolicyStore::new(CountingStore::default());

        cache.active_policies(None, &ResourceType::Entity).await.unwrap();
        cache.active_policies(None, &ResourceType::Chat).await.unwrap();
        cache
            .active_policies(Some(TenantId::new(1)), &ResourceType::Entity)
            .await
            .unwrap();

        assert_eq!(reads(&cache), 3);
        assert_eq!(cache.len(), 3);
    }

    async fn active(cache: &CachedPolicyStore<CountingStore>) -> Vec<Policy> {
        cache
            .active_policies(None, &ResourceType::Entity)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_every_mutation_invalidates() {
        let cache = CachedPolicyStore::new(CountingStore::default());

        active(&cache).await;
        let policy = cache
            .create_policy(NewPolicy::new("p", Effect::Allow, 1))
            .await
            .unwrap();
        assert!(cache.is_empty());
        assert_eq!(active(&cache).await.len(), 1);

        cache.set_active(policy.id, false).await.unwrap();
        assert!(cache.is_empty());
        assert!(active(&cache).await.is_empty());

        cache.set_active(policy.id, true).await.unwrap();
        let mut updated = active(&cache).await.remove(0);
        updated.effect = Effect::Deny;
        cache.update_policy(updated).await.unwrap();
        assert!(cache.is_empty());
        assert_eq!(active(&cache).await[0].effect, Effect::Deny);

        cache.delete_policy(policy.id).await.unwrap();
        assert!(cache.is_empty());
        assert!(active(&cache).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_mutation_still_invalidates() {
        let cache = CachedPolicyStore::new(CountingStore::default());
        cache.active_policies(None, &ResourceType::Entity).await.unwrap();

        assert!(cache.delete_policy(PolicyId::new(404)).await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_band_change_needs_invalidate() {
        let cache = CachedPolicyStore::new(CountingStore::default());
        assert!(active(&cache).await.is_empty());

        // Written directly to the wrapped store
        cache
            .inner()
            .create_policy(NewPolicy::new("sneaky", Effect::Allow, 1))
            .await
            .unwrap();
        assert!(active(&cache).await.is_empty());

        cache.invalidate();
        assert_eq!(active(&cache).await.len(), 1);
    }

    #[tokio::test]
    async fn test_load_racing_a_mutation_is_not_cached() {
        let cache = Arc::new(CachedPolicyStore::new(CountingStore::default()));
        let allow = cache
            .create_policy(NewPolicy::new("allow", Effect::Allow, 10))
            .await
            .unwrap();
        cache
            .create_policy(NewPolicy::new("open", Effect::Allow, 1))
            .await
            .unwrap();

        cache.inner().park.store(true, Ordering::SeqCst);
        let reader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { active(&cache).await })
        };
        cache.inner().parked.notified().await;

        cache.set_active(allow.id, false).await.unwrap();
        cache.inner().release.notify_one();

        // The in-flight read returns what it loaded, but must not keep it.
        assert_eq!(reader.await.unwrap().len(), 2);
        assert!(cache.is_empty());

        let names: Vec<String> = active(&cache).await.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["open".to_string()]);
    }

    #[tokio::test]
    async fn test_from_config_respects_enabled_flag() {
        let enabled = from_config(InMemoryPolicyStore::new(), &PolicyCacheConfig::default());
        let disabled = from_config(
            InMemoryPolicyStore::new(),
            &PolicyCacheConfig {
                enabled: false,
                ttl_secs: None,
            },
        );

        for store in [enabled, disabled] {
            store
                .create_policy(NewPolicy::new("p", Effect::Allow, 1))
                .await
                .unwrap();
            let policies = store
                .active_policies(None, &ResourceType::Entity)
                .await
                .unwrap();
            assert_eq!(policies.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = CachedPolicyStore::new(CountingStore::default()).with_ttl(Some(Duration::ZERO));

        cache.active_policies(None, &ResourceType::Entity).await.unwrap();
        cache.active_policies(None, &ResourceType::Entity).await.unwrap();

        assert_eq!(reads(&cache), 2);
    }
}
