//! Context builder: resolves an access request into an [`AttributeContext`].
//!
//! The builder reads raw facts through the [`ResourceProvider`] (memberships,
//! resource objects, shares, creator roles) and derives the boolean facts
//! policies are written against (`is_resource_owner`,
//! `resource_in_admin_group`, `has_shared_access`, ...).
//!
//! Missing data is never an error here: an unknown resource yields a
//! minimal `{type, id}` namespace and unresolved lookups yield absent or
//! `false` facts. Only provider failures propagate.
//!
//! A builder owns a [`LookupCache`] and must not be reused across checks.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tollgate_config::{BusinessHoursConfig, RoleConfig};
use tollgate_types::{GroupId, ResourceId, ResourceType, SubjectId, TenantId};
use tracing::debug;

use crate::attributes::{AttributeContext, AttributeValue, Namespace, environment_at};
use crate::provider::{ResourceObject, ResourceProvider, Result};

// ============================================================================
// Request
// ============================================================================

/// The principal asking for access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: SubjectId,
    /// Global role (e.g. "superadmin", "admin", "user").
    pub role: Option<String>,
}

impl Subject {
    pub fn new(id: SubjectId) -> Self {
        Self { id, role: None }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// One authorization question: may `subject` perform `action` on the resource?
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRequest {
    pub subject: Subject,
    pub resource_type: ResourceType,
    pub resource_id: Option<ResourceId>,
    /// Pre-loaded resource; when absent and `resource_id` is set, the builder loads it.
    pub resource: Option<ResourceObject>,
    pub action: String,
    pub tenant_id: Option<TenantId>,
    /// Caller-supplied environment values; these win over computed ones.
    pub environment: Namespace,
}

impl AccessRequest {
    pub fn new(subject: Subject, resource_type: ResourceType, action: impl Into<String>) -> Self {
        Self {
            subject,
            resource_type,
            resource_id: None,
            resource: None,
            action: action.into(),
            tenant_id: None,
            environment: Namespace::new(),
        }
    }

    pub fn with_resource_id(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    /// Supplies the resource object directly, skipping the provider load.
    pub fn with_resource(mut self, resource: ResourceObject) -> Self {
        self.resource_id = Some(resource.id);
        self.resource = Some(resource);
        self
    }

    pub fn in_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_environment(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.environment.insert(name, value);
        self
    }
}

// ============================================================================
// Lookup cache
// ============================================================================

/// Memoizes provider lookups for the duration of one build.
///
/// Owned by a single [`ContextBuilder`]; dropped with it.
#[derive(Debug, Default)]
pub struct LookupCache {
    shared_levels: HashMap<(SubjectId, ResourceType, ResourceId), Option<String>>,
    subject_roles: HashMap<SubjectId, Option<String>>,
    group_members: HashMap<GroupId, Vec<SubjectId>>,
}

impl LookupCache {
    pub fn len(&self) -> usize {
        self.shared_levels.len() + self.subject_roles.len() + self.group_members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds the attribute context for one check.
pub struct ContextBuilder<'a> {
    provider: &'a dyn ResourceProvider,
    roles: &'a RoleConfig,
    hours: &'a BusinessHoursConfig,
    cache: LookupCache,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(
        provider: &'a dyn ResourceProvider,
        roles: &'a RoleConfig,
        hours: &'a BusinessHoursConfig,
    ) -> Self {
        Self {
            provider,
            roles,
            hours,
            cache: LookupCache::default(),
        }
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Resolves `request` into a complete attribute context as of `now`.
    pub async fn build(
        &mut self,
        request: &AccessRequest,
        now: DateTime<Utc>,
    ) -> Result<AttributeContext> {
        let mut context = AttributeContext::new();

        context.subject = self.subject_namespace(request).await?;
        let object = self.resolve_resource(request).await?;
        context.resource = self.resource_namespace(request, object.as_ref()).await?;
        self.derive_subject_facts(request, object.as_ref(), &mut context)
            .await?;

        context.action.insert("type", request.action.as_str());

        context.environment = environment_at(now, self.hours);
        context.environment.merge(request.environment.clone());

        debug!(
            subject_id = %request.subject.id,
            resource_type = %request.resource_type,
            resource_found = object.is_some(),
            subject_facts = context.subject.len(),
            resource_facts = context.resource.len(),
            "Attribute context built"
        );

        Ok(context)
    }

    // ------------------------------------------------------------------------
    // Subject
    // ------------------------------------------------------------------------

    async fn subject_namespace(&mut self, request: &AccessRequest) -> Result<Namespace> {
        let subject = &request.subject;
        let mut ns = Namespace::new()
            .with("id", subject.id.as_u64())
            .with("role", subject.role.clone())
            .with(
                "is_superadmin",
                subject.role.as_deref() == Some(self.roles.superadmin_role.as_str()),
            );

        // Tenants
        let tenants = self.provider.tenant_memberships(subject.id).await?;
        ns.insert(
            "tenant_ids",
            tenants
                .iter()
                .map(|m| m.tenant_id.as_u64())
                .collect::<Vec<_>>(),
        );
        ns.insert("tenant_roles", role_map(tenants.iter().map(|m| (m.tenant_id.to_string(), &m.role))));

        if let Some(tenant_id) = request.tenant_id {
            let tenant_role = tenants
                .iter()
                .find(|m| m.tenant_id == tenant_id)
                .map(|m| m.role.clone());
            let is_owner = tenant_role.as_deref() == Some(self.roles.tenant_owner_role.as_str());
            let is_admin = tenant_role
                .as_ref()
                .is_some_and(|role| self.roles.tenant_admin_roles.contains(role));
            ns.insert("tenant_role", tenant_role);
            ns.insert("is_tenant_owner", is_owner);
            ns.insert("is_tenant_admin", is_admin);
        }

        // Groups
        let groups = self.provider.group_memberships(subject.id).await?;
        ns.insert(
            "group_ids",
            groups.iter().map(|m| m.group_id.as_u64()).collect::<Vec<_>>(),
        );
        ns.insert("group_roles", role_map(groups.iter().map(|m| (m.group_id.to_string(), &m.role))));

        let admin_groups: Vec<GroupId> = groups
            .iter()
            .filter(|m| self.is_elevated(&m.role))
            .map(|m| m.group_id)
            .collect();
        let dept_role = groups
            .iter()
            .find(|m| self.is_elevated(&m.role))
            .map(|m| m.role.clone());

        let mut member_ids = BTreeSet::new();
        for group_id in &admin_groups {
            member_ids.extend(self.group_members(*group_id).await?);
        }

        ns.insert(
            "admin_group_ids",
            admin_groups.iter().map(GroupId::as_u64).collect::<Vec<_>>(),
        );
        ns.insert(
            "group_member_ids",
            member_ids.iter().map(SubjectId::as_u64).collect::<Vec<_>>(),
        );
        ns.insert("dept_role", dept_role);

        Ok(ns)
    }

    fn is_elevated(&self, role: &str) -> bool {
        self.roles.elevated_group_roles.iter().any(|r| r == role)
    }

    // ------------------------------------------------------------------------
    // Resource
    // ------------------------------------------------------------------------

    async fn resolve_resource(&self, request: &AccessRequest) -> Result<Option<ResourceObject>> {
        if let Some(resource) = &request.resource {
            return Ok(Some(resource.clone()));
        }
        match request.resource_id {
            Some(id) if request.resource_type.is_loadable() => {
                self.provider.load_resource(&request.resource_type, id).await
            }
            _ => Ok(None),
        }
    }

    async fn resource_namespace(
        &mut self,
        request: &AccessRequest,
        object: Option<&ResourceObject>,
    ) -> Result<Namespace> {
        let resource_id = request.resource_id.or(object.map(|o| o.id));
        let core = Namespace::new()
            .with("type", request.resource_type.as_str())
            .with("id", resource_id.map(|id| id.as_u64()));

        let Some(object) = object else {
            return Ok(core);
        };

        // Kind-specific fields first so the core fields below win.
        let mut ns = object.attributes.clone();
        ns.merge(core);

        if let Some(tenant_id) = object.tenant_id {
            ns.insert("tenant_id", tenant_id.as_u64());
        }
        if let Some(group_id) = object.group_id {
            ns.insert("group_id", group_id.as_u64());
        }
        if let Some(owner_id) = object.owner_id {
            ns.insert("owner_id", owner_id.as_u64());
        }

        let mut is_private = false;
        if let Some(creator) = object.created_by {
            ns.insert("created_by", creator.as_u64());
            if let Some(role) = self.subject_role(creator).await? {
                is_private = role == self.roles.superadmin_role;
                ns.insert("created_by_role", role);
            }
        }
        ns.insert("is_private", is_private);

        if let Some(parent) = object.linked.as_ref().filter(|p| p.resource_type.is_loadable()) {
            let parent_object = self
                .provider
                .load_resource(&parent.resource_type, parent.id)
                .await?;
            if let Some(group_id) = parent_object.and_then(|p| p.group_id) {
                ns.insert(linked_group_key(&parent.resource_type), group_id.as_u64());
            }
        }

        let overrides = self
            .provider
            .resource_attributes(&object.resource_type, object.id)
            .await?;
        for attribute in overrides {
            if matches!(attribute.attribute_name.as_str(), "type" | "id") {
                continue;
            }
            ns.insert(attribute.attribute_name, attribute.attribute_value);
        }

        Ok(ns)
    }

    // ------------------------------------------------------------------------
    // Derived subject facts (require the resource namespace)
    // ------------------------------------------------------------------------

    async fn derive_subject_facts(
        &mut self,
        request: &AccessRequest,
        object: Option<&ResourceObject>,
        context: &mut AttributeContext,
    ) -> Result<()> {
        let subject_id = AttributeValue::from(request.subject.id.as_u64());
        let resource = &context.resource;

        let creator_or_owner: Vec<&AttributeValue> = ["created_by", "owner_id"]
            .iter()
            .filter_map(|key| resource.get(key))
            .filter(|v| !v.is_null())
            .collect();

        let is_resource_owner = creator_or_owner.iter().any(|v| v.loose_eq(&subject_id));

        let tenant_id_matches_resource = resource
            .get("tenant_id")
            .filter(|v| !v.is_null())
            .is_some_and(|tenant| list_contains(context.subject.get("tenant_ids"), tenant));

        let admin_groups = context.subject.get("admin_group_ids");
        let resource_in_admin_group = resource
            .iter()
            .filter(|(key, _)| key.as_str() == "group_id" || is_linked_group_key(key))
            .any(|(_, group)| !group.is_null() && list_contains(admin_groups, group));

        let members = context.subject.get("group_member_ids");
        let resource_created_by_group_member = creator_or_owner
            .iter()
            .any(|id| list_contains(members, id));

        let shared_level = match request.resource_id.or(object.map(|o| o.id)) {
            Some(resource_id) => {
                self.shared_level(request.subject.id, &request.resource_type, resource_id)
                    .await?
            }
            None => None,
        };

        let subject = &mut context.subject;
        subject.insert("is_resource_owner", is_resource_owner);
        subject.insert("tenant_id_matches_resource", tenant_id_matches_resource);
        subject.insert("resource_in_admin_group", resource_in_admin_group);
        subject.insert(
            "resource_created_by_group_member",
            resource_created_by_group_member,
        );
        subject.insert("has_shared_access", shared_level.is_some());
        subject.insert("shared_access_level", shared_level);

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Cached lookups
    // ------------------------------------------------------------------------

    async fn shared_level(
        &mut self,
        subject_id: SubjectId,
        resource_type: &ResourceType,
        resource_id: ResourceId,
    ) -> Result<Option<String>> {
        let key = (subject_id, resource_type.clone(), resource_id);
        if let Some(level) = self.cache.shared_levels.get(&key) {
            return Ok(level.clone());
        }
        let level = self
            .provider
            .shared_access_level(subject_id, resource_type, resource_id)
            .await?;
        self.cache.shared_levels.insert(key, level.clone());
        Ok(level)
    }

    async fn subject_role(&mut self, subject_id: SubjectId) -> Result<Option<String>> {
        if let Some(role) = self.cache.subject_roles.get(&subject_id) {
            return Ok(role.clone());
        }
        let role = self.provider.subject_role(subject_id).await?;
        self.cache.subject_roles.insert(subject_id, role.clone());
        Ok(role)
    }

    async fn group_members(&mut self, group_id: GroupId) -> Result<Vec<SubjectId>> {
        if let Some(members) = self.cache.group_members.get(&group_id) {
            return Ok(members.clone());
        }
        let members = self.provider.group_members(group_id).await?;
        self.cache.group_members.insert(group_id, members.clone());
        Ok(members)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn role_map<'r>(entries: impl Iterator<Item = (String, &'r String)>) -> AttributeValue {
    AttributeValue::Map(
        entries
            .map(|(id, role)| (id, AttributeValue::from(role.as_str())))
            .collect::<BTreeMap<_, _>>(),
    )
}

/// `linked_<kind>_group_id`, e.g. `linked_entity_group_id` for a call's entity.
pub fn linked_group_key(parent: &ResourceType) -> String {
    format!("linked_{parent}_group_id")
}

fn is_linked_group_key(key: &str) -> bool {
    key.starts_with("linked_") && key.ends_with("_group_id")
}

fn list_contains(list: Option<&AttributeValue>, value: &AttributeValue) -> bool {
    list.and_then(AttributeValue::as_list)
        .is_some_and(|items| items.iter().any(|item| item.loose_eq(value)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryResourceProvider;
    use crate::provider::ResourceAttribute;
    use chrono::TimeZone;

    const ALICE: SubjectId = SubjectId::new(1);
    const BOB: SubjectId = SubjectId::new(2);
    const CAROL: SubjectId = SubjectId::new(3);
    const ROOT: SubjectId = SubjectId::new(99);

    const ACME: TenantId = TenantId::new(10);
    const GLOBEX: TenantId = TenantId::new(20);

    const SALES: GroupId = GroupId::new(100);
    const SUPPORT: GroupId = GroupId::new(200);

    fn now() -> DateTime<Utc> {
        // Wednesday 10:00 UTC
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 0, 0).unwrap()
    }

    /// Alice leads sales in Acme; Bob is a sales member; Carol is in support.
    fn provider() -> InMemoryResourceProvider {
        InMemoryResourceProvider::new()
            .with_subject_role(ALICE, "user")
            .with_subject_role(BOB, "user")
            .with_subject_role(ROOT, "superadmin")
            .with_tenant_membership(ALICE, ACME, "admin")
            .with_tenant_membership(BOB, ACME, "member")
            .with_group_membership(ALICE, SUPPORT, "member")
            .with_group_membership(ALICE, SALES, "lead")
            .with_group_membership(BOB, SALES, "member")
            .with_group_membership(CAROL, SUPPORT, "sub_admin")
            .with_resource(
                ResourceObject::new(ResourceType::Entity, ResourceId::new(500))
                    .with_tenant(ACME)
                    .with_group(SALES)
                    .created_by(BOB),
            )
            .with_resource(
                ResourceObject::new(ResourceType::Entity, ResourceId::new(501))
                    .with_tenant(ACME)
                    .created_by(ROOT),
            )
            .with_resource(
                ResourceObject::new(ResourceType::Call, ResourceId::new(700))
                    .with_tenant(ACME)
                    .created_by(CAROL)
                    .linked_to(ResourceType::Entity, ResourceId::new(500)),
            )
    }

    async fn build(provider: &InMemoryResourceProvider, request: &AccessRequest) -> AttributeContext {
        let roles = RoleConfig::default();
        let hours = BusinessHoursConfig::default();
        ContextBuilder::new(provider, &roles, &hours)
            .build(request, now())
            .await
            .expect("build context")
    }

    fn alice() -> Subject {
        Subject::new(ALICE).with_role("user")
    }

    fn ints(values: &[u64]) -> AttributeValue {
        AttributeValue::from(values.to_vec())
    }

    #[tokio::test]
    async fn test_subject_memberships() {
        let provider = provider();
        let request = AccessRequest::new(alice(), ResourceType::Entity, "read").in_tenant(ACME);
        let ctx = build(&provider, &request).await;
        let subject = &ctx.subject;

        assert_eq!(subject.get("id"), Some(&AttributeValue::Int(1)));
        assert_eq!(subject.get("role"), Some(&AttributeValue::from("user")));
        assert!(!subject.is_true("is_superadmin"));
        assert_eq!(subject.get("tenant_ids"), Some(&ints(&[10])));
        assert_eq!(subject.get("tenant_role"), Some(&AttributeValue::from("admin")));
        assert!(!subject.is_true("is_tenant_owner"));
        assert!(subject.is_true("is_tenant_admin"));
        assert_eq!(subject.get("group_ids"), Some(&ints(&[200, 100])));
        assert_eq!(subject.get("admin_group_ids"), Some(&ints(&[100])));
        assert_eq!(subject.get("group_member_ids"), Some(&ints(&[1, 2])));
        assert_eq!(subject.get("dept_role"), Some(&AttributeValue::from("lead")));

        let roles = subject.get("group_roles").expect("group roles");
        let AttributeValue::Map(roles) = roles else {
            panic!("group_roles should be a map, got {roles:?}");
        };
        assert_eq!(roles.get("100"), Some(&AttributeValue::from("lead")));
        assert_eq!(roles.get("200"), Some(&AttributeValue::from("member")));
    }

    #[tokio::test]
    async fn test_tenant_facts_absent_without_tenant() {
        let provider = provider();
        let request = AccessRequest::new(alice(), ResourceType::Entity, "read");
        let ctx = build(&provider, &request).await;

        assert!(ctx.subject.get("tenant_role").is_none());
        assert!(ctx.subject.get("is_tenant_admin").is_none());
    }

    #[tokio::test]
    async fn test_tenant_facts_for_foreign_tenant() {
        let provider = provider();
        let request = AccessRequest::new(alice(), ResourceType::Entity, "read").in_tenant(GLOBEX);
        let ctx = build(&provider, &request).await;

        assert_eq!(ctx.subject.get("tenant_role"), Some(&AttributeValue::Null));
        assert!(!ctx.subject.is_true("is_tenant_owner"));
        assert!(!ctx.subject.is_true("is_tenant_admin"));
    }

    #[tokio::test]
    async fn test_superadmin_flag() {
        let provider = provider();
        let request = AccessRequest::new(
            Subject::new(ROOT).with_role("superadmin"),
            ResourceType::Entity,
            "delete",
        );
        let ctx = build(&provider, &request).await;
        assert!(ctx.subject.is_true("is_superadmin"));
        assert_eq!(ctx.subject.get("dept_role"), Some(&AttributeValue::Null));
    }

    #[tokio::test]
    async fn test_resource_loaded_by_id() {
        let provider = provider();
        let request = AccessRequest::new(alice(), ResourceType::Entity, "read")
            .with_resource_id(ResourceId::new(500));
        let ctx = build(&provider, &request).await;
        let resource = &ctx.resource;

        assert_eq!(resource.get("type"), Some(&AttributeValue::from("entity")));
        assert_eq!(resource.get("id"), Some(&AttributeValue::Int(500)));
        assert_eq!(resource.get("tenant_id"), Some(&AttributeValue::Int(10)));
        assert_eq!(resource.get("group_id"), Some(&AttributeValue::Int(100)));
        assert_eq!(resource.get("created_by"), Some(&AttributeValue::Int(2)));
        assert_eq!(resource.get("created_by_role"), Some(&AttributeValue::from("user")));
        assert!(!resource.is_true("is_private"));
        assert!(resource.get("owner_id").is_none());

        // Alice is not the creator, but leads the resource's group and Bob is her member
        assert!(!ctx.subject.is_true("is_resource_owner"));
        assert!(ctx.subject.is_true("tenant_id_matches_resource"));
        assert!(ctx.subject.is_true("resource_in_admin_group"));
        assert!(ctx.subject.is_true("resource_created_by_group_member"));
        assert!(!ctx.subject.is_true("has_shared_access"));
        assert_eq!(ctx.subject.get("shared_access_level"), Some(&AttributeValue::Null));
    }

    #[tokio::test]
    async fn test_resource_created_by_superadmin_is_private() {
        let provider = provider();
        let request = AccessRequest::new(alice(), ResourceType::Entity, "read")
            .with_resource_id(ResourceId::new(501));
        let ctx = build(&provider, &request).await;

        assert!(ctx.resource.is_true("is_private"));
        assert_eq!(
            ctx.resource.get("created_by_role"),
            Some(&AttributeValue::from("superadmin"))
        );
    }

    #[tokio::test]
    async fn test_missing_resource_yields_minimal_namespace() {
        let provider = provider();
        let request = AccessRequest::new(alice(), ResourceType::Entity, "read")
            .with_resource_id(ResourceId::new(404));
        let ctx = build(&provider, &request).await;

        assert_eq!(ctx.resource.len(), 2);
        assert_eq!(ctx.resource.get("type"), Some(&AttributeValue::from("entity")));
        assert_eq!(ctx.resource.get("id"), Some(&AttributeValue::Int(404)));
        assert!(!ctx.subject.is_true("is_resource_owner"));
        assert!(!ctx.subject.is_true("tenant_id_matches_resource"));
        assert!(!ctx.subject.is_true("resource_in_admin_group"));
    }

    #[tokio::test]
    async fn test_unknown_resource_type_is_not_loaded() {
        let provider = provider().with_resource(
            ResourceObject::new(ResourceType::from("invoice"), ResourceId::new(500))
                .created_by(ALICE),
        );
        let request = AccessRequest::new(alice(), ResourceType::from("invoice"), "read")
            .with_resource_id(ResourceId::new(500));
        let ctx = build(&provider, &request).await;

        assert_eq!(ctx.resource.len(), 2);
        assert_eq!(ctx.resource.get("type"), Some(&AttributeValue::from("invoice")));
        assert!(!ctx.subject.is_true("is_resource_owner"));
    }

    #[tokio::test]
    async fn test_supplied_object_skips_loading() {
        let provider = provider();
        let object = ResourceObject::new(ResourceType::Chat, ResourceId::new(42))
            .owned_by(ALICE)
            .with_attribute("status", "open");
        let request = AccessRequest::new(alice(), ResourceType::Chat, "write").with_resource(object);
        let ctx = build(&provider, &request).await;

        assert_eq!(ctx.resource.get("id"), Some(&AttributeValue::Int(42)));
        assert_eq!(ctx.resource.get("owner_id"), Some(&AttributeValue::Int(1)));
        assert_eq!(ctx.resource.get("status"), Some(&AttributeValue::from("open")));
        assert!(!ctx.resource.is_true("is_private"));
        assert!(ctx.subject.is_true("is_resource_owner"));
        assert!(ctx.subject.is_true("resource_created_by_group_member"));
    }

    #[tokio::test]
    async fn test_object_attributes_cannot_shadow_core_fields() {
        let provider = provider();
        let object = ResourceObject::new(ResourceType::Chat, ResourceId::new(42))
            .with_attribute("type", "organization")
            .with_attribute("id", 1);
        let request = AccessRequest::new(alice(), ResourceType::Chat, "read").with_resource(object);
        let ctx = build(&provider, &request).await;

        assert_eq!(ctx.resource.get("type"), Some(&AttributeValue::from("chat")));
        assert_eq!(ctx.resource.get("id"), Some(&AttributeValue::Int(42)));
    }

    #[tokio::test]
    async fn test_linked_parent_group() {
        let provider = provider();
        let request = AccessRequest::new(alice(), ResourceType::Call, "read")
            .with_resource_id(ResourceId::new(700));
        let ctx = build(&provider, &request).await;

        assert!(ctx.resource.get("group_id").is_none());
        assert_eq!(
            ctx.resource.get("linked_entity_group_id"),
            Some(&AttributeValue::Int(100))
        );
        assert!(ctx.subject.is_true("resource_in_admin_group"));
        // Carol is in support, not in a group Alice administers
        assert!(!ctx.subject.is_true("resource_created_by_group_member"));
    }

    #[tokio::test]
    async fn test_shared_access() {
        let provider = provider().with_share(CAROL, ResourceType::Entity, ResourceId::new(500), "edit");
        let request = AccessRequest::new(Subject::new(CAROL), ResourceType::Entity, "write")
            .with_resource_id(ResourceId::new(500));
        let ctx = build(&provider, &request).await;

        assert!(ctx.subject.is_true("has_shared_access"));
        assert_eq!(
            ctx.subject.get("shared_access_level"),
            Some(&AttributeValue::from("edit"))
        );
        assert!(!ctx.subject.is_true("tenant_id_matches_resource"));
    }

    #[tokio::test]
    async fn test_resource_attribute_overrides() {
        let provider = provider()
            .with_resource_attribute(ResourceAttribute {
                resource_type: ResourceType::Entity,
                resource_id: ResourceId::new(500),
                attribute_name: "sensitivity".to_string(),
                attribute_value: AttributeValue::from("high"),
            })
            .with_resource_attribute(ResourceAttribute {
                resource_type: ResourceType::Entity,
                resource_id: ResourceId::new(500),
                attribute_name: "type".to_string(),
                attribute_value: AttributeValue::from("user"),
            });
        let request = AccessRequest::new(alice(), ResourceType::Entity, "read")
            .with_resource_id(ResourceId::new(500));
        let ctx = build(&provider, &request).await;

        assert_eq!(ctx.resource.get("sensitivity"), Some(&AttributeValue::from("high")));
        assert_eq!(ctx.resource.get("type"), Some(&AttributeValue::from("entity")));
    }

    #[tokio::test]
    async fn test_action_and_environment() {
        let provider = provider();
        let request = AccessRequest::new(alice(), ResourceType::Entity, "share")
            .with_environment("hour", 23)
            .with_environment("ip", "10.0.0.1");
        let ctx = build(&provider, &request).await;

        assert_eq!(ctx.action.len(), 1);
        assert_eq!(ctx.action.get("type"), Some(&AttributeValue::from("share")));

        // Caller values win; computed values stay where not overridden
        assert_eq!(ctx.environment.get("hour"), Some(&AttributeValue::Int(23)));
        assert_eq!(ctx.environment.get("ip"), Some(&AttributeValue::from("10.0.0.1")));
        assert!(ctx.environment.is_true("is_business_hours"));
        assert_eq!(ctx.environment.get("day_of_week"), Some(&AttributeValue::Int(2)));
    }

    #[tokio::test]
    async fn test_lookups_are_cached_per_builder() {
        let provider = provider().with_share(ALICE, ResourceType::Entity, ResourceId::new(500), "view");
        let roles = RoleConfig::default();
        let hours = BusinessHoursConfig::default();
        let request = AccessRequest::new(alice(), ResourceType::Entity, "read")
            .with_resource_id(ResourceId::new(500));

        let mut builder = ContextBuilder::new(&provider, &roles, &hours);
        builder.build(&request, now()).await.expect("first build");
        let after_first = provider.call_count();
        assert!(!builder.cache().is_empty());

        builder.build(&request, now()).await.expect("second build");
        let second_calls = provider.call_count() - after_first;

        // Memberships and the resource load repeat; share, creator role and group members do not
        assert!(second_calls < after_first);

        // A fresh builder starts cold
        let fresh = ContextBuilder::new(&provider, &roles, &hours);
        assert!(fresh.cache().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let provider = provider();
        provider.set_unavailable(true);
        let roles = RoleConfig::default();
        let hours = BusinessHoursConfig::default();
        let request = AccessRequest::new(alice(), ResourceType::Entity, "read");

        let result = ContextBuilder::new(&provider, &roles, &hours)
            .build(&request, now())
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_linked_group_key() {
        assert_eq!(linked_group_key(&ResourceType::Entity), "linked_entity_group_id");
        assert!(is_linked_group_key("linked_entity_group_id"));
        assert!(!is_linked_group_key("group_id"));
    }
}
