//! # tollgate-abac: Attribute-Based Access Control
//!
//! Decides whether a subject may perform an action on a resource in a
//! multi-tenant application. Decisions are driven by data: prioritized
//! allow/deny policies whose conditions test a per-request attribute context.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  AccessRequest                               │
//! │  (Subject + Resource + Action + Tenant)      │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  ContextBuilder          ◄── ResourceProvider │
//! │  ├─ Subject memberships and roles            │
//! │  ├─ Resource object, creator, linked parent  │
//! │  └─ Derived facts (owner, group admin, ...)  │
//! └─────────────────┬───────────────────────────┘
//!                   │ AttributeContext
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Evaluator               ◄── PolicyStore     │
//! │  ├─ Priority desc, id asc                    │
//! │  ├─ First fully matching policy wins         │
//! │  └─ Default deny                             │
//! └─────────────────┬───────────────────────────┘
//!                   │ Decision
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  AuditRecorder           ──► AuditSink       │
//! │  One entry per check, never blocks           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! [`Authorizer`] ties the stages together and is the only type most
//! callers need.
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use tollgate_abac::audit::InMemoryAuditSink;
//! use tollgate_abac::builder::{AccessRequest, Subject};
//! use tollgate_abac::memory::InMemoryResourceProvider;
//! use tollgate_abac::policy::standard_policies;
//! use tollgate_abac::provider::ResourceObject;
//! use tollgate_abac::store::InMemoryPolicyStore;
//! use tollgate_abac::Authorizer;
//! use tollgate_config::RoleConfig;
//! use tollgate_types::{ResourceId, ResourceType, SubjectId, TenantId};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let alice = SubjectId::new(1);
//! let acme = TenantId::new(10);
//!
//! let provider = InMemoryResourceProvider::new()
//!     .with_tenant_membership(alice, acme, "member")
//!     .with_resource(
//!         ResourceObject::new(ResourceType::Entity, ResourceId::new(7))
//!             .with_tenant(acme)
//!             .created_by(alice),
//!     );
//! let store = InMemoryPolicyStore::with_policies(standard_policies(&RoleConfig::default())).unwrap();
//!
//! let authorizer = Authorizer::new(
//!     Arc::new(provider),
//!     Arc::new(store),
//!     Arc::new(InMemoryAuditSink::new()),
//! );
//!
//! let request = AccessRequest::new(Subject::new(alice), ResourceType::Entity, "update")
//!     .with_resource_id(ResourceId::new(7))
//!     .in_tenant(acme);
//!
//! let decision = authorizer.check(&request).await.unwrap();
//! assert!(decision.is_allowed());
//! assert_eq!(decision.matched_policy_name.as_deref(), Some("owner-full-access"));
//! # });
//! ```

pub mod attributes;
pub mod audit;
pub mod authorizer;
pub mod builder;
pub mod cache;
pub mod evaluator;
pub mod memory;
pub mod policy;
pub mod provider;
pub mod store;

pub use attributes::{AttributeContext, AttributeType, AttributeValue, Namespace};
pub use authorizer::{AccessDecision, Authorizer, AuthzError, Explanation};
pub use builder::{AccessRequest, Subject};
pub use evaluator::{Decision, evaluate, evaluate_batch};
pub use policy::{Condition, Effect, NewPolicy, Operator, Policy, standard_policies};
pub use provider::{ProviderError, ResourceObject, ResourceProvider};
pub use store::{PolicyAdmin, PolicyStore, StoreError};
