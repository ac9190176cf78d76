//! ABAC policy definitions.
//!
//! A policy is a prioritized rule with an effect and a list of conditions
//! that must all match for the policy to apply. Policies are evaluated by
//! priority (highest first, ties by ascending id) and the first matching
//! policy determines the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_config::RoleConfig;
use tollgate_types::{PolicyId, ResourceType, TenantId};

use crate::attributes::{AttributeType, AttributeValue};

// ============================================================================
// Effect
// ============================================================================

/// The effect of a policy: allow or deny access.
///
/// Also used as the decision recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Grant access.
    Allow,
    /// Deny access.
    Deny,
}

impl Default for Effect {
    /// Defaults to `Deny` (safe default: deny unless explicitly allowed).
    fn default() -> Self {
        Self::Deny
    }
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Operator
// ============================================================================

/// Comparison applied by a condition.
///
/// The wire names (`eq`, `not_in`, `is_not_null`, ...) are part of the
/// persisted policy format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    In,
    NotIn,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    NotContains,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::Eq,
        Operator::Neq,
        Operator::In,
        Operator::NotIn,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
        Operator::Contains,
        Operator::NotContains,
        Operator::IsNull,
        Operator::IsNotNull,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::IsNull => "is_null",
            Operator::IsNotNull => "is_not_null",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Condition
// ============================================================================

/// A single attribute comparison: `attribute_type.attribute_name <operator> value`.
///
/// A policy's conditions are combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub attribute_type: AttributeType,
    pub attribute_name: String,
    pub operator: Operator,
    /// The expected value. Ignored by `is_null` / `is_not_null`.
    #[serde(default, skip_serializing_if = "AttributeValue::is_null")]
    pub value: AttributeValue,
}

impl Condition {
    pub fn new(
        attribute_type: AttributeType,
        attribute_name: impl Into<String>,
        operator: Operator,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self {
            attribute_type,
            attribute_name: attribute_name.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn subject(
        name: impl Into<String>,
        operator: Operator,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::new(AttributeType::Subject, name, operator, value)
    }

    pub fn resource(
        name: impl Into<String>,
        operator: Operator,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::new(AttributeType::Resource, name, operator, value)
    }

    pub fn action(
        name: impl Into<String>,
        operator: Operator,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::new(AttributeType::Action, name, operator, value)
    }

    pub fn environment(
        name: impl Into<String>,
        operator: Operator,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::new(AttributeType::Environment, name, operator, value)
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} {}",
            self.attribute_type, self.attribute_name, self.operator
        )?;
        match self.operator {
            Operator::IsNull | Operator::IsNotNull => Ok(()),
            _ => {
                let value = serde_json::to_string(&self.value).map_err(|_| std::fmt::Error)?;
                write!(f, " {value}")
            }
        }
    }
}

// ============================================================================
// Policy
// ============================================================================

/// A persisted access control policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Stable id, ascending in creation order.
    pub id: PolicyId,
    /// Globally unique human key.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub effect: Effect,
    /// Higher values are evaluated first. Not unique.
    pub priority: i32,
    /// `None` applies to every resource type.
    #[serde(default)]
    pub resource_type: Option<ResourceType>,
    /// `None` is a global policy that applies across tenants.
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    pub is_active: bool,
    /// Ordered; all must match. Empty matches unconditionally.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Returns `true` if this policy is in scope for the tenant and resource type:
    /// global or same-tenant, and type-agnostic or same-type.
    pub fn applies_to(&self, tenant_id: Option<TenantId>, resource_type: &ResourceType) -> bool {
        let tenant_ok = self.tenant_id.is_none() || self.tenant_id == tenant_id;
        let type_ok = self
            .resource_type
            .as_ref()
            .is_none_or(|rt| rt == resource_type);
        tenant_ok && type_ok
    }

    /// Materializes an unsaved policy with an assigned id.
    pub fn from_new(id: PolicyId, new: NewPolicy, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            description: new.description,
            effect: new.effect,
            priority: new.priority,
            resource_type: new.resource_type,
            tenant_id: new.tenant_id,
            is_active: new.is_active,
            conditions: new.conditions,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A policy that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPolicy {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub effect: Effect,
    pub priority: i32,
    #[serde(default)]
    pub resource_type: Option<ResourceType>,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

fn default_active() -> bool {
    true
}

impl NewPolicy {
    /// Creates an active, global, type-agnostic policy with no conditions.
    pub fn new(name: impl Into<String>, effect: Effect, priority: i32) -> Self {
        Self {
            name: name.into(),
            description: None,
            effect,
            priority,
            resource_type: None,
            tenant_id: None,
            is_active: true,
            conditions: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a condition (builder pattern). Order is preserved.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn for_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    pub fn for_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

// ============================================================================
// Standard Policies
// ============================================================================

/// Returns the baseline policy set for a multi-tenant deployment.
///
/// | Priority | Effect | Rule |
/// |----------|--------|------|
/// | 1000 | allow | superadmins |
/// | 950 | deny | private resources, for everyone but superadmins |
/// | 900 | deny | resources of a tenant the subject is not a member of |
/// | 800 | allow | resource owner |
/// | 700 | allow | group admin, resource in an administered group |
/// | 650 | allow | group admin, resource created by a group member |
/// | 600 | allow | shared access, read |
/// | 590 | allow | shared access at `edit`/`full`, write |
/// | 500 | allow | tenant admin within their tenant |
/// | 0 | deny | fallback |
pub fn standard_policies(roles: &RoleConfig) -> Vec<NewPolicy> {
    let elevated = AttributeValue::from(roles.elevated_group_roles.clone());

    vec![
        NewPolicy::new("superadmin-full-access", Effect::Allow, 1000)
            .with_description("Superadmins may do anything")
            .with_condition(Condition::subject("is_superadmin", Operator::Eq, true)),
        NewPolicy::new("private-resource-deny", Effect::Deny, 950)
            .with_description("Resources created by superadmins are private to superadmins")
            .with_condition(Condition::resource("is_private", Operator::Eq, true))
            .with_condition(Condition::subject("is_superadmin", Operator::Neq, true)),
        NewPolicy::new("cross-tenant-deny", Effect::Deny, 900)
            .with_description("Tenant-scoped resources are invisible outside their tenant")
            .with_condition(Condition::resource(
                "tenant_id",
                Operator::IsNotNull,
                AttributeValue::Null,
            ))
            .with_condition(Condition::subject(
                "tenant_id_matches_resource",
                Operator::Eq,
                false,
            )),
        NewPolicy::new("owner-full-access", Effect::Allow, 800)
            .with_description("Creators and owners may act on their resources")
            .with_condition(Condition::subject("is_resource_owner", Operator::Eq, true)),
        NewPolicy::new("group-admin-access", Effect::Allow, 700)
            .with_description("Group admins may act on resources of groups they administer")
            .with_condition(Condition::subject("dept_role", Operator::In, elevated.clone()))
            .with_condition(Condition::subject(
                "resource_in_admin_group",
                Operator::Eq,
                true,
            )),
        NewPolicy::new("group-admin-member-resources", Effect::Allow, 650)
            .with_description("Group admins may act on resources created by their members")
            .with_condition(Condition::subject("dept_role", Operator::In, elevated))
            .with_condition(Condition::subject(
                "resource_created_by_group_member",
                Operator::Eq,
                true,
            )),
        NewPolicy::new("shared-read-access", Effect::Allow, 600)
            .with_description("Any share grants read access")
            .with_condition(Condition::subject("has_shared_access", Operator::Eq, true))
            .with_condition(Condition::action("type", Operator::Eq, "read")),
        NewPolicy::new("shared-write-access", Effect::Allow, 590)
            .with_description("Edit and full shares grant write access")
            .with_condition(Condition::subject(
                "shared_access_level",
                Operator::In,
                vec!["edit", "full"],
            ))
            .with_condition(Condition::action(
                "type",
                Operator::In,
                vec!["write", "update"],
            )),
        NewPolicy::new("tenant-admin-access", Effect::Allow, 500)
            .with_description("Tenant admins may act on resources of their tenant")
            .with_condition(Condition::subject("is_tenant_admin", Operator::Eq, true))
            .with_condition(Condition::subject(
                "tenant_id_matches_resource",
                Operator::Eq,
                true,
            )),
        NewPolicy::new("default-deny", Effect::Deny, 0)
            .with_description("Fallback when nothing else matched"),
    ]
}

// ============================================================================
// Tests
// ============================================================================
