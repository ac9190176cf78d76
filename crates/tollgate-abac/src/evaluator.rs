//! ABAC policy evaluation engine.
//!
//! Evaluates an attribute context against a policy set. Inactive policies
//! are skipped; the rest are ordered by priority (highest first) with ties
//! broken by ascending policy id. The first policy whose conditions all
//! match wins. If none match, the decision is deny with no matched policy.
//!
//! Evaluation is pure and never fails: a condition that cannot be compared
//! (type mismatch, unordered values) is logged and counts as a non-match.

use std::cmp::{Ordering, Reverse};

use thiserror::Error;
use tollgate_types::PolicyId;
use tracing::{debug, warn};

use crate::attributes::{AttributeContext, AttributeValue};
use crate::policy::{Condition, Effect, Operator, Policy};

static NULL: AttributeValue = AttributeValue::Null;

// ============================================================================
// Decision
// ============================================================================

/// The result of evaluating a context against a policy set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether access is allowed or denied.
    pub effect: Effect,
    /// The policy that matched, or `None` for the default deny.
    pub matched_policy_id: Option<PolicyId>,
    pub matched_policy_name: Option<String>,
    /// Human-readable explanation of why this decision was made.
    pub reason: String,
}

impl Decision {
    fn matched(policy: &Policy) -> Self {
        Self {
            effect: policy.effect,
            matched_policy_id: Some(policy.id),
            matched_policy_name: Some(policy.name.clone()),
            reason: format!(
                "Matched policy '{}' (id {}, priority {})",
                policy.name, policy.id, policy.priority
            ),
        }
    }

    /// The terminal outcome when no active policy matched.
    pub fn default_deny() -> Self {
        Self {
            effect: Effect::Deny,
            matched_policy_id: None,
            matched_policy_name: None,
            reason: "No policy matched; default deny".to_string(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }
}

// ============================================================================
// Condition errors
// ============================================================================

/// Why a condition could not be evaluated. Never escapes this module: the
/// condition is treated as a non-match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("cannot order {actual} against {expected}")]
    Unordered {
        actual: &'static str,
        expected: &'static str,
    },

    #[error("cannot test whether {container} contains {needle}")]
    Containment {
        container: &'static str,
        needle: &'static str,
    },
}

// ============================================================================
// Public API
// ============================================================================

/// Returns the active policies in evaluation order.
///
/// Priority descending, then id ascending. The order is total because ids
/// are unique.
pub fn evaluation_order(policies: &[Policy]) -> Vec<&Policy> {
    let mut ordered: Vec<&Policy> = policies.iter().filter(|p| p.is_active).collect();
    ordered.sort_by_key(|p| (Reverse(p.priority), p.id));
    ordered
}

/// Evaluates a context against a policy set.
///
/// # Postcondition
///
/// Always returns a `Decision`. With no matching policy the effect is
/// `Deny` and `matched_policy_id` is `None`.
pub fn evaluate(policies: &[Policy], context: &AttributeContext) -> Decision {
    for policy in evaluation_order(policies) {
        if policy_matches(policy, context) {
            debug!(
                policy_id = %policy.id,
                policy = %policy.name,
                priority = policy.priority,
                effect = %policy.effect,
                "Policy matched"
            );
            return Decision::matched(policy);
        }
    }

    debug!(candidates = policies.len(), "No policy matched; default deny");
    Decision::default_deny()
}

/// Evaluates the same policy set against independent contexts.
///
/// Element `i` of the result equals `evaluate(policies, &contexts[i])`.
pub fn evaluate_batch(policies: &[Policy], contexts: &[AttributeContext]) -> Vec<Decision> {
    contexts
        .iter()
        .map(|context| evaluate(policies, context))
        .collect()
}

/// Returns `true` if every condition of the policy matches. Empty matches.
pub fn policy_matches(policy: &Policy, context: &AttributeContext) -> bool {
    policy
        .conditions
        .iter()
        .all(|condition| match_condition(condition, context))
}

/// Evaluates one condition. Comparison errors are logged and count as a non-match.
pub fn match_condition(condition: &Condition, context: &AttributeContext) -> bool {
    let actual = context
        .get(condition.attribute_type, &condition.attribute_name)
        .unwrap_or(&NULL);

    match compare(condition.operator, actual, &condition.value) {
        Ok(matched) => matched,
        Err(err) => {
            warn!(
                condition = %condition,
                actual = actual.kind(),
                error = %err,
                "Condition evaluation failed; treating as non-match"
            );
            false
        }
    }
}

// ============================================================================
// Operators
// ============================================================================

fn compare(
    operator: Operator,
    actual: &AttributeValue,
    expected: &AttributeValue,
) -> Result<bool, ConditionError> {
    match operator {
        Operator::Eq => Ok(actual.loose_eq(expected)),
        Operator::Neq => Ok(!actual.loose_eq(expected)),

        // Malformed (non-list) `in` never matches; malformed `not_in` always does.
        Operator::In => Ok(expected
            .as_list()
            .is_some_and(|items| items.iter().any(|item| item.loose_eq(actual)))),
        Operator::NotIn => Ok(expected
            .as_list()
            .is_none_or(|items| !items.iter().any(|item| item.loose_eq(actual)))),

        Operator::Gt => ordered(actual, expected, Ordering::is_gt),
        Operator::Lt => ordered(actual, expected, Ordering::is_lt),
        Operator::Gte => ordered(actual, expected, Ordering::is_ge),
        Operator::Lte => ordered(actual, expected, Ordering::is_le),

        Operator::Contains => Ok(contains(actual, expected)?.unwrap_or(false)),
        Operator::NotContains => Ok(contains(actual, expected)?.is_none_or(|found| !found)),

        Operator::IsNull => Ok(actual.is_null()),
        Operator::IsNotNull => Ok(!actual.is_null()),
    }
}

/// Ordering comparison. A null `actual` is always `false`.
fn ordered(
    actual: &AttributeValue,
    expected: &AttributeValue,
    accept: fn(Ordering) -> bool,
) -> Result<bool, ConditionError> {
    let ordering = match (actual, expected) {
        (AttributeValue::Null, _) => return Ok(false),
        (AttributeValue::String(a), AttributeValue::String(b)) => Some(a.cmp(b)),
        (AttributeValue::Bool(a), AttributeValue::Bool(b)) => Some(a.cmp(b)),
        _ => match (actual.as_f64(), expected.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };

    ordering.map(accept).ok_or(ConditionError::Unordered {
        actual: actual.kind(),
        expected: expected.kind(),
    })
}

/// Membership test for `contains` / `not_contains`.
///
/// `None` when `actual` is neither a list nor a string.
fn contains(
    actual: &AttributeValue,
    expected: &AttributeValue,
) -> Result<Option<bool>, ConditionError> {
    match actual {
        AttributeValue::List(items) => Ok(Some(items.iter().any(|item| item.loose_eq(expected)))),
        AttributeValue::String(haystack) => match expected {
            AttributeValue::String(needle) => Ok(Some(haystack.contains(needle.as_str()))),
            other => Err(ConditionError::Containment {
                container: "string",
                needle: other.kind(),
            }),
        },
        _ => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================
