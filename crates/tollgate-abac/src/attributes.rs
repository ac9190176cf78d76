//! Attribute types for ABAC evaluation.
//!
//! Every check works on a flat [`AttributeContext`] split into four
//! namespaces, addressed by conditions as `namespace.key`:
//! - **subject**: who is asking (role, tenant and group memberships, derived facts)
//! - **resource**: what is being accessed (type, id, ownership, group, overrides)
//! - **action**: what is being attempted (`type`)
//! - **environment**: when (timestamp, hour, weekday, business hours)

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tollgate_config::BusinessHoursConfig;

// ============================================================================
// Attribute Type
// ============================================================================

/// The namespace a condition reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Subject,
    Resource,
    Action,
    Environment,
}

impl AttributeType {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeType::Subject => "subject",
            AttributeType::Resource => "resource",
            AttributeType::Action => "action",
            AttributeType::Environment => "environment",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Attribute Value
// ============================================================================

/// A typed attribute value.
///
/// Serialized untagged, so `["lead", "sub_admin"]`, `true`, `42` and `null`
/// read and write as plain JSON in policies and audit snapshots.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric view used by ordering comparisons. Booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Short type label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
            AttributeValue::String(_) => "string",
            AttributeValue::List(_) => "list",
            AttributeValue::Map(_) => "map",
        }
    }

    /// Value equality as conditions see it.
    ///
    /// Integers and floats compare numerically (`1 == 1.0`); every other
    /// pairing of different kinds is unequal. `Null` equals `Null`.
    pub fn loose_eq(&self, other: &AttributeValue) -> bool {
        use AttributeValue::{Float, Int, List, Map};

        match (self, other) {
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (List(a), List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y)),
            (Map(a), Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.loose_eq(other)))
            }
            _ => self == other,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(i64::from(value))
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Int(i64::from(value))
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(AttributeValue::Float(value as f64), AttributeValue::Int)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(AttributeValue::Null, Into::into)
    }
}

impl From<BTreeMap<String, AttributeValue>> for AttributeValue {
    fn from(map: BTreeMap<String, AttributeValue>) -> Self {
        AttributeValue::Map(map)
    }
}

// ============================================================================
// Namespace
// ============================================================================

/// A string-keyed bag of attribute values. Keys iterate in sorted order so
/// snapshots are deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(BTreeMap<String, AttributeValue>);

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder form of [`Namespace::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns `true` when the key holds `Bool(true)`. Absent keys are `false`.
    pub fn is_true(&self, key: &str) -> bool {
        self.get(key).and_then(AttributeValue::as_bool) == Some(true)
    }

    /// Merges `other` into `self`; `other` wins on key collision.
    pub fn merge(&mut self, other: Namespace) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for Namespace {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ============================================================================
// Attribute Context
// ============================================================================

/// The per-check fact set every condition is evaluated against.
///
/// Created fresh for each check and discarded afterwards; only its JSON
/// snapshot survives, inside the audit entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeContext {
    pub subject: Namespace,
    pub resource: Namespace,
    pub action: Namespace,
    pub environment: Namespace,
}

impl AttributeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&self, attribute_type: AttributeType) -> &Namespace {
        match attribute_type {
            AttributeType::Subject => &self.subject,
            AttributeType::Resource => &self.resource,
            AttributeType::Action => &self.action,
            AttributeType::Environment => &self.environment,
        }
    }

    pub fn namespace_mut(&mut self, attribute_type: AttributeType) -> &mut Namespace {
        match attribute_type {
            AttributeType::Subject => &mut self.subject,
            AttributeType::Resource => &mut self.resource,
            AttributeType::Action => &mut self.action,
            AttributeType::Environment => &mut self.environment,
        }
    }

    /// Looks up `attribute_type.name`. Absent keys are `None`.
    pub fn get(&self, attribute_type: AttributeType, name: &str) -> Option<&AttributeValue> {
        self.namespace(attribute_type).get(name)
    }

    /// Sets a single attribute (builder pattern).
    pub fn with(
        mut self,
        attribute_type: AttributeType,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.namespace_mut(attribute_type).insert(name, value);
        self
    }

    pub fn with_subject(self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.with(AttributeType::Subject, name, value)
    }

    pub fn with_resource(self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.with(AttributeType::Resource, name, value)
    }

    pub fn with_action(self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.with(AttributeType::Action, name, value)
    }

    pub fn with_environment(
        self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.with(AttributeType::Environment, name, value)
    }

    /// Serializes the context for the audit trail.
    pub fn snapshot(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

// ============================================================================
// Environment Attributes
// ============================================================================

/// Computes the environment namespace for a request made at `ts`.
///
/// Keys: `timestamp` (RFC 3339), `hour` (0-23), `day_of_week` (0 = Monday),
/// `is_business_hours`. Hours are UTC.
pub fn environment_at(ts: DateTime<Utc>, hours: &BusinessHoursConfig) -> Namespace {
    let hour = ts.hour();
    let weekday = ts.weekday();
    let is_weekday = weekday.num_days_from_monday() < 5;
    let in_window = (hours.start_hour..hours.end_hour).contains(&hour);
    let is_business_hours = in_window && (is_weekday || !hours.weekdays_only);

    Namespace::new()
        .with("timestamp", ts.to_rfc3339())
        .with("hour", hour)
        .with("day_of_week", weekday.num_days_from_monday())
        .with("is_business_hours", is_business_hours)
}

// ============================================================================
// Tests
// ============================================================================
