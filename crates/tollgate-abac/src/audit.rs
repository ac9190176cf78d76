//! Access audit log.
//!
//! Every completed check produces exactly one [`AccessLogEntry`]. Entries are
//! write-only from the engine's point of view; persistence and retention
//! belong to the [`AuditSink`].
//!
//! A failing or stalled sink never changes or holds up a decision.
//! [`AuditRecorder`] bounds every write, logs the failure and moves on.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_types::{PolicyId, ResourceId, ResourceType, SubjectId};
use tracing::{error, info};
use uuid::Uuid;

use crate::policy::Effect;
use crate::provider::{self, ProviderError};

/// One audited access check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub id: Uuid,
    pub subject_id: Option<SubjectId>,
    pub action: String,
    pub resource_type: ResourceType,
    pub resource_id: Option<ResourceId>,
    pub decision: Effect,
    pub matched_policy_id: Option<PolicyId>,
    /// Serialized attribute context the decision was made against.
    pub context_snapshot: serde_json::Value,
    /// Time spent building the context and evaluating.
    #[serde(with = "duration_micros")]
    pub processing_time: Duration,
    pub created_at: DateTime<Utc>,
}

impl AccessLogEntry {
    /// Creates an entry stamped with a fresh id and the current time.
    pub fn new(
        subject_id: Option<SubjectId>,
        action: impl Into<String>,
        resource_type: ResourceType,
        resource_id: Option<ResourceId>,
        decision: Effect,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            action: action.into(),
            resource_type,
            resource_id,
            decision,
            matched_policy_id: None,
            context_snapshot: serde_json::Value::Null,
            processing_time: Duration::ZERO,
            created_at: Utc::now(),
        }
    }

    pub fn with_matched_policy(mut self, policy_id: Option<PolicyId>) -> Self {
        self.matched_policy_id = policy_id;
        self
    }

    pub fn with_snapshot(mut self, snapshot: serde_json::Value) -> Self {
        self.context_snapshot = snapshot;
        self
    }

    pub fn with_processing_time(mut self, elapsed: Duration) -> Self {
        self.processing_time = elapsed;
        self
    }
}

pub(crate) mod duration_micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        serializer.serialize_u64(micros)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_micros)
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AccessLogEntry) -> provider::Result<()>;
}

/// Writes entries to the sink, swallowing sink failures and stalls.
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl AuditRecorder {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Gives up on a write after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Appends `entry`. Returns `false` if the sink rejected it or timed out.
    pub async fn record(&self, entry: AccessLogEntry) -> bool {
        self.record_all(vec![entry]).await == 1
    }

    /// Appends `entries` in order under a single timeout and returns how many
    /// were written. Entries after a rejected one are still attempted.
    pub async fn record_all(&self, entries: Vec<AccessLogEntry>) -> usize {
        let total = entries.len();
        let mut written = 0;
        let writes = async {
            for entry in entries {
                let entry_id = entry.id;
                match self.sink.append(entry).await {
                    Ok(()) => written += 1,
                    Err(e) => {
                        error!(entry_id = %entry_id, error = %e, "Failed to write access log entry");
                    }
                }
            }
        };

        if tokio::time::timeout(self.timeout, writes).await.is_err() {
            error!(
                timeout = ?self.timeout,
                dropped = total - written,
                "Timed out writing access log entries"
            );
        }
        written
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Collects entries in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: Mutex<Vec<AccessLogEntry>>,
    failing: Mutex<bool>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every append fails with [`ProviderError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    /// Copy of every entry appended so far, oldest first.
    pub fn entries(&self) -> Vec<AccessLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: AccessLogEntry) -> provider::Result<()> {
        let failing = self
            .failing
            .lock()
            .map_err(|_| ProviderError::Backend("audit sink lock poisoned".to_string()))?;
        if *failing {
            return Err(ProviderError::Unavailable {
                collaborator: "audit sink",
                reason: "simulated outage".to_string(),
            });
        }
        drop(failing);

        self.entries
            .lock()
            .map_err(|_| ProviderError::Backend("audit sink lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}

/// Emits each entry as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, entry: AccessLogEntry) -> provider::Result<()> {
        info!(
            target: "tollgate::audit",
            entry_id = %entry.id,
            subject_id = ?entry.subject_id.map(|id| id.as_u64()),
            action = %entry.action,
            resource_type = %entry.resource_type,
            resource_id = ?entry.resource_id.map(|id| id.as_u64()),
            decision = %entry.decision,
            matched_policy_id = ?entry.matched_policy_id.map(|id| id.as_u64()),
            processing_time_us = u64::try_from(entry.processing_time.as_micros()).unwrap_or(u64::MAX),
            "Access checked"
        );
        Ok(())
    }
}
