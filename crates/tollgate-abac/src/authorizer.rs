//! Authorization façade.
//!
//! [`Authorizer`] is the one entry point calling code uses. A check runs
//! build context → load applicable policies → evaluate → audit, and
//! returns an [`AccessDecision`].
//!
//! Infrastructure failures (provider or policy store unavailable, timeout)
//! surface as [`AuthzError`]. Callers must treat an error as deny. The check
//! is still audited exactly once, as a deny with no matched policy.
//!
//! Audit writes have their own bound (`authorization.audit_timeout_ms`), so a
//! stalled sink delays a check by at most that long.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tollgate_config::{BusinessHoursConfig, RoleConfig, TollgateConfig};
use tollgate_types::{PolicyId, ResourceId};
use tracing::{info, instrument, warn};

use crate::attributes::AttributeContext;
use crate::audit::{AccessLogEntry, AuditRecorder, AuditSink, duration_micros};
use crate::builder::{AccessRequest, ContextBuilder};
use crate::evaluator::{self, Decision};
use crate::policy::{Effect, Policy};
use crate::provider::{ProviderError, ResourceProvider};
use crate::store::PolicyStore;

/// Errors that abort a check before a decision is reached.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("authorization check timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for authorization checks.
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Outcome of a completed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub effect: Effect,
    pub matched_policy_id: Option<PolicyId>,
    pub matched_policy_name: Option<String>,
    pub reason: String,
    /// Time spent building the context and evaluating.
    #[serde(rename = "elapsed_us", with = "duration_micros")]
    pub elapsed: Duration,
}

impl AccessDecision {
    fn from_decision(decision: Decision, elapsed: Duration) -> Self {
        Self {
            effect: decision.effect,
            matched_policy_id: decision.matched_policy_id,
            matched_policy_name: decision.matched_policy_name,
            reason: decision.reason,
            elapsed,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }
}

/// A decision together with the context it was made against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub decision: AccessDecision,
    pub context: AttributeContext,
    /// Active, in-scope policies in evaluation order.
    pub considered: Vec<PolicyId>,
}

/// The authorization façade.
pub struct Authorizer {
    provider: Arc<dyn ResourceProvider>,
    policies: Arc<dyn PolicyStore>,
    audit: AuditRecorder,
    roles: RoleConfig,
    business_hours: BusinessHoursConfig,
    check_timeout: Option<Duration>,
}

impl Authorizer {
    /// Creates an authorizer with default configuration.
    pub fn new(
        provider: Arc<dyn ResourceProvider>,
        policies: Arc<dyn PolicyStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::with_config(provider, policies, audit, &TollgateConfig::default())
    }

    pub fn with_config(
        provider: Arc<dyn ResourceProvider>,
        policies: Arc<dyn PolicyStore>,
        audit: Arc<dyn AuditSink>,
        config: &TollgateConfig,
    ) -> Self {
        Self {
            provider,
            policies,
            audit: AuditRecorder::new(audit).with_timeout(config.authorization.audit_timeout()),
            roles: config.roles.clone(),
            business_hours: config.business_hours,
            check_timeout: config.authorization.check_timeout(),
        }
    }

    /// Decides whether `request` is allowed and records the check.
    #[instrument(
        skip_all,
        fields(
            subject_id = %request.subject.id,
            resource_type = %request.resource_type,
            action = %request.action,
        )
    )]
    pub async fn check(&self, request: &AccessRequest) -> Result<AccessDecision> {
        let started = Instant::now();
        let outcome = self.bounded(self.decide(request)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok((decision, context)) => {
                let decision = AccessDecision::from_decision(decision, elapsed);
                self.audit.record(decided_entry(request, &decision, &context)).await;
                log_decision(request, &decision);
                Ok(decision)
            }
            Err(e) => {
                warn!(error = %e, "Authorization check failed, denying");
                self.audit.record(failed_entry(request, elapsed)).await;
                Err(e)
            }
        }
    }

    /// Checks the same subject and action against many resources.
    ///
    /// Policies are loaded once for the batch. Each resource is audited as
    /// its own check. The result is index-aligned with `resource_ids`.
    #[instrument(
        skip_all,
        fields(
            subject_id = %template.subject.id,
            resource_type = %template.resource_type,
            action = %template.action,
            count = resource_ids.len(),
        )
    )]
    pub async fn check_batch(
        &self,
        template: &AccessRequest,
        resource_ids: &[ResourceId],
    ) -> Result<Vec<AccessDecision>> {
        let requests: Vec<AccessRequest> = resource_ids
            .iter()
            .map(|id| {
                let mut request = template.clone();
                request.resource = None;
                request.resource_id = Some(*id);
                request
            })
            .collect();

        let started = Instant::now();
        let outcome = self.bounded(self.decide_batch(&requests)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(results) => {
                let mut decisions = Vec::with_capacity(results.len());
                let mut entries = Vec::with_capacity(results.len());
                for (request, (decision, context)) in requests.iter().zip(results) {
                    let decision = AccessDecision::from_decision(decision, elapsed);
                    entries.push(decided_entry(request, &decision, &context));
                    decisions.push(decision);
                }
                self.audit.record_all(entries).await;
                info!(
                    allowed = decisions.iter().filter(|d| d.is_allowed()).count(),
                    "Batch check complete"
                );
                Ok(decisions)
            }
            Err(e) => {
                warn!(error = %e, "Batch authorization check failed, denying all");
                let entries = requests
                    .iter()
                    .map(|request| failed_entry(request, elapsed))
                    .collect();
                self.audit.record_all(entries).await;
                Err(e)
            }
        }
    }

    /// Runs a check without auditing and returns the context it used.
    pub async fn explain(&self, request: &AccessRequest) -> Result<Explanation> {
        let started = Instant::now();
        let (policies, context) = self
            .bounded(async {
                let context = self.build_context(request).await?;
                let policies = self.load_policies(request).await?;
                Ok::<_, AuthzError>((policies, context))
            })
            .await?;

        let decision = evaluator::evaluate(&policies, &context);
        let considered = evaluator::evaluation_order(&policies)
            .into_iter()
            .map(|p| p.id)
            .collect();

        Ok(Explanation {
            decision: AccessDecision::from_decision(decision, started.elapsed()),
            context,
            considered,
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn bounded<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        match self.check_timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| AuthzError::Timeout(limit))?,
            None => work.await,
        }
    }

    async fn decide(&self, request: &AccessRequest) -> Result<(Decision, AttributeContext)> {
        let context = self.build_context(request).await?;
        let policies = self.load_policies(request).await?;
        let decision = evaluator::evaluate(&policies, &context);
        Ok((decision, context))
    }

    async fn decide_batch(
        &self,
        requests: &[AccessRequest],
    ) -> Result<Vec<(Decision, AttributeContext)>> {
        let Some(first) = requests.first() else {
            return Ok(Vec::new());
        };
        let policies = self.load_policies(first).await?;

        let mut contexts = Vec::with_capacity(requests.len());
        for request in requests {
            contexts.push(self.build_context(request).await?);
        }

        let decisions = evaluator::evaluate_batch(&policies, &contexts);
        Ok(decisions.into_iter().zip(contexts).collect())
    }

    async fn build_context(&self, request: &AccessRequest) -> Result<AttributeContext> {
        // One builder per check; its lookup cache dies with it.
        let mut builder =
            ContextBuilder::new(self.provider.as_ref(), &self.roles, &self.business_hours);
        Ok(builder.build(request, Utc::now()).await?)
    }

    async fn load_policies(&self, request: &AccessRequest) -> Result<Vec<Policy>> {
        Ok(self
            .policies
            .active_policies(request.tenant_id, &request.resource_type)
            .await?)
    }
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("roles", &self.roles)
            .field("business_hours", &self.business_hours)
            .field("check_timeout", &self.check_timeout)
            .finish_non_exhaustive()
    }
}

fn entry_for(request: &AccessRequest, decision: Effect) -> AccessLogEntry {
    AccessLogEntry::new(
        Some(request.subject.id),
        request.action.as_str(),
        request.resource_type.clone(),
        request.resource_id,
        decision,
    )
}

fn decided_entry(
    request: &AccessRequest,
    decision: &AccessDecision,
    context: &AttributeContext,
) -> AccessLogEntry {
    let snapshot = context.snapshot().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to snapshot attribute context");
        serde_json::Value::Null
    });
    entry_for(request, decision.effect)
        .with_matched_policy(decision.matched_policy_id)
        .with_snapshot(snapshot)
        .with_processing_time(decision.elapsed)
}

fn failed_entry(request: &AccessRequest, elapsed: Duration) -> AccessLogEntry {
    let snapshot = request_context(request)
        .snapshot()
        .unwrap_or(serde_json::Value::Null);
    entry_for(request, Effect::Deny)
        .with_snapshot(snapshot)
        .with_processing_time(elapsed)
}

/// The facts known from the request alone, for auditing failed checks.
fn request_context(request: &AccessRequest) -> AttributeContext {
    let mut context = AttributeContext::new()
        .with_subject("id", request.subject.id.as_u64())
        .with_subject("role", request.subject.role.clone())
        .with_resource("type", request.resource_type.as_str())
        .with_resource("id", request.resource_id.map(|id| id.as_u64()))
        .with_action("type", request.action.as_str());
    context.environment.merge(request.environment.clone());
    context
}

fn log_decision(request: &AccessRequest, decision: &AccessDecision) {
    let policy = decision.matched_policy_name.as_deref().unwrap_or("<none>");
    if decision.is_allowed() {
        info!(
            resource_id = ?request.resource_id.map(|id| id.as_u64()),
            policy,
            elapsed_us = u64::try_from(decision.elapsed.as_micros()).unwrap_or(u64::MAX),
            "Access allowed"
        );
    } else {
        warn!(
            resource_id = ?request.resource_id.map(|id| id.as_u64()),
            policy,
            reason = %decision.reason,
            "Access denied"
        );
    }
}
