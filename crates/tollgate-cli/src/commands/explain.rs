//! Full check against fixture data, without auditing.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tollgate_abac::audit::TracingAuditSink;
use tollgate_abac::memory::{Fixtures, InMemoryResourceProvider};
use tollgate_abac::store::InMemoryPolicyStore;
use tollgate_abac::{AccessRequest, Authorizer, Explanation, Namespace, Subject};
use tollgate_config::TollgateConfig;
use tollgate_types::{ResourceId, ResourceType, SubjectId, TenantId};

use super::policies::{load_policy_file, materialize};
use super::{DecisionFormat, effect_label, read_json};

/// On-disk shape of an access request.
#[derive(Debug, Deserialize)]
struct RequestFile {
    subject_id: SubjectId,
    #[serde(default)]
    role: Option<String>,
    resource_type: ResourceType,
    #[serde(default)]
    resource_id: Option<ResourceId>,
    action: String,
    #[serde(default)]
    tenant_id: Option<TenantId>,
    #[serde(default)]
    environment: Namespace,
}

impl From<RequestFile> for AccessRequest {
    fn from(file: RequestFile) -> Self {
        let mut subject = Subject::new(file.subject_id);
        subject.role = file.role;

        let mut request = AccessRequest::new(subject, file.resource_type, file.action);
        request.resource_id = file.resource_id;
        request.tenant_id = file.tenant_id;
        request.environment = file.environment;
        request
    }
}

pub fn run(
    policies: &Path,
    fixtures: &Path,
    request: &Path,
    project: &Path,
    format: DecisionFormat,
) -> Result<()> {
    let config =
        TollgateConfig::load_from_dir(project).context("Failed to load configuration")?;
    let policies = materialize(load_policy_file(policies)?);
    let fixtures: Fixtures = read_json(fixtures)?;
    let request: AccessRequest = read_json::<RequestFile>(request)?.into();

    let store = InMemoryPolicyStore::from_policies(policies).context("Invalid policy set")?;
    let authorizer = Authorizer::with_config(
        Arc::new(InMemoryResourceProvider::from_fixtures(fixtures)),
        Arc::new(store),
        Arc::new(TracingAuditSink),
        &config,
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let explanation = runtime
        .block_on(authorizer.explain(&request))
        .context("Authorization check failed")?;

    match format {
        DecisionFormat::Json => println!("{}", serde_json::to_string_pretty(&explanation)?),
        DecisionFormat::Text => print_explanation(&explanation)?,
    }
    Ok(())
}

fn print_explanation(explanation: &Explanation) -> Result<()> {
    let decision = &explanation.decision;
    println!("Decision: {}", effect_label(decision.effect));
    match (&decision.matched_policy_name, decision.matched_policy_id) {
        (Some(name), Some(id)) => println!("Policy:   {name} (#{id})"),
        _ => println!("Policy:   none (default deny)"),
    }
    println!("Reason:   {}", decision.reason);
    println!("Elapsed:  {:?}", decision.elapsed);
    println!();

    let considered: Vec<String> = explanation
        .considered
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("Considered (in order): {}", considered.join(", "));
    println!();

    println!("Context:");
    println!("{}", serde_json::to_string_pretty(&explanation.context)?);
    Ok(())
}
