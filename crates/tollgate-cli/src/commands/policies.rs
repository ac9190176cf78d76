//! Policy set commands.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use comfy_table::Table;
use serde::{Deserialize, Serialize};
use tollgate_abac::evaluator::evaluation_order;
use tollgate_abac::{NewPolicy, Policy, standard_policies};
use tollgate_config::TollgateConfig;
use tollgate_types::PolicyId;

use super::PolicyFormat;

/// TOML needs a table at the root.
#[derive(Debug, Serialize, Deserialize)]
struct PolicyFile {
    policies: Vec<NewPolicy>,
}

/// Loads a policy file. `.toml` files hold a `[[policies]]` array; anything
/// else is read as a JSON array.
pub fn load_policy_file(path: &Path) -> Result<Vec<NewPolicy>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let policies = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str::<PolicyFile>(&content)
            .with_context(|| format!("Invalid TOML policy file {}", path.display()))?
            .policies
    } else {
        serde_json::from_str::<Vec<NewPolicy>>(&content)
            .with_context(|| format!("Invalid JSON policy file {}", path.display()))?
    };

    let mut seen = HashSet::new();
    for policy in &policies {
        if !seen.insert(policy.name.as_str()) {
            bail!("Duplicate policy name '{}' in {}", policy.name, path.display());
        }
    }
    Ok(policies)
}

/// Assigns ids in file order, the way a store would on first import.
pub fn materialize(policies: Vec<NewPolicy>) -> Vec<Policy> {
    let now = Utc::now();
    policies
        .into_iter()
        .zip(1..)
        .map(|(policy, id)| Policy::from_new(PolicyId::new(id), policy, now))
        .collect()
}

/// Print the standard policy set.
pub fn standard(project: &Path, format: PolicyFormat) -> Result<()> {
    let config =
        TollgateConfig::load_from_dir(project).context("Failed to load configuration")?;
    let policies = standard_policies(&config.roles);

    match format {
        PolicyFormat::Json => println!("{}", serde_json::to_string_pretty(&policies)?),
        PolicyFormat::Toml => println!("{}", toml::to_string_pretty(&PolicyFile { policies })?),
        PolicyFormat::Text => print_table(&materialize(policies)),
    }
    Ok(())
}

/// Check a policy file and list its policies in evaluation order.
/// Inactive policies follow, marked as such.
pub fn validate(file: &Path) -> Result<()> {
    let policies = materialize(load_policy_file(file)?);
    print_table(&policies);

    let active = policies.iter().filter(|p| p.is_active).count();
    println!();
    println!(
        "✓ {} policies ({active} active, {} inactive), names unique",
        policies.len(),
        policies.len() - active
    );
    Ok(())
}

fn print_table(policies: &[Policy]) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Priority", "Effect", "Name", "Scope", "Conditions"]);

    let inactive = policies.iter().filter(|p| !p.is_active);
    for policy in evaluation_order(policies).into_iter().chain(inactive) {
        let scope = match (&policy.resource_type, policy.tenant_id) {
            (None, None) => "global".to_string(),
            (Some(rt), None) => rt.to_string(),
            (None, Some(tenant)) => format!("tenant {tenant}"),
            (Some(rt), Some(tenant)) => format!("{rt} in tenant {tenant}"),
        };
        let conditions = if policy.conditions.is_empty() {
            "(always)".to_string()
        } else {
            policy
                .conditions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\nAND ")
        };
        table.add_row(vec![
            policy.id.to_string(),
            policy.priority.to_string(),
            if policy.is_active {
                policy.effect.to_string()
            } else {
                format!("{} (inactive)", policy.effect)
            },
            policy.name.clone(),
            scope,
            conditions,
        ]);
    }

    println!("{table}");
}
