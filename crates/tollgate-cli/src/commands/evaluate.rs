//! Offline evaluation of a policy set against a context file.

use std::path::Path;

use anyhow::Result;
use tollgate_abac::{AttributeContext, Decision, evaluate};

use super::policies::{load_policy_file, materialize};
use super::{DecisionFormat, effect_label, read_json};

pub fn run(policies: &Path, context: &Path, format: DecisionFormat) -> Result<()> {
    let policies = materialize(load_policy_file(policies)?);
    let context: AttributeContext = read_json(context)?;

    let decision = evaluate(&policies, &context);

    match format {
        DecisionFormat::Json => {
            let json = serde_json::json!({
                "effect": decision.effect,
                "matched_policy_id": decision.matched_policy_id,
                "matched_policy_name": decision.matched_policy_name,
                "reason": decision.reason,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        DecisionFormat::Text => print_decision(&decision),
    }
    Ok(())
}

fn print_decision(decision: &Decision) {
    println!("Decision: {}", effect_label(decision.effect));
    match (&decision.matched_policy_name, decision.matched_policy_id) {
        (Some(name), Some(id)) => println!("Policy:   {name} (#{id})"),
        _ => println!("Policy:   none (default deny)"),
    }
    println!("Reason:   {}", decision.reason);
}
