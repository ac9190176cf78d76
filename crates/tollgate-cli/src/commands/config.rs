//! Configuration management commands.

use std::path::Path;

use anyhow::{Context, Result};
use tollgate_config::{ConfigLoader, TollgateConfig};

use super::ConfigFormat;

/// Show the effective configuration.
pub fn show(project: &Path, format: ConfigFormat) -> Result<()> {
    let config =
        TollgateConfig::load_from_dir(project).context("Failed to load configuration")?;

    match format {
        ConfigFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        ConfigFormat::Toml => println!("{}", toml::to_string_pretty(&config)?),
        ConfigFormat::Text => {
            println!("Tollgate Configuration");
            println!("======================\n");

            let sources = ConfigLoader::new().with_project_dir(project).sources();
            let present = sources.present();
            if present.is_empty() {
                println!("Sources: defaults");
            } else {
                println!("Sources (lowest precedence first):");
                for path in present {
                    println!("  {}", path.display());
                }
            }
            println!();

            println!("Authorization:");
            println!(
                "  Check timeout: {}",
                config
                    .authorization
                    .check_timeout_ms
                    .map_or("none".to_string(), |ms| format!("{ms} ms"))
            );
            println!("  Audit timeout: {} ms", config.authorization.audit_timeout_ms);
            println!();

            println!("Policy cache:");
            println!("  Enabled: {}", config.policy_cache.enabled);
            println!(
                "  TTL: {}",
                config
                    .policy_cache
                    .ttl_secs
                    .map_or("until invalidated".to_string(), |s| format!("{s} s"))
            );
            println!();

            println!("Roles:");
            println!("  Superadmin: {}", config.roles.superadmin_role);
            println!("  Tenant owner: {}", config.roles.tenant_owner_role);
            println!("  Tenant admins: {}", config.roles.tenant_admin_roles.join(", "));
            println!(
                "  Elevated group roles: {}",
                config.roles.elevated_group_roles.join(", ")
            );
            println!();

            println!("Business hours (UTC):");
            println!(
                "  {:02}:00 - {:02}:00",
                config.business_hours.start_hour, config.business_hours.end_hour
            );
            println!("  Weekdays only: {}", config.business_hours.weekdays_only);
        }
    }

    Ok(())
}

/// Validate configuration files.
pub fn validate(project: &Path) -> Result<()> {
    println!("Validating configuration in {}...", project.display());

    match TollgateConfig::load_from_dir(project) {
        Ok(_) => {
            println!("✓ Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration validation failed:");
            println!("  {e:#}");
            Err(e)
        }
    }
}
