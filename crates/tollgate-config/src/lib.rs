//! Configuration management for Tollgate
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (TOLLGATE_* prefix, highest precedence)
//! 2. tollgate.local.toml (gitignored, local overrides)
//! 3. tollgate.toml (git-tracked, project config)
//! 4. ~/.config/tollgate/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::{ConfigLoader, ConfigSources, LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE};

/// Why a configuration could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not valid TOML: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main Tollgate configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TollgateConfig {
    pub authorization: AuthorizationConfig,
    pub policy_cache: PolicyCacheConfig,
    pub roles: RoleConfig,
    pub business_hours: BusinessHoursConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Upper bound for a single check, including provider I/O. `None` disables it.
    pub check_timeout_ms: Option<u64>,
    /// Upper bound for writing one check's audit entries. Always enforced.
    pub audit_timeout_ms: u64,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            check_timeout_ms: Some(5_000),
            audit_timeout_ms: 1_000,
        }
    }
}

impl AuthorizationConfig {
    pub fn check_timeout(&self) -> Option<Duration> {
        self.check_timeout_ms.map(Duration::from_millis)
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyCacheConfig {
    pub enabled: bool,
    /// Entries expire after this many seconds; `None` keeps them until invalidated.
    pub ttl_secs: Option<u64>,
}

impl Default for PolicyCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: None,
        }
    }
}

impl PolicyCacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Role names the context builder derives boolean facts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    /// Highest-privilege subject role. Drives `is_superadmin` and `is_private`.
    pub superadmin_role: String,
    pub tenant_owner_role: String,
    /// Tenant roles that count as `is_tenant_admin`.
    pub tenant_admin_roles: Vec<String>,
    /// Group roles that make a subject an administrator of the group.
    /// The first match in membership order becomes `dept_role`.
    pub elevated_group_roles: Vec<String>,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            superadmin_role: "superadmin".to_string(),
            tenant_owner_role: "owner".to_string(),
            tenant_admin_roles: vec!["owner".to_string(), "admin".to_string()],
            elevated_group_roles: vec!["lead".to_string(), "sub_admin".to_string()],
        }
    }
}

/// Business-hours window, evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessHoursConfig {
    pub start_hour: u32,
    /// Exclusive.
    pub end_hour: u32,
    pub weekdays_only: bool,
}

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            weekdays_only: true,
        }
    }
}

impl TollgateConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML file, without merging other sources.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TollgateConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let hours = &self.business_hours;
        if hours.start_hour > 24 || hours.end_hour > 24 {
            return Err(ConfigError::Invalid(format!(
                "business hours must be within 0..=24, got {}..{}",
                hours.start_hour, hours.end_hour
            )));
        }
        if hours.start_hour >= hours.end_hour {
            return Err(ConfigError::Invalid(format!(
                "business_hours.start_hour ({}) must be before end_hour ({})",
                hours.start_hour, hours.end_hour
            )));
        }
        if self.authorization.audit_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "authorization.audit_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.roles.superadmin_role.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "roles.superadmin_role must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = TollgateConfig::default();
        assert_eq!(
            config.authorization.check_timeout(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(config.authorization.audit_timeout(), Duration::from_secs(1));
        assert!(config.policy_cache.enabled);
        assert_eq!(config.policy_cache.ttl(), None);
        assert_eq!(config.roles.superadmin_role, "superadmin");
        assert_eq!(config.roles.elevated_group_roles, vec!["lead", "sub_admin"]);
        assert_eq!(config.business_hours.start_hour, 9);
        assert_eq!(config.business_hours.end_hour, 18);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_business_hours() {
        let mut config = TollgateConfig::default();
        config.business_hours.start_hour = 18;
        config.business_hours.end_hour = 9;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_hours() {
        let mut config = TollgateConfig::default();
        config.business_hours.end_hour = 25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_audit_timeout() {
        let mut config = TollgateConfig::default();
        config.authorization.audit_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("audit_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_empty_superadmin_role() {
        let mut config = TollgateConfig::default();
        config.roles.superadmin_role = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[authorization]
check_timeout_ms = 250

[roles]
elevated_group_roles = ["head"]
"#,
        )
        .expect("Failed to write config");

        let config = TollgateConfig::from_toml_file(&path).expect("Failed to load config");
        assert_eq!(config.authorization.check_timeout_ms, Some(250));
        assert_eq!(config.roles.elevated_group_roles, vec!["head"]);
        // Untouched sections keep their defaults
        assert_eq!(config.roles.superadmin_role, "superadmin");
    }

    #[test]
    fn test_from_toml_file_missing() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let err = TollgateConfig::from_toml_file(temp_dir.path().join("nope.toml"))
            .expect_err("missing file must fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_from_toml_file_malformed() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "[roles\nsuperadmin_role = ").expect("Failed to write config");

        let err = TollgateConfig::from_toml_file(&path).expect_err("malformed file must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
