//! Configuration loader with multi-source merging

use crate::TollgateConfig;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::env;
use std::path::{Path, PathBuf};

/// Git-tracked project configuration.
pub const PROJECT_CONFIG_FILE: &str = "tollgate.toml";

/// Untracked per-checkout overrides of [`PROJECT_CONFIG_FILE`].
pub const LOCAL_CONFIG_FILE: &str = "tollgate.local.toml";

/// The TOML files a load may read, lowest precedence first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSources {
    /// `~/.config/tollgate/config.toml`, when the platform has a config dir.
    pub user: Option<PathBuf>,
    pub project: PathBuf,
    pub local: PathBuf,
}

impl ConfigSources {
    /// Sources for `project_dir`, including the user's config file.
    pub fn discover(project_dir: impl AsRef<Path>) -> Self {
        let user = ProjectDirs::from("", "", "tollgate")
            .map(|dirs| dirs.config_dir().join("config.toml"));
        Self {
            user,
            ..Self::project_only(project_dir)
        }
    }

    /// Sources for `project_dir` alone.
    pub fn project_only(project_dir: impl AsRef<Path>) -> Self {
        let dir = project_dir.as_ref();
        Self {
            user: None,
            project: dir.join(PROJECT_CONFIG_FILE),
            local: dir.join(LOCAL_CONFIG_FILE),
        }
    }

    /// Files that exist on disk, lowest precedence first.
    pub fn present(&self) -> Vec<&Path> {
        self.user
            .iter()
            .chain([&self.project, &self.local])
            .map(PathBuf::as_path)
            .filter(|path| path.is_file())
            .collect()
    }
}

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "TOLLGATE".to_string(),
            include_user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "TOLLGATE")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/tollgate/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// The files [`ConfigLoader::load`] would read.
    pub fn sources(&self) -> ConfigSources {
        if self.include_user_config {
            ConfigSources::discover(&self.project_dir)
        } else {
            ConfigSources::project_only(&self.project_dir)
        }
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<TollgateConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = TollgateConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2-4. User, project, then local TOML files
        for path in self.sources().present() {
            builder = builder.add_source(
                config::File::from(path.to_path_buf())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (TOLLGATE_SECTION__KEY). Keys contain
        // underscores, so nesting uses a double underscore.
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let tollgate_config: TollgateConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        tollgate_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(tollgate_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> TollgateConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
