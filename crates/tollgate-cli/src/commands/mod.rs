//! CLI command implementations.

pub mod config;
pub mod evaluate;
pub mod explain;
pub mod policies;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use serde::de::DeserializeOwned;
use tollgate_abac::Effect;

/// Output formats for decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecisionFormat {
    Text,
    Json,
}

/// Output formats for policy sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyFormat {
    Json,
    Toml,
    Text,
}

/// Output formats for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Text,
    Json,
    Toml,
}

/// Reads and parses a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// `ALLOW` in green or `DENY` in red, when stdout supports color.
pub fn effect_label(effect: Effect) -> String {
    match effect {
        Effect::Allow => "ALLOW"
            .if_supports_color(Stream::Stdout, |t| t.green())
            .to_string(),
        Effect::Deny => "DENY"
            .if_supports_color(Stream::Stdout, |t| t.red())
            .to_string(),
    }
}
