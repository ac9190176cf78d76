//! Tollgate operator CLI.
//!
//! Evaluates policy sets offline, explains decisions and inspects the
//! effective configuration.
//!
//! # Quick Start
//!
//! ```bash
//! # Dump the baseline policy set
//! tollgate policies standard > policies.json
//!
//! # Evaluate it against a hand-written context
//! tollgate evaluate --policies policies.json --context context.json
//!
//! # Run a full check against fixture data
//! tollgate explain --policies policies.json --fixtures world.json --request request.json
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{ConfigFormat, DecisionFormat, PolicyFormat};

/// Tollgate - attribute-based access control for multi-tenant applications.
#[derive(Parser)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Evaluate a policy set against an attribute context.
    Evaluate {
        /// Policy file (JSON array, or TOML with a `policies` table array).
        #[arg(short, long)]
        policies: PathBuf,

        /// Attribute context file (JSON).
        #[arg(short, long)]
        context: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        format: DecisionFormat,
    },

    /// Run a full check against fixture data and show the context it used.
    Explain {
        /// Policy file (JSON array, or TOML with a `policies` table array).
        #[arg(short, long)]
        policies: PathBuf,

        /// Resource provider fixtures (JSON).
        #[arg(long)]
        fixtures: PathBuf,

        /// Access request (JSON).
        #[arg(short, long)]
        request: PathBuf,

        /// Project directory to load configuration from.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        format: DecisionFormat,
    },

    /// Policy set commands.
    #[command(subcommand)]
    Policies(PolicyCommands),

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Print the standard policy set.
    Standard {
        /// Project directory to load role names from.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "json")]
        format: PolicyFormat,
    },

    /// Check a policy file and list its policies in evaluation order.
    Validate {
        /// Policy file to check.
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Project directory.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        format: ConfigFormat,
    },

    /// Validate configuration files.
    Validate {
        /// Project directory.
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so command output stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Evaluate {
            policies,
            context,
            format,
        } => commands::evaluate::run(&policies, &context, format),
        Commands::Explain {
            policies,
            fixtures,
            request,
            project,
            format,
        } => commands::explain::run(&policies, &fixtures, &request, &project, format),
        Commands::Policies(cmd) => match cmd {
            PolicyCommands::Standard { project, format } => {
                commands::policies::standard(&project, format)
            }
            PolicyCommands::Validate { file } => commands::policies::validate(&file),
        },
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { project, format } => commands::config::show(&project, format),
            ConfigCommands::Validate { project } => commands::config::validate(&project),
        },
    }
}
