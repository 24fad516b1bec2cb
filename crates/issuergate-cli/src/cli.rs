//! CLI argument parsing

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Main CLI application structure
#[derive(Parser, Debug)]
#[command(
    name = "issuergate",
    version,
    about = "Validate tokens and sessions against a multi-issuer gateway configuration",
    long_about = "issuergate loads a gateway configuration (TOML, YAML or JSON, with \
                  ISSUERGATE__* environment overrides) and validates tokens against it.\n\n\
                  Tokens are read from --token, the ISSUERGATE_TOKEN environment variable, \
                  or standard input, in that order. Token text is never printed."
)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value = "human")]
    pub format: OutputFormat,

    /// Log level filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fully validate a token and print the resulting user context
    Validate(ValidateArgs),

    /// Load a configuration, build the gateway, and list issuers
    CheckConfig(ConfigArgs),

    /// Show the unverified routing view of a token (no trust established)
    Inspect(TokenArgs),
}

/// Gateway configuration source
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Path to the gateway configuration file
    #[arg(long, short = 'c')]
    pub config: PathBuf,
}

/// Token source
#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Bearer token; falls back to stdin when absent
    #[arg(long, short = 't', env = "ISSUERGATE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Arguments for `validate`
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub token: TokenArgs,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Human,
    /// Pretty-printed JSON
    Json,
}
