//! # issuergate CLI
//!
//! Command-line front end for `issuergate-auth`:
//!
//! - `validate` - full validation of one token against a gateway configuration
//! - `check-config` - load, validate and build a gateway, then list its issuers
//! - `inspect` - unverified header and claims of a token
//!
//! Exit codes: `0` success, `1` generic failure, `2` configuration or usage,
//! `10`-`17` one per authentication failure kind (see [`CliError::exit_code`]).

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

use clap::Parser;

pub use cli::{Cli, Commands, OutputFormat};
pub use error::{CliError, CliResult};

/// Parse arguments, set up logging, and run the chosen command.
///
/// # Errors
///
/// Returns the failing command's [`CliError`].
pub async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_json)?;

    let formatter = output::Formatter::new(cli.format);
    let mut stdout = std::io::stdout();
    commands::execute(cli.command, &formatter, &mut stdout).await
}
