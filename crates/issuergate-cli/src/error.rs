//! CLI error types and process exit codes

use issuergate_auth::{AuthError, ConfigError};
use thiserror::Error;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Gateway configuration could not be loaded or built
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Token or session rejected by the gateway
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Invalid command arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Logging subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Process exit code.
    ///
    /// `1` is generic failure, `2` configuration or usage, `10..` one code per
    /// authentication failure kind so scripts can branch on the cause.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidArguments(_) => 2,
            Self::Auth(error) => auth_exit_code(error),
            Self::Json(_) | Self::Io(_) | Self::Logging(_) => 1,
        }
    }
}

fn auth_exit_code(error: &AuthError) -> i32 {
    match error {
        AuthError::MalformedToken(_) => 10,
        AuthError::UnknownIssuer { .. } => 11,
        AuthError::IssuerDisabled { .. } => 12,
        AuthError::SignatureInvalid => 13,
        AuthError::ClaimInvalid { .. } => 14,
        AuthError::BackwardsVerificationFailed { .. } => 15,
        AuthError::SessionNotFound => 16,
        _ => 17,
    }
}
