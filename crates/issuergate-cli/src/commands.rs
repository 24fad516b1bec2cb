//! Command execution

use std::io::Write;

use issuergate_auth::jwt::{peek_claims, peek_header};
use issuergate_auth::verifier::DEFAULT_PERMISSIONS_CLAIM;
use issuergate_auth::{GatewayConfig, UnifiedRouter};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::cli::{Commands, ConfigArgs, TokenArgs, ValidateArgs};
use crate::error::{CliError, CliResult};
use crate::output::{Formatter, IssuerSummary, TokenInspection};

/// Run one subcommand, writing its output to `out`.
///
/// # Errors
///
/// Returns the command's configuration, authentication or output error.
pub async fn execute(command: Commands, formatter: &Formatter, out: &mut dyn Write) -> CliResult<()> {
    match command {
        Commands::Validate(args) => validate(args, formatter, out).await,
        Commands::CheckConfig(args) => check_config(&args, formatter, out),
        Commands::Inspect(args) => inspect(args, formatter, out).await,
    }
}

async fn validate(args: ValidateArgs, formatter: &Formatter, out: &mut dyn Write) -> CliResult<()> {
    let config = load(&args.config)?;
    let router = UnifiedRouter::from_config(&config)?;
    let token = resolve_token(args.token, tokio::io::stdin()).await?;

    let ctx = router.validate(&token).await?;
    info!(subject = %ctx.subject, issuer = %ctx.issuer, "Token validated");
    formatter.user_context(&ctx, out)
}

fn check_config(args: &ConfigArgs, formatter: &Formatter, out: &mut dyn Write) -> CliResult<()> {
    let config = load(args)?;
    let router = UnifiedRouter::from_config(&config)?;
    formatter.issuers(&summarize(&config, &router), out)
}

async fn inspect(args: TokenArgs, formatter: &Formatter, out: &mut dyn Write) -> CliResult<()> {
    let token = resolve_token(args, tokio::io::stdin()).await?;
    formatter.inspection(&inspect_token(&token)?, out)
}

fn load(args: &ConfigArgs) -> CliResult<GatewayConfig> {
    debug!(path = %args.config.display(), "Loading gateway configuration");
    let config = GatewayConfig::from_file(&args.config)?;
    config.validate()?;
    Ok(config)
}

/// Issuer rows in router order, enriched from configuration.
pub fn summarize(config: &GatewayConfig, router: &UnifiedRouter) -> Vec<IssuerSummary> {
    router
        .issuers()
        .into_iter()
        .filter_map(|status| {
            let issuer = config.issuer(&status.issuer)?;
            Some(IssuerSummary {
                issuer: status.issuer,
                enabled: status.enabled,
                audiences: issuer.audiences.clone(),
                algorithms: issuer.algorithms.iter().map(|a| format!("{a:?}")).collect(),
                keys: issuer.keys.len(),
                backwards_verification: issuer.requires_backwards_verification(),
                permission_rules: issuer.permission_map.len(),
            })
        })
        .collect()
}

/// Unverified header and claims. Never includes the token itself.
///
/// # Errors
///
/// Returns [`CliError::Auth`] if the token cannot be decoded.
pub fn inspect_token(token: &str) -> CliResult<TokenInspection> {
    let header = peek_header(token)?;
    let claims = peek_claims(token)?;

    Ok(TokenInspection {
        verified: false,
        algorithm: format!("{:?}", header.alg),
        kid: header.kid,
        native_permissions: claims.native_permissions(DEFAULT_PERMISSIONS_CLAIM),
        audiences: claims
            .aud
            .as_ref()
            .map(|aud| aud.iter().map(str::to_owned).collect())
            .unwrap_or_default(),
        issuer: claims.iss,
        subject: claims.sub,
        expires_at: claims.exp,
        not_before: claims.nbf,
    })
}

/// `--token` (or `ISSUERGATE_TOKEN`) when given, otherwise all of `stdin`.
///
/// # Errors
///
/// Returns [`CliError::InvalidArguments`] for an empty token, or an I/O error
/// reading `stdin`.
pub async fn resolve_token<R>(args: TokenArgs, mut stdin: R) -> CliResult<String>
where
    R: AsyncRead + Unpin,
{
    let raw = match args.token {
        Some(token) => token,
        None => {
            let mut buffer = String::new();
            stdin.read_to_string(&mut buffer).await?;
            buffer
        }
    };

    let token = raw.trim();
    if token.is_empty() {
        return Err(CliError::InvalidArguments("no token supplied".to_string()));
    }
    Ok(token.to_string())
}
