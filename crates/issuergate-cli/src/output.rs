//! Output formatting for CLI

use std::io::Write;

use issuergate_auth::UserContext;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliResult;

/// One configured issuer as reported by `check-config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuerSummary {
    pub issuer: String,
    pub enabled: bool,
    pub audiences: Vec<String>,
    pub algorithms: Vec<String>,
    pub keys: usize,
    pub backwards_verification: bool,
    pub permission_rules: usize,
}

/// Unverified routing view of a token, as reported by `inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInspection {
    /// Always false; nothing in this view is trusted
    pub verified: bool,
    pub algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub audiences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<u64>,
    pub native_permissions: Vec<String>,
}

/// Format and write command output
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Write a validated user context
    ///
    /// # Errors
    ///
    /// Returns an error if writing or JSON serialization fails.
    pub fn user_context(&self, ctx: &UserContext, out: &mut dyn Write) -> CliResult<()> {
        if self.format == OutputFormat::Json {
            return self.json(ctx, out);
        }

        writeln!(out, "Subject:     {}", ctx.subject)?;
        writeln!(out, "Issuer:      {}", ctx.issuer)?;
        if let Some(label) = ctx.display.label() {
            writeln!(out, "Name:        {label}")?;
        }
        writeln!(out, "Expires at:  {}", ctx.expires_at)?;
        writeln!(out, "Permissions: {}", join_or_dash(ctx.permissions.iter()))?;
        Ok(())
    }

    /// Write the issuer table from `check-config`
    ///
    /// # Errors
    ///
    /// Returns an error if writing or JSON serialization fails.
    pub fn issuers(&self, issuers: &[IssuerSummary], out: &mut dyn Write) -> CliResult<()> {
        if self.format == OutputFormat::Json {
            return self.json(issuers, out);
        }

        writeln!(out, "Configuration OK: {} issuer(s)", issuers.len())?;
        for summary in issuers {
            let state = if summary.enabled { "enabled" } else { "disabled" };
            writeln!(out, "\n{} ({state})", summary.issuer)?;
            writeln!(
                out,
                "  audiences:   {}",
                join_or_dash(summary.audiences.iter().map(String::as_str))
            )?;
            writeln!(
                out,
                "  algorithms:  {}",
                join_or_dash(summary.algorithms.iter().map(String::as_str))
            )?;
            writeln!(out, "  keys:        {}", summary.keys)?;
            writeln!(out, "  rules:       {}", summary.permission_rules)?;
            writeln!(
                out,
                "  backwards:   {}",
                if summary.backwards_verification { "yes" } else { "no" }
            )?;
        }
        Ok(())
    }

    /// Write the unverified token view from `inspect`
    ///
    /// # Errors
    ///
    /// Returns an error if writing or JSON serialization fails.
    pub fn inspection(&self, view: &TokenInspection, out: &mut dyn Write) -> CliResult<()> {
        if self.format == OutputFormat::Json {
            return self.json(view, out);
        }

        writeln!(out, "UNVERIFIED - signature and claims have not been checked")?;
        writeln!(out, "Algorithm:   {}", view.algorithm)?;
        writeln!(out, "Key id:      {}", view.kid.as_deref().unwrap_or("-"))?;
        writeln!(out, "Issuer:      {}", view.issuer.as_deref().unwrap_or("-"))?;
        writeln!(out, "Subject:     {}", view.subject.as_deref().unwrap_or("-"))?;
        writeln!(
            out,
            "Audiences:   {}",
            join_or_dash(view.audiences.iter().map(String::as_str))
        )?;
        writeln!(out, "Expires at:  {}", optional_time(view.expires_at))?;
        writeln!(out, "Not before:  {}", optional_time(view.not_before))?;
        writeln!(
            out,
            "Permissions: {}",
            join_or_dash(view.native_permissions.iter().map(String::as_str))
        )?;
        Ok(())
    }

    fn json<T: Serialize + ?Sized>(&self, value: &T, out: &mut dyn Write) -> CliResult<()> {
        serde_json::to_writer_pretty(&mut *out, value)?;
        writeln!(out)?;
        Ok(())
    }
}

fn join_or_dash<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let joined = values.collect::<Vec<_>>().join(", ");
    if joined.is_empty() { "-".to_string() } else { joined }
}

fn optional_time(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |t| t.to_string())
}
