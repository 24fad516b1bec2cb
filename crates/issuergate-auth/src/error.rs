//! Authentication error types.
//!
//! Every failure a validation can end in is a distinct variant so that a
//! consuming layer can map each one to its own caller-visible response.
//!
//! No variant carries token text or key material. Parse failures are reduced
//! to fixed [`MalformedReason`]s instead of forwarding decoder messages, which
//! may echo payload bytes.

use std::fmt;

use thiserror::Error;

/// Authentication errors.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases without a
/// semver-breaking change. Downstream match expressions must include a
/// wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The token's issuer claim names no configured issuer.
    #[error("Unknown issuer: {issuer}")]
    UnknownIssuer {
        /// Issuer identifier as claimed by the token.
        issuer: String,
    },

    /// The issuer is configured but currently disabled.
    #[error("Issuer disabled: {issuer}")]
    IssuerDisabled {
        /// Configured issuer identifier.
        issuer: String,
    },

    /// Signature verification failed (bad signature, disallowed algorithm,
    /// or no trusted key for the header's key id).
    #[error("Invalid signature")]
    SignatureInvalid,

    /// A claim failed validation after the signature was accepted.
    #[error("Invalid claim: {reason}")]
    ClaimInvalid {
        /// Which claim check failed.
        reason: ClaimReason,
    },

    /// The authoritative issuer did not confirm the identity.
    #[error("Backwards verification failed for issuer {issuer}: {cause}")]
    BackwardsVerificationFailed {
        /// Issuer whose endpoint was consulted.
        issuer: String,
        /// Rejection or unreachability.
        cause: BackwardsFailure,
    },

    /// No session exists for the identifier and no legacy fallback recovered one.
    #[error("Session not found")]
    SessionNotFound,

    /// The token cannot be parsed far enough to route it.
    #[error("Malformed token: {0}")]
    MalformedToken(MalformedReason),

    /// Session backend failure.
    #[error("Session store error: {0}")]
    Store(String),
}

impl AuthError {
    /// Shorthand for [`AuthError::ClaimInvalid`].
    pub fn claim(reason: ClaimReason) -> Self {
        Self::ClaimInvalid { reason }
    }

    /// Stable, low-cardinality name of the failure kind.
    ///
    /// Suitable for metric labels and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownIssuer { .. } => "unknown_issuer",
            Self::IssuerDisabled { .. } => "issuer_disabled",
            Self::SignatureInvalid => "signature_invalid",
            Self::ClaimInvalid { .. } => "claim_invalid",
            Self::BackwardsVerificationFailed { .. } => "backwards_verification_failed",
            Self::SessionNotFound => "session_not_found",
            Self::MalformedToken(_) => "malformed_token",
            Self::Store(_) => "store",
        }
    }
}

/// Reason a claim check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ClaimReason {
    /// `exp` is not strictly after the current time.
    Expired,
    /// `nbf` is in the future.
    NotYetValid,
    /// `iss` differs from the verifier's configured issuer.
    IssuerMismatch,
    /// No accepted audience is present in `aud`.
    AudienceMismatch,
    /// `sub` is absent or empty.
    MissingSubject,
    /// `exp` is absent.
    MissingExpiry,
}

impl ClaimReason {
    /// Fixed description used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::NotYetValid => "not yet valid",
            Self::IssuerMismatch => "issuer mismatch",
            Self::AudienceMismatch => "audience mismatch",
            Self::MissingSubject => "missing subject",
            Self::MissingExpiry => "missing expiry",
        }
    }
}

impl fmt::Display for ClaimReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why backwards verification failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackwardsFailure {
    /// The authoritative endpoint answered with a rejection status.
    Rejected {
        /// HTTP status code returned by the endpoint.
        status: u16,
    },
    /// The endpoint could not be reached and no cache entry was usable.
    Unreachable,
}

impl fmt::Display for BackwardsFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { status } => write!(f, "rejected with status {status}"),
            Self::Unreachable => f.write_str("issuer unreachable and no usable cached verification"),
        }
    }
}

/// Why a token could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// Not three dot-separated segments.
    Structure,
    /// Header or payload segment is not valid base64url.
    Encoding,
    /// Header or payload is not the expected JSON shape.
    Claims,
    /// Payload has no `iss` claim to route on.
    MissingIssuer,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Structure => "expected three dot-separated segments",
            Self::Encoding => "segment is not valid base64url",
            Self::Claims => "header or claims are not valid JSON",
            Self::MissingIssuer => "missing iss claim",
        })
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
