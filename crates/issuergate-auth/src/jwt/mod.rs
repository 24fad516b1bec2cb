//! JWT claims and unverified routing peek
//!
//! ```text
//! token ──► peek_claims (unverified, routing only)
//!              │ iss
//!              ▼
//!        UnifiedRouter ──► JwtIssuerVerifier ──► signature ──► iss/aud ──► exp/nbf
//! ```
//!
//! [`peek_issuer`] never establishes trust and reads nothing but `iss`, so a
//! forged token with odd claim types still reaches the signature gate. Every
//! claim is parsed from the signature-verified decode inside the verifier.
//! [`peek_claims`] is a typed, equally untrusted view for diagnostics.

pub mod validator;

pub use validator::{SignatureVerifier, TrustKey};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AuthError, MalformedReason, Result};
use crate::context::DisplayAttributes;

/// Registered claims per RFC 7519 plus everything else, flattened.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TokenClaims {
    /// Issuer (iss)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject (sub)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience (aud), single value or list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration Time (exp) - Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Not Before (nbf) - Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,

    /// Issued At (iat) - Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    /// JWT ID (jti)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Claims not in RFC 7519
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

/// The `aud` claim: RFC 7519 allows a single string or an array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "api"`
    Single(String),
    /// `"aud": ["api", "web"]`
    Many(Vec<String>),
}

impl Audience {
    /// Iterates the audience values.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }

    /// True when at least one value is in `accepted`.
    pub fn intersects(&self, accepted: &[String]) -> bool {
        self.iter().any(|aud| accepted.iter().any(|a| a == aud))
    }
}

impl TokenClaims {
    /// Reads a permission claim given either as a JSON array of strings or
    /// as a single string. A string is one native value, spaces included.
    ///
    /// Non-string array members are skipped.
    pub fn native_permissions(&self, claim: &str) -> Vec<String> {
        match self.additional.get(claim) {
            Some(serde_json::Value::Array(values)) => values
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::to_owned)
                .collect(),
            Some(serde_json::Value::String(value)) => vec![value.clone()],
            _ => Vec::new(),
        }
    }

    /// OIDC profile claims used for display.
    pub fn display_attributes(&self) -> DisplayAttributes {
        let text = |name: &str| {
            self.additional
                .get(name)
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };

        DisplayAttributes {
            name: text("name"),
            email: text("email"),
            username: text("preferred_username"),
        }
    }
}

/// Decodes the header segment without any verification.
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if the token is not three segments
/// or the header is not base64url JSON.
pub fn peek_header(token: &str) -> Result<jsonwebtoken::Header> {
    let header = split_segments(token)?[0];
    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| AuthError::MalformedToken(MalformedReason::Encoding))?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken(MalformedReason::Claims))
}

/// Decodes the payload segment without any verification.
///
/// The result is suitable for diagnostics only and must never be used for
/// authorization decisions.
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if the payload cannot be decoded
/// into [`TokenClaims`].
pub fn peek_claims(token: &str) -> Result<TokenClaims> {
    serde_json::from_slice(&decode_payload(token)?)
        .map_err(|_| AuthError::MalformedToken(MalformedReason::Claims))
}

/// The only claim routing looks at. Other claims are ignored whatever their
/// shape.
#[derive(Deserialize)]
struct RoutingClaims {
    #[serde(default)]
    iss: Option<String>,
}

/// Returns the unverified `iss` claim.
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] if the payload cannot be decoded or
/// carries no non-empty string `iss`.
pub fn peek_issuer(token: &str) -> Result<String> {
    let routing: RoutingClaims = serde_json::from_slice(&decode_payload(token)?)
        .map_err(|_| AuthError::MalformedToken(MalformedReason::Claims))?;

    routing
        .iss
        .filter(|iss| !iss.is_empty())
        .ok_or(AuthError::MalformedToken(MalformedReason::MissingIssuer))
}

fn decode_payload(token: &str) -> Result<Vec<u8>> {
    let payload = split_segments(token)?[1];
    URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::MalformedToken(MalformedReason::Encoding))
}

fn split_segments(token: &str) -> Result<[&str; 3]> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok([header, payload, signature]),
        _ => Err(AuthError::MalformedToken(MalformedReason::Structure)),
    }
}
