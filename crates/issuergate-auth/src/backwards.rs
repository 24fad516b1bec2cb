//! Backwards verification against an issuer's authoritative endpoint
//!
//! A locally valid signature proves the issuer signed the token at some point.
//! Asking the issuer again proves the identity is still live (not logged out
//! or revoked elsewhere).
//!
//! The outcome is three-way so the caller can tell a rejection (final) from an
//! outage (eligible for degraded-mode fallback).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Backwards verification settings shared by all HTTP verifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackwardsVerificationConfig {
    /// Upper bound for one call, in milliseconds
    pub timeout_ms: u64,
    /// Treat 5xx responses as an outage (degraded-mode eligible) instead of
    /// a rejection
    pub degrade_on_server_error: bool,
}

impl Default for BackwardsVerificationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            degrade_on_server_error: true,
        }
    }
}

impl BackwardsVerificationConfig {
    /// Call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result of asking the issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackwardsOutcome {
    /// The issuer still vouches for the identity.
    Confirmed,
    /// The issuer answered and refused.
    Rejected {
        /// HTTP status returned
        status: u16,
    },
    /// No usable answer (timeout, connection failure, optionally 5xx).
    Unreachable {
        /// Short non-sensitive description for logs
        reason: String,
    },
}

impl BackwardsOutcome {
    /// Metric/log label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Rejected { .. } => "rejected",
            Self::Unreachable { .. } => "unreachable",
        }
    }
}

/// Capability to re-confirm a token with its issuer.
///
/// Implementations must not log or echo the token.
#[async_trait]
pub trait BackwardsVerifier: Send + Sync + std::fmt::Debug {
    /// Ask the issuer whether `token` still represents a live identity.
    async fn verify(&self, token: &str) -> BackwardsOutcome;
}

/// HTTP backwards verifier: `GET <endpoint>` with `Authorization: Bearer`.
#[derive(Clone)]
pub struct HttpBackwardsVerifier {
    endpoint: Url,
    http_client: reqwest::Client,
    degrade_on_server_error: bool,
}

impl std::fmt::Debug for HttpBackwardsVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackwardsVerifier")
            .field("endpoint", &self.endpoint.as_str())
            .field("degrade_on_server_error", &self.degrade_on_server_error)
            .field("http_client", &"<reqwest::Client>")
            .finish()
    }
}

impl HttpBackwardsVerifier {
    /// Create a verifier for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (TLS backend
    /// initialization).
    pub fn new(endpoint: Url, config: &BackwardsVerificationConfig) -> reqwest::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            endpoint,
            http_client,
            degrade_on_server_error: config.degrade_on_server_error,
        })
    }

    fn classify(&self, status: StatusCode) -> BackwardsOutcome {
        if status.is_success() {
            BackwardsOutcome::Confirmed
        } else if status.is_server_error() && self.degrade_on_server_error {
            BackwardsOutcome::Unreachable {
                reason: format!("server error {}", status.as_u16()),
            }
        } else {
            BackwardsOutcome::Rejected {
                status: status.as_u16(),
            }
        }
    }
}

fn transport_reason(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "request failed"
    }
}

#[async_trait]
impl BackwardsVerifier for HttpBackwardsVerifier {
    async fn verify(&self, token: &str) -> BackwardsOutcome {
        let response = self
            .http_client
            .get(self.endpoint.clone())
            .bearer_auth(token)
            .send()
            .await;

        match response {
            Ok(response) => {
                let outcome = self.classify(response.status());
                debug!(
                    endpoint = %self.endpoint,
                    status = response.status().as_u16(),
                    outcome = outcome.label(),
                    "Backwards verification answered"
                );
                outcome
            }
            Err(e) => {
                let reason = transport_reason(&e);
                warn!(endpoint = %self.endpoint, reason, "Backwards verification endpoint unreachable");
                BackwardsOutcome::Unreachable {
                    reason: reason.to_string(),
                }
            }
        }
    }
}
