//! Structured audit logging for authentication events
//!
//! Events are emitted through `tracing` under the `audit::auth` target, so
//! deployments can route them to a dedicated sink with a target filter:
//!
//! ```text
//! RUST_LOG=info,audit::auth=info
//! ```
//!
//! Each record gets a time-ordered UUIDv7 audit id. Subjects may be hashed
//! with BLAKE3 ([`AuditLogger::privacy_focused`]). Session identifiers are
//! bearer credentials and are only ever recorded as a [`fingerprint`].
//!
//! ## Usage
//!
//! ```rust
//! use issuergate_auth::audit::{AuditLogger, AuthEvent};
//!
//! let logger = AuditLogger::new("gateway");
//! logger.log(AuthEvent::TokenValidated {
//!     subject: "u1".to_string(),
//!     issuer: "A".to_string(),
//! });
//! ```

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Short BLAKE3 fingerprint of a value, safe to log.
pub fn fingerprint(value: &str) -> String {
    let hash = blake3::hash(value.as_bytes());
    format!("b3:{}", &hash.to_hex()[..16])
}

/// Audit logger for authentication events
#[derive(Debug, Clone)]
pub struct AuditLogger {
    /// Service name for event attribution
    service_name: String,
    /// Whether to hash subject identifiers
    hash_identifiers: bool,
}

impl AuditLogger {
    /// Create a new audit logger with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            hash_identifiers: false,
        }
    }

    /// Create a logger that hashes subject identifiers
    pub fn privacy_focused(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            hash_identifiers: true,
        }
    }

    /// Builder method to configure identifier hashing
    pub fn with_identifier_hashing(mut self, hash: bool) -> Self {
        self.hash_identifiers = hash;
        self
    }

    /// Log an authentication event
    pub fn log(&self, event: AuthEvent) {
        let audit_id = Uuid::now_v7();

        match &event {
            AuthEvent::TokenValidated { subject, issuer } => {
                info!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = event.event_type(),
                    subject = %self.maybe_hash(subject),
                    issuer = %issuer,
                    service = %self.service_name,
                    "Token validated"
                );
            }
            AuthEvent::ValidationFailed {
                issuer,
                kind,
                reason,
            } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = event.event_type(),
                    issuer = ?issuer,
                    kind = %kind,
                    reason = %reason,
                    service = %self.service_name,
                    "Token validation failed"
                );
            }
            AuthEvent::BackwardsRejected {
                subject,
                issuer,
                status,
            } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = event.event_type(),
                    subject = %self.maybe_hash(subject),
                    issuer = %issuer,
                    status = status,
                    service = %self.service_name,
                    "Issuer rejected backwards verification"
                );
            }
            AuthEvent::DegradedVerification {
                subject,
                issuer,
                age_secs,
            } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = event.event_type(),
                    degraded = true,
                    subject = %self.maybe_hash(subject),
                    issuer = %issuer,
                    age_secs = age_secs,
                    service = %self.service_name,
                    "Accepted stale verification while issuer unreachable"
                );
            }
            AuthEvent::SessionCreated {
                subject,
                issuer,
                session,
            } => {
                info!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = event.event_type(),
                    subject = %self.maybe_hash(subject),
                    issuer = %issuer,
                    session = %session,
                    service = %self.service_name,
                    "Session created"
                );
            }
            AuthEvent::SessionTerminated {
                subject,
                session,
                reason,
            } => {
                info!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = event.event_type(),
                    subject = ?subject.as_deref().map(|s| self.maybe_hash(s)),
                    session = %session,
                    reason = %reason,
                    service = %self.service_name,
                    "Session terminated"
                );
            }
            AuthEvent::LegacySessionRecovered { subject, issuer } => {
                info!(
                    target: "audit::auth",
                    audit_id = %audit_id,
                    event_type = event.event_type(),
                    subject = %self.maybe_hash(subject),
                    issuer = %issuer,
                    service = %self.service_name,
                    "Legacy session recovered"
                );
            }
        }
    }

    fn maybe_hash(&self, value: &str) -> String {
        if self.hash_identifiers {
            fingerprint(value)
        } else {
            value.to_string()
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new("issuergate")
    }
}

/// Authentication event types for audit logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    /// A token passed every gate
    TokenValidated {
        /// Authenticated subject
        subject: String,
        /// Issuer that vouched for it
        issuer: String,
    },

    /// A token was refused
    ValidationFailed {
        /// Issuer claimed by the token, when it could be read
        issuer: Option<String>,
        /// Stable failure kind (see `AuthError::kind`)
        kind: String,
        /// Non-sensitive description
        reason: String,
    },

    /// The authoritative endpoint refused the identity
    BackwardsRejected {
        /// Subject
        subject: String,
        /// Issuer
        issuer: String,
        /// HTTP status returned
        status: u16,
    },

    /// A stale verification was honored during an outage
    DegradedVerification {
        /// Subject
        subject: String,
        /// Issuer
        issuer: String,
        /// Age of the cached confirmation
        age_secs: u64,
    },

    /// Session created
    SessionCreated {
        /// Subject
        subject: String,
        /// Issuer
        issuer: String,
        /// Session fingerprint, never the identifier itself
        session: String,
    },

    /// Session ended
    SessionTerminated {
        /// Subject, if the session still existed
        subject: Option<String>,
        /// Session fingerprint
        session: String,
        /// logout, expired, ...
        reason: String,
    },

    /// A foreign session was accepted through the legacy fallback
    LegacySessionRecovered {
        /// Subject
        subject: String,
        /// Issuer it was attributed to
        issuer: String,
    },
}

impl AuthEvent {
    /// Stable event name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TokenValidated { .. } => "token_validated",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::BackwardsRejected { .. } => "backwards_rejected",
            Self::DegradedVerification { .. } => "degraded_verification",
            Self::SessionCreated { .. } => "session_created",
            Self::SessionTerminated { .. } => "session_terminated",
            Self::LegacySessionRecovered { .. } => "legacy_session_recovered",
        }
    }
}
