//! Per-issuer token verification
//!
//! Every trusted issuer is one [`IssuerVerifier`]. The router only knows the
//! trait; adding an issuer never touches routing.
//!
//! [`JwtIssuerVerifier`] applies its gates in a fixed order, and the first
//! failure ends the validation with no partial context:
//!
//! 1. signature against the issuer's keys and algorithm allowlist
//! 2. `iss` equals the configured issuer, `aud` shares a value with the
//!    accepted audiences, `sub` is present
//! 3. `exp` strictly after now, `nbf` not in the future
//! 4. backwards verification (unless self-issued): fresh cache hit, else a
//!    bounded call to the authoritative endpoint, else the degraded window
//! 5. permission mapping and context construction

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::audit::{AuditLogger, AuthEvent};
use crate::auth_metrics;
use crate::backwards::{
    BackwardsOutcome, BackwardsVerificationConfig, BackwardsVerifier, HttpBackwardsVerifier,
};
use crate::clock::Clock;
use crate::config::{ConfigError, IssuerConfig};
use crate::context::UserContext;
use crate::error::{AuthError, BackwardsFailure, ClaimReason, Result};
use crate::jwt::{SignatureVerifier, TokenClaims, TrustKey};
use crate::permissions::{PermissionMapper, PermissionPolicy, PermissionSet};
use crate::verification_cache::VerificationCache;

/// Claim name read for native permissions when none is configured.
pub const DEFAULT_PERMISSIONS_CLAIM: &str = "permissions";

/// One trusted issuer's verification capability.
#[async_trait]
pub trait IssuerVerifier: Send + Sync + fmt::Debug {
    /// Issuer identifier this verifier is configured for.
    fn issuer(&self) -> &str;

    /// Validate a token claimed to come from this issuer.
    ///
    /// # Errors
    ///
    /// Returns the first failing gate as an [`AuthError`].
    async fn validate(&self, token: &str) -> Result<UserContext>;

    /// Translate this issuer's native permissions.
    fn map_permissions(&self, native: &[String]) -> PermissionSet;
}

/// JWT verifier for one issuer.
pub struct JwtIssuerVerifier {
    issuer: String,
    audiences: Vec<String>,
    signature: SignatureVerifier,
    permissions: PermissionMapper,
    permissions_claim: String,
    leeway_secs: u64,
    backwards: Option<Arc<dyn BackwardsVerifier>>,
    call_timeout: Duration,
    cache: Arc<VerificationCache>,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
}

impl fmt::Debug for JwtIssuerVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtIssuerVerifier")
            .field("issuer", &self.issuer)
            .field("audiences", &self.audiences)
            .field("signature", &self.signature)
            .field("permissions_claim", &self.permissions_claim)
            .field("leeway_secs", &self.leeway_secs)
            .field("backwards", &self.backwards)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl JwtIssuerVerifier {
    /// Create a verifier without backwards verification (self-issued tokens).
    pub fn new(
        issuer: impl Into<String>,
        audiences: Vec<String>,
        signature: SignatureVerifier,
        permissions: PermissionMapper,
        cache: Arc<VerificationCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audiences,
            signature,
            permissions,
            permissions_claim: DEFAULT_PERMISSIONS_CLAIM.to_string(),
            leeway_secs: 0,
            backwards: None,
            call_timeout: BackwardsVerificationConfig::default().timeout(),
            cache,
            clock,
            audit: AuditLogger::default(),
        }
    }

    /// Require backwards verification through `verifier`, bounded by `timeout`.
    pub fn with_backwards(mut self, verifier: Arc<dyn BackwardsVerifier>, timeout: Duration) -> Self {
        self.backwards = Some(verifier);
        self.call_timeout = timeout;
        self
    }

    /// Read native permissions from `claim`.
    pub fn with_permissions_claim(mut self, claim: impl Into<String>) -> Self {
        self.permissions_claim = claim.into();
        self
    }

    /// Clock skew tolerance for `exp` and `nbf`.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Audit sink
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Build from configuration, loading the issuer's trust material.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a key cannot be loaded or the HTTP client
    /// for the authoritative endpoint cannot be built.
    pub fn from_config(
        config: &IssuerConfig,
        policy: Arc<PermissionPolicy>,
        backwards: &BackwardsVerificationConfig,
        cache: Arc<VerificationCache>,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, ConfigError> {
        let keys = config
            .keys
            .iter()
            .map(|key| TrustKey::from_config(&config.issuer, key))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let verifier = Self::new(
            config.issuer.clone(),
            config.audiences.clone(),
            SignatureVerifier::new(keys, config.algorithms.clone()),
            PermissionMapper::new(config.permission_table(), policy),
            cache,
            clock,
        )
        .with_permissions_claim(config.permissions_claim.clone())
        .with_leeway(config.leeway_secs);

        match &config.verification_endpoint {
            Some(endpoint) if !config.self_issued => {
                let http = HttpBackwardsVerifier::new(endpoint.clone(), backwards).map_err(|e| {
                    ConfigError::Invalid(format!(
                        "issuer '{}': cannot build HTTP client: {e}",
                        config.issuer
                    ))
                })?;
                Ok(verifier.with_backwards(Arc::new(http), backwards.timeout()))
            }
            _ => Ok(verifier),
        }
    }

    /// True when tokens are re-confirmed with the issuer.
    pub fn requires_backwards_verification(&self) -> bool {
        self.backwards.is_some()
    }

    /// Accepted audiences
    pub fn audiences(&self) -> &[String] {
        &self.audiences
    }

    /// Number of trusted keys
    pub fn key_count(&self) -> usize {
        self.signature.key_count()
    }

    fn check_claims(&self, claims: &TokenClaims) -> Result<String> {
        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            return Err(AuthError::claim(ClaimReason::IssuerMismatch));
        }

        match &claims.aud {
            Some(aud) if aud.intersects(&self.audiences) => {}
            _ => return Err(AuthError::claim(ClaimReason::AudienceMismatch)),
        }

        let subject = claims
            .sub
            .as_deref()
            .filter(|sub| !sub.is_empty())
            .ok_or(AuthError::claim(ClaimReason::MissingSubject))?;

        let now = self.clock.now_secs();
        let exp = claims
            .exp
            .ok_or(AuthError::claim(ClaimReason::MissingExpiry))?;
        if exp.saturating_add(self.leeway_secs) <= now {
            return Err(AuthError::claim(ClaimReason::Expired));
        }

        if let Some(nbf) = claims.nbf
            && nbf > now.saturating_add(self.leeway_secs)
        {
            return Err(AuthError::claim(ClaimReason::NotYetValid));
        }

        Ok(subject.to_string())
    }

    async fn confirm_with_issuer(&self, token: &str, subject: &str) -> Result<()> {
        let Some(backwards) = &self.backwards else {
            return Ok(());
        };

        if self.cache.get(subject, &self.issuer).is_some() {
            auth_metrics::record_backwards_verification(&self.issuer, "cache_hit");
            return Ok(());
        }

        match self.call_issuer(Arc::clone(backwards), token, subject).await {
            BackwardsOutcome::Confirmed => {
                auth_metrics::record_backwards_verification(&self.issuer, "confirmed");
                Ok(())
            }
            BackwardsOutcome::Rejected { status } => {
                auth_metrics::record_backwards_verification(&self.issuer, "rejected");
                self.audit.log(AuthEvent::BackwardsRejected {
                    subject: subject.to_string(),
                    issuer: self.issuer.clone(),
                    status,
                });
                Err(AuthError::BackwardsVerificationFailed {
                    issuer: self.issuer.clone(),
                    cause: BackwardsFailure::Rejected { status },
                })
            }
            BackwardsOutcome::Unreachable { reason } => {
                let Some(entry) = self.cache.get_degraded(subject, &self.issuer) else {
                    auth_metrics::record_backwards_verification(&self.issuer, "unreachable");
                    warn!(
                        issuer = %self.issuer,
                        subject,
                        reason = %reason,
                        "Issuer unreachable and no verification within grace window"
                    );
                    return Err(AuthError::BackwardsVerificationFailed {
                        issuer: self.issuer.clone(),
                        cause: BackwardsFailure::Unreachable,
                    });
                };

                auth_metrics::record_backwards_verification(&self.issuer, "degraded");
                self.audit.log(AuthEvent::DegradedVerification {
                    subject: subject.to_string(),
                    issuer: self.issuer.clone(),
                    age_secs: entry.age_at(self.clock.now_secs()).unwrap_or_default(),
                });
                Ok(())
            }
        }
    }

    /// Runs the call and its cache write on a spawned task. The caller only
    /// awaits the result, so dropping the caller leaves the write in place.
    async fn call_issuer(
        &self,
        backwards: Arc<dyn BackwardsVerifier>,
        token: &str,
        subject: &str,
    ) -> BackwardsOutcome {
        let token = token.to_owned();
        let subject = subject.to_owned();
        let issuer = self.issuer.clone();
        let cache = Arc::clone(&self.cache);
        let timeout = self.call_timeout;

        let task = tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, backwards.verify(&token))
                .await
                .unwrap_or_else(|_| BackwardsOutcome::Unreachable {
                    reason: "timeout".to_string(),
                });

            match &outcome {
                BackwardsOutcome::Confirmed => cache.put(&subject, &issuer),
                BackwardsOutcome::Rejected { .. } => {
                    if cache.invalidate(&subject, &issuer) {
                        debug!(issuer = %issuer, subject = %subject, "Evicted verification after rejection");
                    }
                }
                BackwardsOutcome::Unreachable { .. } => {}
            }

            outcome
        });

        task.await.unwrap_or_else(|e| {
            warn!(issuer = %self.issuer, error = %e, "Backwards verification task failed");
            BackwardsOutcome::Unreachable {
                reason: "verification task failed".to_string(),
            }
        })
    }
}

#[async_trait]
impl IssuerVerifier for JwtIssuerVerifier {
    fn issuer(&self) -> &str {
        &self.issuer
    }

    async fn validate(&self, token: &str) -> Result<UserContext> {
        let (_header, claims) = self.signature.verify(token)?;
        let subject = self.check_claims(&claims)?;

        self.confirm_with_issuer(token, &subject).await?;

        let native = claims.native_permissions(&self.permissions_claim);
        let permissions = self.permissions.map(&native);

        let context = UserContext::builder()
            .subject(subject)
            .issuer(self.issuer.clone())
            .display(claims.display_attributes())
            .permissions(permissions)
            .expires_at(claims.exp.unwrap_or_default())
            .authenticated_at(self.clock.now_secs())
            .build()
            .map_err(|_| AuthError::claim(ClaimReason::MissingSubject))?;

        debug!(
            issuer = %self.issuer,
            subject = %context.subject,
            permissions = context.permissions.len(),
            "Token verified"
        );
        Ok(context)
    }

    fn map_permissions(&self, native: &[String]) -> PermissionSet {
        self.permissions.map(native)
    }
}
