//! Unified router
//!
//! Central entry point: routes a token to its issuer's verifier by the
//! unverified `iss` claim, enforces which issuers are enabled, and fronts the
//! session store.
//!
//! Routing uses exact issuer matches only. No wildcard, no default issuer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::audit::{self, AuditLogger, AuthEvent};
use crate::auth_metrics;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, GatewayConfig};
use crate::context::UserContext;
use crate::error::{AuthError, Result};
use crate::jwt;
use crate::permissions::PermissionPolicy;
use crate::session::{
    LegacySessionFallback, MemorySessionStore, SessionConfig, SessionId, SessionStore,
};
use crate::verification_cache::VerificationCache;
use crate::verifier::{IssuerVerifier, JwtIssuerVerifier};

struct IssuerEntry {
    verifier: Arc<dyn IssuerVerifier>,
    enabled: AtomicBool,
}

/// Issuer and its current enabled state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuerStatus {
    /// Issuer identifier
    pub issuer: String,
    /// Whether tokens from it are accepted
    pub enabled: bool,
}

/// Routes tokens and sessions to the right issuer.
pub struct UnifiedRouter {
    issuers: HashMap<String, IssuerEntry>,
    sessions: Arc<dyn SessionStore>,
    legacy: Option<Arc<dyn LegacySessionFallback>>,
    legacy_issuer: Option<String>,
    session_ttl_secs: u64,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
}

impl fmt::Debug for UnifiedRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnifiedRouter")
            .field("issuers", &self.issuers())
            .field("sessions", &self.sessions)
            .field("legacy", &self.legacy)
            .field("legacy_issuer", &self.legacy_issuer)
            .finish_non_exhaustive()
    }
}

impl UnifiedRouter {
    /// Create a builder
    pub fn builder() -> UnifiedRouterBuilder {
        UnifiedRouterBuilder::default()
    }

    /// Build the full graph from configuration using the system clock.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid or any trust
    /// key cannot be loaded.
    pub fn from_config(config: &GatewayConfig) -> std::result::Result<Self, ConfigError> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    /// Build from configuration with an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`UnifiedRouter::from_config`].
    pub fn from_config_with_clock(
        config: &GatewayConfig,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let policy: Arc<PermissionPolicy> = Arc::new(config.permissions.clone());
        let cache = Arc::new(VerificationCache::new(config.cache, Arc::clone(&clock)));
        let audit = if config.audit.hash_identifiers {
            AuditLogger::privacy_focused(config.audit.service_name.clone())
        } else {
            AuditLogger::new(config.audit.service_name.clone())
        };

        let mut builder = Self::builder()
            .clock(Arc::clone(&clock))
            .session_config(config.sessions)
            .audit(audit.clone());

        for issuer in &config.issuers {
            let verifier = JwtIssuerVerifier::from_config(
                issuer,
                Arc::clone(&policy),
                &config.backwards_verification,
                Arc::clone(&cache),
                Arc::clone(&clock),
            )?
            .with_audit(audit.clone());

            info!(
                issuer = %issuer.issuer,
                enabled = issuer.enabled,
                keys = issuer.keys.len(),
                backwards_verification = issuer.requires_backwards_verification(),
                "Configured issuer"
            );
            builder = builder.issuer(Arc::new(verifier), issuer.enabled);
        }

        if let Some(legacy) = &config.legacy_issuer {
            builder = builder.legacy_issuer(legacy.clone());
        }

        builder.build()
    }

    fn enabled_verifier(&self, issuer: &str) -> Result<&Arc<dyn IssuerVerifier>> {
        let entry = self
            .issuers
            .get(issuer)
            .ok_or_else(|| AuthError::UnknownIssuer {
                issuer: issuer.to_string(),
            })?;

        if !entry.enabled.load(Ordering::Acquire) {
            return Err(AuthError::IssuerDisabled {
                issuer: issuer.to_string(),
            });
        }

        Ok(&entry.verifier)
    }

    /// Validate a bearer token from any enabled issuer.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] if no issuer can be read
    /// - [`AuthError::UnknownIssuer`] / [`AuthError::IssuerDisabled`] from routing
    /// - any error of the selected verifier, unchanged
    pub async fn validate(&self, token: &str) -> Result<UserContext> {
        let started = Instant::now();

        let issuer = match jwt::peek_issuer(token) {
            Ok(issuer) => issuer,
            Err(e) => {
                self.record_failure(None, &e);
                return Err(e);
            }
        };

        let verifier = match self.enabled_verifier(&issuer) {
            Ok(verifier) => verifier,
            Err(e) => {
                self.record_failure(Some(&issuer), &e);
                return Err(e);
            }
        };

        let result = verifier.validate(token).await;
        auth_metrics::record_validation_duration(&issuer, started.elapsed().as_secs_f64());

        match &result {
            Ok(context) => {
                auth_metrics::record_validation(&issuer, "success");
                self.audit.log(AuthEvent::TokenValidated {
                    subject: context.subject.clone(),
                    issuer: context.issuer.clone(),
                });
            }
            Err(e) => self.record_failure(Some(&issuer), e),
        }

        result
    }

    fn record_failure(&self, issuer: Option<&str>, error: &AuthError) {
        let label = match (issuer, error) {
            (Some(issuer), e) if !matches!(e, AuthError::UnknownIssuer { .. }) => issuer,
            _ => "unknown",
        };
        auth_metrics::record_validation(label, error.kind());

        self.audit.log(AuthEvent::ValidationFailed {
            issuer: issuer.map(str::to_owned),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        });
    }

    /// Resolve a session identifier, falling back to the legacy collaborator.
    ///
    /// A stored session whose issuer has since been disabled is refused.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SessionNotFound`] if neither the store nor the fallback
    ///   knows the identifier
    /// - [`AuthError::IssuerDisabled`] / [`AuthError::UnknownIssuer`] if the
    ///   session's issuer is no longer acceptable
    /// - [`AuthError::Store`] on backend failure
    pub async fn validate_session(&self, session_id: &SessionId) -> Result<UserContext> {
        if let Some(context) = self.sessions.get(session_id).await? {
            self.enabled_verifier(&context.issuer)?;
            return Ok(context);
        }

        if let (Some(fallback), Some(issuer)) = (&self.legacy, &self.legacy_issuer)
            && let Some(identity) = fallback.recover(session_id.as_str()).await
        {
            let verifier = self.enabled_verifier(issuer)?;
            let now = self.clock.now_secs();

            let context = UserContext::builder()
                .subject(identity.subject)
                .issuer(issuer.clone())
                .display(identity.display)
                .permissions(verifier.map_permissions(&identity.native_permissions))
                .expires_at(now.saturating_add(self.session_ttl_secs))
                .authenticated_at(now)
                .build()
                .map_err(|_| AuthError::SessionNotFound)?;

            self.audit.log(AuthEvent::LegacySessionRecovered {
                subject: context.subject.clone(),
                issuer: issuer.clone(),
            });
            return Ok(context);
        }

        debug!(session = %audit::fingerprint(session_id.as_str()), "Session not found");
        Err(AuthError::SessionNotFound)
    }

    /// Validate `token` and persist the resulting context as a session.
    ///
    /// # Errors
    ///
    /// Any error of [`UnifiedRouter::validate`], or [`AuthError::Store`] if the
    /// session cannot be persisted.
    pub async fn establish_session(&self, token: &str) -> Result<(SessionId, UserContext)> {
        let context = self.validate(token).await?;
        let id = self.sessions.create(context.clone()).await?;

        self.audit.log(AuthEvent::SessionCreated {
            subject: context.subject.clone(),
            issuer: context.issuer.clone(),
            session: audit::fingerprint(id.as_str()),
        });
        Ok((id, context))
    }

    /// End a session. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`] on backend failure.
    pub async fn logout(&self, session_id: &SessionId) -> Result<bool> {
        let deleted = self.sessions.delete(session_id).await?;
        if deleted {
            self.audit.log(AuthEvent::SessionTerminated {
                subject: None,
                session: audit::fingerprint(session_id.as_str()),
                reason: "logout".to_string(),
            });
        }
        Ok(deleted)
    }

    /// Enable or disable an issuer at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownIssuer`] if the issuer is not configured.
    pub fn set_issuer_enabled(&self, issuer: &str, enabled: bool) -> Result<()> {
        let entry = self
            .issuers
            .get(issuer)
            .ok_or_else(|| AuthError::UnknownIssuer {
                issuer: issuer.to_string(),
            })?;

        let previous = entry.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(issuer, enabled, "Issuer state changed");
        }
        Ok(())
    }

    /// Configured issuers, sorted by identifier.
    pub fn issuers(&self) -> Vec<IssuerStatus> {
        let mut issuers: Vec<IssuerStatus> = self
            .issuers
            .iter()
            .map(|(issuer, entry)| IssuerStatus {
                issuer: issuer.clone(),
                enabled: entry.enabled.load(Ordering::Acquire),
            })
            .collect();
        issuers.sort_by(|a, b| a.issuer.cmp(&b.issuer));
        issuers
    }
}

/// Builder for [`UnifiedRouter`]
#[derive(Default)]
pub struct UnifiedRouterBuilder {
    issuers: Vec<(Arc<dyn IssuerVerifier>, bool)>,
    sessions: Option<Arc<dyn SessionStore>>,
    session_config: SessionConfig,
    legacy: Option<Arc<dyn LegacySessionFallback>>,
    legacy_issuer: Option<String>,
    clock: Option<Arc<dyn Clock>>,
    audit: Option<AuditLogger>,
}

impl UnifiedRouterBuilder {
    /// Register an issuer verifier
    pub fn issuer(mut self, verifier: Arc<dyn IssuerVerifier>, enabled: bool) -> Self {
        self.issuers.push((verifier, enabled));
        self
    }

    /// Use a custom session backend
    pub fn sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Session TTL, used for the default in-memory store and legacy sessions
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Issuer that legacy identities are attributed to
    pub fn legacy_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.legacy_issuer = Some(issuer.into());
        self
    }

    /// Legacy session decryption collaborator.
    ///
    /// Only consulted when a legacy issuer is configured.
    pub fn legacy_fallback(mut self, fallback: Arc<dyn LegacySessionFallback>) -> Self {
        self.legacy = Some(fallback);
        self
    }

    /// Time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Audit sink
    pub fn audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the router
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] on duplicate issuers or an unknown
    /// legacy issuer.
    pub fn build(self) -> std::result::Result<UnifiedRouter, ConfigError> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let mut issuers = HashMap::with_capacity(self.issuers.len());
        for (verifier, enabled) in self.issuers {
            let id = verifier.issuer().to_string();
            if issuers.contains_key(&id) {
                return Err(ConfigError::Invalid(format!("duplicate issuer '{id}'")));
            }
            issuers.insert(
                id,
                IssuerEntry {
                    verifier,
                    enabled: AtomicBool::new(enabled),
                },
            );
        }

        if let Some(legacy) = &self.legacy_issuer
            && !issuers.contains_key(legacy)
        {
            return Err(ConfigError::Invalid(format!(
                "legacy_issuer '{legacy}' is not a configured issuer"
            )));
        }

        let sessions = self.sessions.unwrap_or_else(|| {
            Arc::new(MemorySessionStore::new(
                self.session_config,
                Arc::clone(&clock),
            ))
        });

        Ok(UnifiedRouter {
            issuers,
            sessions,
            legacy: self.legacy,
            legacy_issuer: self.legacy_issuer,
            session_ttl_secs: self.session_config.ttl_secs,
            clock,
            audit: self.audit.unwrap_or_default(),
        })
    }
}
