//! # issuergate-auth - Multi-Issuer Token Gateway
//!
//! Accepts signed tokens from several trusted issuers and turns each into one
//! normalized [`UserContext`] with canonical permissions.
//!
//! ## Flow
//!
//! ```text
//! token ─► UnifiedRouter ─(iss, unverified)─► IssuerVerifier
//!                                               │ signature, iss/aud, exp/nbf
//!                                               │ VerificationCache ─miss─► authoritative endpoint
//!                                               │ PermissionMapper
//!                                               ▼
//!                                          UserContext ─► SessionStore (optional)
//! ```
//!
//! ## Architecture
//!
//! - [`router`] - Issuer routing, enable/disable, session front door
//! - [`verifier`] - Per-issuer verification gates ([`IssuerVerifier`] trait)
//! - [`jwt`] - Claims types, unverified routing peek, signature checks
//! - [`backwards`] - Re-confirmation with the issuer's live system
//! - [`verification_cache`] - Short-TTL memo with degraded-mode grace window
//! - [`permissions`] - Native → canonical permission mapping
//! - [`session`] - Sliding-expiry session store and legacy fallback seam
//! - [`config`] - File + environment configuration
//! - [`audit`] - Structured audit events under `audit::auth`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use issuergate_auth::{GatewayConfig, UnifiedRouter};
//!
//! # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_file("gateway.toml")?;
//! let router = UnifiedRouter::from_config(&config)?;
//!
//! let ctx = router.validate(token).await?;
//! if ctx.has_permission("app.user.read") {
//!     println!("{} via {}", ctx.subject, ctx.issuer);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics` - Counters and histograms through the `metrics` facade
//!
//! ## Secrets
//!
//! Tokens, session identifiers and key material never appear in errors, logs
//! or `Debug` output. Session identifiers are logged as BLAKE3 fingerprints.

pub mod audit;
pub mod auth_metrics;
pub mod backwards;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod jwt;
pub mod permissions;
pub mod router;
pub mod session;
pub mod verification_cache;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testutil;

#[doc(inline)]
pub use auth_metrics::init_auth_metrics;

#[doc(inline)]
pub use error::{AuthError, BackwardsFailure, ClaimReason, MalformedReason, Result};

#[doc(inline)]
pub use context::{DisplayAttributes, UserContext, UserContextBuilder};

#[doc(inline)]
pub use config::{ConfigError, GatewayConfig, IssuerConfig, KeyKind, TrustKeyConfig};

#[doc(inline)]
pub use router::{IssuerStatus, UnifiedRouter, UnifiedRouterBuilder};

#[doc(inline)]
pub use verifier::{IssuerVerifier, JwtIssuerVerifier};

#[doc(inline)]
pub use backwards::{BackwardsOutcome, BackwardsVerifier, HttpBackwardsVerifier};

#[doc(inline)]
pub use permissions::{PermissionMapper, PermissionPolicy, PermissionSet};

#[doc(inline)]
pub use session::{
    LegacyIdentity, LegacySessionFallback, MemorySessionStore, SessionId, SessionStore,
};

#[doc(inline)]
pub use verification_cache::{VerificationCache, VerificationCacheEntry};

#[doc(inline)]
pub use clock::{Clock, ManualClock, SystemClock};
