//! Gateway configuration
//!
//! Loaded once at startup from TOML, YAML or JSON, with environment overrides:
//!
//! ```toml
//! legacy_issuer = "https://legacy.example.com"
//!
//! [cache]
//! ttl_secs = 30
//! grace_multiplier = 5
//!
//! [[issuers]]
//! issuer = "https://sso.example.com"
//! audiences = ["api"]
//! verification_endpoint = "https://sso.example.com/api/me"
//! permission_map = [
//!     { native = "Edit X", canonical = "app.x.write" },
//! ]
//!
//! [[issuers.keys]]
//! kid = "2024-01"
//! pem_file = "/etc/issuergate/sso.pem"
//! ```
//!
//! `ISSUERGATE__SESSIONS__TTL_SECS=7200` overrides `sessions.ttl_secs`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backwards::BackwardsVerificationConfig;
use crate::jwt::validator::is_asymmetric;
use crate::permissions::PermissionPolicy;
use crate::session::SessionConfig;
use crate::verification_cache::VerificationCacheConfig;
use crate::verifier::DEFAULT_PERMISSIONS_CLAIM;

/// Default environment variable prefix
pub const ENV_PREFIX: &str = "ISSUERGATE";

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// Semantically invalid configuration
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A trust key could not be loaded
    #[error("Invalid key for issuer '{issuer}': {reason}")]
    InvalidKey {
        /// Issuer the key belongs to
        issuer: String,
        /// Parser message (never key bytes)
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Public key algorithm family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// RSA (RS*/PS*)
    #[default]
    Rsa,
    /// Elliptic curve (ES*)
    Ec,
}

/// One trusted public key, inline or on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustKeyConfig {
    /// Key id matched against the token header `kid`
    #[serde(default)]
    pub kid: Option<String>,
    /// Key family
    #[serde(default)]
    pub kind: KeyKind,
    /// Inline PEM
    #[serde(default)]
    pub pem: Option<String>,
    /// Path to a PEM file
    #[serde(default)]
    pub pem_file: Option<PathBuf>,
}

/// One native → canonical permission mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Issuer's permission string
    pub native: String,
    /// Canonical permission
    pub canonical: String,
}

/// Trusted issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Identifier, compared exactly against `iss`
    pub issuer: String,

    /// Accepted `aud` values
    pub audiences: Vec<String>,

    /// Trust material
    pub keys: Vec<TrustKeyConfig>,

    /// Allowed signing algorithms
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,

    /// Authoritative endpoint for backwards verification
    #[serde(default)]
    pub verification_endpoint: Option<Url>,

    /// Tokens minted by this system; never backwards-verified
    #[serde(default)]
    pub self_issued: bool,

    /// Initial enabled state
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Native → canonical table
    #[serde(default)]
    pub permission_map: Vec<PermissionRule>,

    /// Claim carrying native permissions
    #[serde(default = "default_permissions_claim")]
    pub permissions_claim: String,

    /// Clock skew tolerance for `exp`/`nbf`
    #[serde(default)]
    pub leeway_secs: u64,
}

impl IssuerConfig {
    /// Minimal issuer with defaults for everything optional.
    pub fn new(issuer: impl Into<String>, audiences: Vec<String>, keys: Vec<TrustKeyConfig>) -> Self {
        Self {
            issuer: issuer.into(),
            audiences,
            keys,
            algorithms: default_algorithms(),
            verification_endpoint: None,
            self_issued: false,
            enabled: true,
            permission_map: Vec::new(),
            permissions_claim: default_permissions_claim(),
            leeway_secs: 0,
        }
    }

    /// The mapping table as a lookup map. Later rules win on duplicates.
    pub fn permission_table(&self) -> HashMap<String, String> {
        self.permission_map
            .iter()
            .map(|rule| (rule.native.clone(), rule.canonical.clone()))
            .collect()
    }

    /// True when tokens are re-confirmed with the issuer.
    pub fn requires_backwards_verification(&self) -> bool {
        self.verification_endpoint.is_some() && !self.self_issued
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let issuer = &self.issuer;
        let invalid = |msg: &str| ConfigError::Invalid(format!("issuer '{issuer}': {msg}"));

        if issuer.trim().is_empty() {
            return Err(ConfigError::Invalid("issuer identifier is empty".to_string()));
        }
        if self.audiences.is_empty() {
            return Err(invalid("no accepted audiences"));
        }
        if self.keys.is_empty() {
            return Err(invalid("no trust keys"));
        }
        if self.algorithms.is_empty() {
            return Err(invalid("no allowed algorithms"));
        }
        if let Some(alg) = self.algorithms.iter().find(|alg| !is_asymmetric(**alg)) {
            return Err(invalid(&format!("symmetric algorithm {alg:?} is not allowed")));
        }
        for key in &self.keys {
            if key.pem.is_some() == key.pem_file.is_some() {
                return Err(invalid("each key needs exactly one of pem or pem_file"));
            }
        }
        if let Some(endpoint) = &self.verification_endpoint
            && !matches!(endpoint.scheme(), "http" | "https")
        {
            return Err(invalid("verification_endpoint must be http or https"));
        }
        if self.permission_map.iter().any(|rule| rule.native.trim().is_empty()) {
            return Err(invalid("permission rule with empty native value"));
        }
        Ok(())
    }
}

/// Audit settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Service name attached to audit records
    pub service_name: String,
    /// Hash subject identifiers in audit records
    pub hash_identifiers: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            service_name: "issuergate".to_string(),
            hash_identifiers: false,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Trusted issuers
    #[serde(default)]
    pub issuers: Vec<IssuerConfig>,

    /// Permission mapping policy
    #[serde(default)]
    pub permissions: PermissionPolicy,

    /// Verification cache
    #[serde(default)]
    pub cache: VerificationCacheConfig,

    /// Sessions
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Authoritative endpoint calls
    #[serde(default)]
    pub backwards_verification: BackwardsVerificationConfig,

    /// Audit logging
    #[serde(default)]
    pub audit: AuditConfig,

    /// Issuer that legacy-session identities are attributed to
    #[serde(default)]
    pub legacy_issuer: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The file format is auto-detected from the file extension. Environment
    /// variables with the `ISSUERGATE__` prefix override file settings, with
    /// `__` separating nested keys.
    ///
    /// The result is not validated; call [`GatewayConfig::validate`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`GatewayConfig::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse TOML text without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML or does
    /// not match the configuration schema.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let config = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Look up an issuer by identifier.
    pub fn issuer(&self, issuer: &str) -> Option<&IssuerConfig> {
        self.issuers.iter().find(|i| i.issuer == issuer)
    }

    /// Check semantic constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuers.is_empty() {
            return Err(ConfigError::Invalid("no issuers configured".to_string()));
        }

        let mut seen = HashSet::new();
        for issuer in &self.issuers {
            if !seen.insert(issuer.issuer.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate issuer '{}'",
                    issuer.issuer
                )));
            }
            issuer.validate()?;
        }

        if let Some(legacy) = &self.legacy_issuer
            && self.issuer(legacy).is_none()
        {
            return Err(ConfigError::Invalid(format!(
                "legacy_issuer '{legacy}' is not a configured issuer"
            )));
        }

        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be positive".to_string()));
        }
        if self.cache.grace_multiplier < 1 {
            return Err(ConfigError::Invalid(
                "cache.grace_multiplier must be at least 1".to_string(),
            ));
        }
        if self.sessions.ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "sessions.ttl_secs must be positive".to_string(),
            ));
        }
        if self.backwards_verification.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "backwards_verification.timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::RS256]
}

fn default_true() -> bool {
    true
}

fn default_permissions_claim() -> String {
    DEFAULT_PERMISSIONS_CLAIM.to_string()
}
