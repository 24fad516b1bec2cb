//! Signature verification against static trust material
//!
//! This is the first hard gate of issuer verification:
//! - Algorithm allowlist (asymmetric only, per issuer)
//! - Key selection by `kid`, or every compatible key when `kid` is absent
//! - Signature check with `jsonwebtoken`
//!
//! Only the signature is checked here. Claim checks (iss/aud/exp/nbf) run in
//! the issuer verifier after this gate passes.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Header, TokenData, Validation, decode};
use tracing::{debug, warn};

use super::TokenClaims;
use crate::config::{ConfigError, KeyKind, TrustKeyConfig};
use crate::error::{AuthError, MalformedReason, Result};

/// One trusted public key.
#[derive(Clone)]
pub struct TrustKey {
    kid: Option<String>,
    kind: KeyKind,
    key: DecodingKey,
}

// Manual Debug impl: key material stays out of logs
impl std::fmt::Debug for TrustKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustKey")
            .field("kid", &self.kid)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl TrustKey {
    /// Parses a PEM-encoded public key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKey`] when the PEM cannot be parsed as
    /// the declared key kind.
    pub fn from_pem(
        issuer: &str,
        kid: Option<String>,
        kind: KeyKind,
        pem: &[u8],
    ) -> std::result::Result<Self, ConfigError> {
        let key = match kind {
            KeyKind::Rsa => DecodingKey::from_rsa_pem(pem),
            KeyKind::Ec => DecodingKey::from_ec_pem(pem),
        }
        .map_err(|e| ConfigError::InvalidKey {
            issuer: issuer.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { kid, kind, key })
    }

    /// Loads a key from configuration, reading `pem_file` when set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, neither or both of
    /// `pem`/`pem_file` are set, or the PEM is invalid.
    pub fn from_config(
        issuer: &str,
        config: &TrustKeyConfig,
    ) -> std::result::Result<Self, ConfigError> {
        let pem = match (&config.pem, &config.pem_file) {
            (Some(pem), None) => pem.clone().into_bytes(),
            (None, Some(path)) => std::fs::read(path)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "issuer '{issuer}': each key needs exactly one of pem or pem_file"
                )));
            }
        };

        Self::from_pem(issuer, config.kid.clone(), config.kind, &pem)
    }

    fn supports(&self, algorithm: Algorithm) -> bool {
        match self.kind {
            KeyKind::Rsa => matches!(
                algorithm,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            KeyKind::Ec => matches!(algorithm, Algorithm::ES256 | Algorithm::ES384),
        }
    }
}

/// True for the algorithms an issuer may be configured with.
pub fn is_asymmetric(algorithm: Algorithm) -> bool {
    !matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

/// Verifies token signatures for one issuer.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    keys: Vec<TrustKey>,
    allowed_algorithms: Vec<Algorithm>,
}

impl SignatureVerifier {
    /// Creates a verifier over `keys`, accepting only `allowed_algorithms`.
    ///
    /// Symmetric algorithms are dropped from the allowlist: a shared secret
    /// is never trust material for a third-party issuer.
    pub fn new(keys: Vec<TrustKey>, allowed_algorithms: Vec<Algorithm>) -> Self {
        let allowed_algorithms = allowed_algorithms
            .into_iter()
            .filter(|alg| is_asymmetric(*alg))
            .collect();
        Self {
            keys,
            allowed_algorithms,
        }
    }

    /// Allowed algorithms.
    pub fn allowed_algorithms(&self) -> &[Algorithm] {
        &self.allowed_algorithms
    }

    /// Number of trusted keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Checks the signature and returns the header and claims.
    ///
    /// No claim is inspected here. The returned claims are signature-verified
    /// but not yet validated.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] if the header cannot be decoded or the
    ///   signed payload is not a claims object
    /// - [`AuthError::SignatureInvalid`] for a disallowed algorithm, unknown
    ///   `kid`, undecodable signature, or signature mismatch
    pub fn verify(&self, token: &str) -> Result<(Header, TokenClaims)> {
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode JWT header");
            AuthError::MalformedToken(MalformedReason::Encoding)
        })?;

        if !self.allowed_algorithms.contains(&header.alg) {
            warn!(
                algorithm = ?header.alg,
                allowed = ?self.allowed_algorithms,
                "JWT algorithm not allowed"
            );
            return Err(AuthError::SignatureInvalid);
        }

        let candidates: Vec<&TrustKey> = match header.kid.as_deref() {
            Some(kid) => self
                .keys
                .iter()
                .filter(|k| k.kid.as_deref() == Some(kid))
                .collect(),
            None => self.keys.iter().collect(),
        };

        if candidates.is_empty() {
            warn!(key_id = ?header.kid, "No trusted key matches JWT kid");
            return Err(AuthError::SignatureInvalid);
        }

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        for key in candidates.into_iter().filter(|k| k.supports(header.alg)) {
            match decode::<TokenClaims>(token, &key.key, &validation) {
                Ok(TokenData { header, claims }) => return Ok((header, claims)),
                Err(e) => match e.kind() {
                    ErrorKind::InvalidSignature => continue,
                    ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                        return Err(AuthError::MalformedToken(MalformedReason::Claims));
                    }
                    ErrorKind::InvalidToken => {
                        return Err(AuthError::MalformedToken(MalformedReason::Structure));
                    }
                    // The header already decoded, so a base64 failure here is
                    // the signature segment.
                    _ => {
                        debug!(error = %e, "JWT signature could not be checked");
                        return Err(AuthError::SignatureInvalid);
                    }
                },
            }
        }

        debug!(algorithm = ?header.alg, "JWT signature did not match any trusted key");
        Err(AuthError::SignatureInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use serde_json::json;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(vec![testutil::issuer_a_key()], vec![Algorithm::RS256])
    }

    #[test]
    fn test_valid_signature() {
        let token = testutil::mint(
            testutil::ISSUER_A_PRIVATE,
            None,
            &json!({"iss": "A", "sub": "u1"}),
        );
        let (header, claims) = verifier().verify(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(claims.sub.as_deref(), Some("u1"));
    }

    #[test]
    fn test_wrong_key_is_signature_invalid() {
        let token = testutil::mint(testutil::ROGUE_PRIVATE, None, &json!({"iss": "A"}));
        assert!(matches!(
            verifier().verify(&token),
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_tampered_signature_is_signature_invalid() {
        let token = testutil::mint(testutil::ISSUER_A_PRIVATE, None, &json!({"iss": "A"}));
        let tampered = testutil::tamper_signature(&token);
        assert!(matches!(
            verifier().verify(&tampered),
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_disallowed_algorithm() {
        let verifier =
            SignatureVerifier::new(vec![testutil::issuer_a_key()], vec![Algorithm::PS256]);
        let token = testutil::mint(testutil::ISSUER_A_PRIVATE, None, &json!({"iss": "A"}));
        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_symmetric_algorithms_are_dropped() {
        let verifier = SignatureVerifier::new(
            vec![testutil::issuer_a_key()],
            vec![Algorithm::HS256, Algorithm::RS256],
        );
        assert_eq!(verifier.allowed_algorithms(), &[Algorithm::RS256]);
    }

    #[test]
    fn test_kid_selects_key() {
        let keys = vec![
            testutil::key_with_kid(testutil::ROGUE_PUBLIC, "old"),
            testutil::key_with_kid(testutil::ISSUER_A_PUBLIC, "current"),
        ];
        let verifier = SignatureVerifier::new(keys, vec![Algorithm::RS256]);

        let token = testutil::mint(
            testutil::ISSUER_A_PRIVATE,
            Some("current"),
            &json!({"iss": "A"}),
        );
        assert!(verifier.verify(&token).is_ok());

        let unknown = testutil::mint(
            testutil::ISSUER_A_PRIVATE,
            Some("missing"),
            &json!({"iss": "A"}),
        );
        assert!(matches!(
            verifier.verify(&unknown),
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_no_kid_tries_every_key() {
        let keys = vec![
            testutil::key_with_kid(testutil::ROGUE_PUBLIC, "old"),
            testutil::key_with_kid(testutil::ISSUER_A_PUBLIC, "current"),
        ];
        let verifier = SignatureVerifier::new(keys, vec![Algorithm::RS256]);
        let token = testutil::mint(testutil::ISSUER_A_PRIVATE, None, &json!({"iss": "A"}));
        assert!(verifier.verify(&token).is_ok());
    }

    #[test]
    fn test_invalid_pem_is_config_error() {
        let err = TrustKey::from_pem("A", None, KeyKind::Rsa, b"not a pem").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey { .. }));
    }
}
