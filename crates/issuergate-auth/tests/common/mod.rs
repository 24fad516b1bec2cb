//! Common test utilities for integration tests
//!
//! Fixture RSA keys for two issuers plus a rogue signer, token minting, and a
//! wiremock stand-in for an issuer's authoritative endpoint.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use issuergate_auth::config::PermissionRule;
use issuergate_auth::{GatewayConfig, IssuerConfig, ManualClock, TrustKeyConfig, UnifiedRouter};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const NOW: u64 = 1_700_000_000;

pub const ISSUER_A_PRIVATE: &str = include_str!("../../testdata/issuer_a_private.pem");
pub const ISSUER_A_PUBLIC: &str = include_str!("../../testdata/issuer_a_public.pem");
pub const ISSUER_B_PRIVATE: &str = include_str!("../../testdata/issuer_b_private.pem");
pub const ISSUER_B_PUBLIC: &str = include_str!("../../testdata/issuer_b_public.pem");
pub const ROGUE_PRIVATE: &str = include_str!("../../testdata/rogue_private.pem");

/// Sign `claims` with RS256.
pub fn mint(private_pem: &str, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("fixture key");
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key).expect("encode")
}

/// Well-formed claims for `issuer`, valid for ten minutes after [`NOW`].
pub fn claims(issuer: &str) -> Value {
    json!({
        "iss": issuer,
        "sub": "u1",
        "aud": "api",
        "iat": NOW,
        "exp": NOW + 600,
        "permissions": ["Edit X"],
        "email": "u1@example.com",
    })
}

/// Flip one byte of the decoded signature.
pub fn tamper_signature(token: &str) -> String {
    let (signed, signature) = token.rsplit_once('.').expect("three segments");
    let mut bytes = URL_SAFE_NO_PAD.decode(signature).expect("base64 signature");
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x01;
    format!("{signed}.{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Issuer trusting `public_pem`, accepting audience `api`, mapping "Edit X".
pub fn issuer(name: &str, public_pem: &str) -> IssuerConfig {
    let key = TrustKeyConfig {
        kid: None,
        kind: Default::default(),
        pem: Some(public_pem.to_string()),
        pem_file: None,
    };
    let mut config = IssuerConfig::new(name, vec!["api".to_string()], vec![key]);
    config.permission_map = vec![PermissionRule {
        native: "Edit X".to_string(),
        canonical: "app.x.write".to_string(),
    }];
    config
}

/// Gateway with issuer "A" enabled and "B" disabled.
pub fn two_issuers() -> GatewayConfig {
    let mut b = issuer("B", ISSUER_B_PUBLIC);
    b.enabled = false;
    GatewayConfig {
        issuers: vec![issuer("A", ISSUER_A_PUBLIC), b],
        ..Default::default()
    }
}

/// Router over `config` with a manual clock at [`NOW`].
pub fn router(config: &GatewayConfig) -> (UnifiedRouter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(NOW));
    let router =
        UnifiedRouter::from_config_with_clock(config, clock.clone()).expect("valid gateway config");
    (router, clock)
}

/// Authoritative endpoint stand-in.
pub struct MockIssuerEndpoint {
    pub server: MockServer,
}

impl MockIssuerEndpoint {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("{}/api/me", self.server.uri())).expect("mock url")
    }

    /// Respond 200 and expect exactly `calls` requests.
    pub async fn confirm(&self, calls: u64) {
        Mock::given(method("GET"))
            .and(path("/api/me"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1"})))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Respond with `status`.
    pub async fn respond(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/api/me"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Respond 200 after `delay`.
    pub async fn stall(&self, delay: Duration) {
        Mock::given(method("GET"))
            .and(path("/api/me"))
            .respond_with(ResponseTemplate::new(200).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Drop every mock so the next call answers 404.
    pub async fn reset(&self) {
        self.server.reset().await;
    }
}
