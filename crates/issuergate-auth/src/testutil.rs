//! Fixture keys and token minting for unit tests.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};

use crate::config::KeyKind;
use crate::jwt::TrustKey;

pub const ISSUER_A_PRIVATE: &str = include_str!("../testdata/issuer_a_private.pem");
pub const ISSUER_A_PUBLIC: &str = include_str!("../testdata/issuer_a_public.pem");
pub const ROGUE_PRIVATE: &str = include_str!("../testdata/rogue_private.pem");
pub const ROGUE_PUBLIC: &str = include_str!("../testdata/rogue_public.pem");

pub fn mint(private_pem: &str, kid: Option<&str>, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_owned);
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

pub fn issuer_a_key() -> TrustKey {
    TrustKey::from_pem("A", None, KeyKind::Rsa, ISSUER_A_PUBLIC.as_bytes()).unwrap()
}

pub fn key_with_kid(public_pem: &str, kid: &str) -> TrustKey {
    TrustKey::from_pem("A", Some(kid.to_string()), KeyKind::Rsa, public_pem.as_bytes()).unwrap()
}

/// Flips one byte in the middle of the decoded signature.
pub fn tamper_signature(token: &str) -> String {
    let (signed, signature) = token.rsplit_once('.').unwrap();
    let mut bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x01;
    format!("{signed}.{}", URL_SAFE_NO_PAD.encode(bytes))
}
