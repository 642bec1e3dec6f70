//! Shared fixtures for unit tests.
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

pub const CHALLENGE_KEY_PEM: &str = include_str!("../tests/fixtures/challenge_key.pem");
pub const ROTATED_KEY_PEM: &str = include_str!("../tests/fixtures/rotated_key.pem");
pub const CONSENT_KEY_PEM: &str = include_str!("../tests/fixtures/consent_key.pem");

pub const CHALLENGE_PUBLIC_JWKS: &str = include_str!("../tests/fixtures/challenge_public.json");
pub const CONSENT_PRIVATE_JWKS: &str = include_str!("../tests/fixtures/consent_private.json");

pub fn challenge_private_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(CHALLENGE_KEY_PEM).unwrap()
}

pub fn rotated_private_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(ROTATED_KEY_PEM).unwrap()
}

pub fn consent_private_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(CONSENT_KEY_PEM).unwrap()
}

/// Claims of a well-formed challenge expiring `ttl_secs` from now.
pub fn challenge_claims(ttl_secs: i64) -> Value {
    json!({
        "aud": "app-1",
        "redir": "https://app.example/cb",
        "scp": ["openid", "profile"],
        "exp": Utc::now().timestamp() + ttl_secs,
        "iat": Utc::now().timestamp(),
        "jti": "challenge-1",
    })
}

/// Sign `claims` as the authorization server would (RS256).
pub fn sign_challenge(claims: &Value, pem: &str) -> String {
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}
