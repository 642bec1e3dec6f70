// Shared helpers for integration tests: key fixtures, challenge signing and a
// wiremock stand-in for the authorization server.
#![allow(dead_code)]

use chrono::Utc;
use consent_service::IdpConfig;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{basic_auth, bearer_token, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "consent-app";
pub const CLIENT_SECRET: &str = "consent-secret";
pub const ACCESS_TOKEN: &str = "hydra-access-token";

pub const CHALLENGE_KEY_PEM: &str = include_str!("../fixtures/challenge_key.pem");
pub const ROTATED_KEY_PEM: &str = include_str!("../fixtures/rotated_key.pem");
pub const CONSENT_KEY_PEM: &str = include_str!("../fixtures/consent_key.pem");

pub const CHALLENGE_PUBLIC_JWKS: &str = include_str!("../fixtures/challenge_public.json");
pub const ROTATED_PUBLIC_JWKS: &str = include_str!("../fixtures/rotated_public.json");
pub const CONSENT_PRIVATE_JWKS: &str = include_str!("../fixtures/consent_private.json");

pub const CHALLENGE_KEYS_PATH: &str = "/keys/consent.challenge/public";
pub const CONSENT_KEYS_PATH: &str = "/keys/consent.endpoint/private";

pub fn private_key(pem: &str) -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(pem).unwrap()
}

pub fn jwks(document: &str) -> Value {
    serde_json::from_str(document).unwrap()
}

pub fn config_for(server: &MockServer) -> IdpConfig {
    let mut config = IdpConfig::new(CLIENT_ID, CLIENT_SECRET, server.uri());
    config.request_timeout = Duration::from_secs(5);
    config
}

/// Claims of a well-formed challenge expiring `ttl_secs` from now.
pub fn challenge_claims(ttl_secs: i64) -> Value {
    json!({
        "aud": "app-1",
        "redir": "https://app.example/cb",
        "scp": ["openid", "profile"],
        "exp": Utc::now().timestamp() + ttl_secs,
        "iat": Utc::now().timestamp(),
    })
}

pub fn sign_challenge(claims: &Value, pem: &str) -> String {
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

pub async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(basic_auth(CLIENT_ID, CLIENT_SECRET))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("scope=core+hydra.keys.get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "token_type": "bearer",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

pub async fn mount_key_set(server: &MockServer, key_path: &str, document: &str) {
    Mock::given(method("GET"))
        .and(path(key_path))
        .and(bearer_token(ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(document)))
        .mount(server)
        .await;
}

/// Authorization server publishing both consent key sets.
pub async fn hydra() -> MockServer {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    mount_key_set(&server, CHALLENGE_KEYS_PATH, CHALLENGE_PUBLIC_JWKS).await;
    mount_key_set(&server, CONSENT_KEYS_PATH, CONSENT_PRIVATE_JWKS).await;
    server
}
