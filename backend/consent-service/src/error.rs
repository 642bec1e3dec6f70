use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::keys::KeyRole;

pub type Result<T> = std::result::Result<T, IdpError>;

#[derive(Debug, Error)]
pub enum IdpError {
    #[error("Authentication failed")]
    AuthenticationFailure,

    #[error("No {0} key in cache")]
    NoKey(KeyRole),

    #[error("Cached {0} key has the wrong type")]
    BadKey(KeyRole),

    #[error("Missing challenge in request")]
    BadRequest,

    #[error("Challenge expired")]
    ChallengeExpired,

    #[error("Missing or malformed challenge cookie")]
    BadChallengeCookie,

    #[error("Unexpected signing method: {0}")]
    SigningMethod(String),

    #[error("Invalid challenge token: {0}")]
    InvalidToken(String),

    #[error("Not connected to the authorization server")]
    NotConnected,

    #[error("Token request rejected ({status}): {body}")]
    TokenRequest { status: u16, body: String },

    #[error("Key set {0} is empty")]
    EmptyKeySet(String),

    #[error("Unsupported key type: {0}")]
    UnsupportedKey(String),

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Challenge store error: {0}")]
    Store(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Consent token lifetime out of range: {0:?}")]
    ConsentTokenLifetime(std::time::Duration),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Rsa(#[from] rsa::Error),

    #[error(transparent)]
    Pkcs1(#[from] rsa::pkcs1::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IdpError {
    /// HTTP status for the consent endpoints.
    pub fn status_code(&self) -> StatusCode {
        match self {
            IdpError::AuthenticationFailure => StatusCode::UNAUTHORIZED,
            IdpError::BadRequest | IdpError::BadChallengeCookie => StatusCode::BAD_REQUEST,
            IdpError::ChallengeExpired
            | IdpError::SigningMethod(_)
            | IdpError::InvalidToken(_)
            | IdpError::Jwt(_) => StatusCode::FORBIDDEN,
            IdpError::NoKey(_) | IdpError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            IdpError::TokenRequest { .. } | IdpError::Http(_) => StatusCode::BAD_GATEWAY,
            IdpError::BadKey(_)
            | IdpError::EmptyKeySet(_)
            | IdpError::UnsupportedKey(_)
            | IdpError::MalformedKey(_)
            | IdpError::Store(_)
            | IdpError::PasswordHash(_)
            | IdpError::ConsentTokenLifetime(_)
            | IdpError::Json(_)
            | IdpError::Base64(_)
            | IdpError::Rsa(_)
            | IdpError::Pkcs1(_)
            | IdpError::Url(_)
            | IdpError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            IdpError::AuthenticationFailure => "authentication_failure",
            IdpError::NoKey(_) => "no_key",
            IdpError::BadKey(_) => "bad_key",
            IdpError::BadRequest => "bad_request",
            IdpError::ChallengeExpired => "challenge_expired",
            IdpError::BadChallengeCookie => "bad_challenge_cookie",
            IdpError::SigningMethod(_) | IdpError::InvalidToken(_) | IdpError::Jwt(_) => {
                "invalid_challenge"
            }
            IdpError::NotConnected => "not_connected",
            IdpError::TokenRequest { .. } | IdpError::Http(_) => "upstream_error",
            _ => "internal_error",
        }
    }
}

impl IntoResponse for IdpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Consent request failed");
        }

        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_errors_reject_the_flow() {
        assert_eq!(IdpError::BadRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(IdpError::ChallengeExpired.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            IdpError::BadChallengeCookie.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IdpError::SigningMethod("HS256".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_missing_key_is_unavailable_not_internal() {
        let err = IdpError::NoKey(KeyRole::Verification);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "no_key");
        assert_eq!(err.to_string(), "No verification key in cache");

        let err = IdpError::BadKey(KeyRole::ConsentSigning);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Cached consent signing key has the wrong type");
    }
}
