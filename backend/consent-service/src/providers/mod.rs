//! Authentication providers.
//!
//! A provider establishes who the user is before a challenge is bound to them.
//! The consent flow only sees the user name it returns.
mod basic_auth;

pub use basic_auth::{Argon2Verifier, BasicAuth, PasswordVerifier};

use axum::http::HeaderMap;

use crate::error::Result;

pub trait Provider: Send + Sync {
    /// Authenticate the request from its headers and return the user name.
    /// Any failure is `IdpError::AuthenticationFailure`.
    fn check(&self, headers: &HeaderMap) -> Result<String>;

    /// Value of the `WWW-Authenticate` header sent with a 401.
    fn challenge_header(&self) -> String;
}
