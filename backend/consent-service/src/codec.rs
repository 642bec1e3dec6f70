//! Consent challenge token verification.
//!
//! Challenges are JWTs issued by the authorization server and signed with the
//! private half of the `consent.challenge` key set. Verification:
//!
//! 1. parse the header; only RSA PKCS#1 v1.5 signatures (RS256/384/512) are
//!    accepted, so symmetric and other algorithms are rejected before any key
//!    is looked up
//! 2. verify the signature with the cached verification key
//! 3. decode the claims into [`ChallengeClaims`]; a missing or mistyped claim
//!    fails the whole decode
//!
//! Expiry is not checked here. The caller compares `exp` against the clock and
//! reports [`IdpError::ChallengeExpired`].
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use rsa::pkcs1::EncodeRsaPublicKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IdpError, Result};
use crate::keys::KeyCache;

const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Claims carried by a consent challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeClaims {
    /// Client (audience) asking for consent
    pub aud: String,
    /// Where the consent response is sent
    pub redir: String,
    /// Requested scopes, in order
    pub scp: Vec<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl ChallengeClaims {
    pub fn expires_at(&self) -> Result<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .ok_or_else(|| IdpError::InvalidToken(format!("exp out of range: {}", self.exp)))
    }

    fn validate(&self) -> Result<()> {
        if self.aud.is_empty() {
            return Err(IdpError::InvalidToken("empty audience".to_string()));
        }
        if self.redir.is_empty() {
            return Err(IdpError::InvalidToken("empty redirect".to_string()));
        }
        Ok(())
    }
}

/// Verify `token` against the cached verification key and return its claims.
pub async fn verify_challenge(token: &str, keys: &KeyCache) -> Result<ChallengeClaims> {
    let header = decode_header(token)?;
    if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
        return Err(IdpError::SigningMethod(format!("{:?}", header.alg)));
    }

    let public_key = keys.verification_key().await?;
    let der = public_key.to_pkcs1_der()?;
    let decoding_key = DecodingKey::from_rsa_der(der.as_bytes());

    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "aud"]);

    let data = decode::<ChallengeClaims>(token, &decoding_key, &validation)?;
    data.claims.validate()?;

    debug!(
        client = %data.claims.aud,
        kid = ?header.kid,
        "Challenge signature verified"
    );

    Ok(data.claims)
}
