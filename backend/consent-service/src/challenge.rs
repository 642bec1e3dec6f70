//! Pending consent decisions.
//!
//! A [`Challenge`] is built from a verified challenge token plus the user the
//! caller authenticated. It keeps a weak reference to the
//! [`IdentityProvider`] that created it, used to reach the consent signing key
//! and the challenge store; the provider outlives every challenge and is never
//! kept alive by one.
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use url::Url;

use crate::codec::ChallengeClaims;
use crate::error::{IdpError, Result};
use crate::idp::IdentityProvider;

/// Query parameter carrying the consent response on the redirect.
pub const CONSENT_PARAM: &str = "consent";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    client: String,
    redirect: String,
    user: String,
    scopes: Vec<String>,
    expires: DateTime<Utc>,

    #[serde(skip)]
    idp: Weak<IdentityProvider>,
}

/// Claims of the signed consent response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentClaims {
    pub aud: String,
    pub sub: String,
    pub scp: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Challenge {
    /// Build from verified claims. Fails with `ChallengeExpired` unless `exp`
    /// is strictly in the future.
    pub(crate) fn from_claims(
        claims: ChallengeClaims,
        user: &str,
        idp: Weak<IdentityProvider>,
    ) -> Result<Self> {
        let expires = claims.expires_at()?;
        if expires <= Utc::now() {
            return Err(IdpError::ChallengeExpired);
        }

        Ok(Self {
            client: claims.aud,
            redirect: claims.redir,
            user: user.to_string(),
            scopes: claims.scp,
            expires,
            idp,
        })
    }

    /// Restore from its stored form, re-checking expiry.
    pub(crate) fn from_stored(bytes: &[u8], idp: Weak<IdentityProvider>) -> Result<Self> {
        let mut challenge: Challenge =
            serde_json::from_slice(bytes).map_err(|_| IdpError::BadChallengeCookie)?;
        if challenge.is_expired() {
            return Err(IdpError::ChallengeExpired);
        }
        challenge.idp = idp;
        Ok(challenge)
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn redirect(&self) -> &str {
        &self.redirect
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn is_expired(&self) -> bool {
        self.expires <= Utc::now()
    }

    fn idp(&self) -> Result<Arc<IdentityProvider>> {
        self.idp.upgrade().ok_or(IdpError::NotConnected)
    }

    /// Persist under `session_id` so a later request can pick it up.
    pub async fn save(&self, session_id: &str) -> Result<()> {
        self.idp()?.store_challenge(session_id, self).await
    }

    /// Remove the stored copy once the decision has been made.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        self.idp()?.delete_challenge(session_id).await
    }

    /// Grant every requested scope. Returns the URL to redirect the user to.
    pub async fn grant_access_to_all(&self) -> Result<String> {
        let scopes = self.scopes.clone();
        self.grant(scopes).await
    }

    /// Grant a subset of the requested scopes.
    pub async fn grant_access_to_scopes(&self, scopes: &[String]) -> Result<String> {
        if let Some(unknown) = scopes.iter().find(|s| !self.scopes.contains(s)) {
            debug!(client = %self.client, scope = %unknown, "Grant for scope that was not requested");
            return Err(IdpError::BadRequest);
        }
        self.grant(scopes.to_vec()).await
    }

    /// Deny the request. Returns the URL to redirect the user to.
    pub fn refuse_access(&self) -> Result<String> {
        info!(client = %self.client, user = %self.user, "Consent refused");
        self.redirect_with_consent("false")
    }

    async fn grant(&self, scopes: Vec<String>) -> Result<String> {
        let idp = self.idp()?;
        let signing_key = idp.consent_key().await?;

        let now = Utc::now();
        let lifetime = idp.config().consent_token_ttl;
        let expires = ChronoDuration::from_std(lifetime)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or(IdpError::ConsentTokenLifetime(lifetime))?;
        let claims = ConsentClaims {
            aud: self.client.clone(),
            sub: self.user.clone(),
            scp: scopes,
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };

        let der = signing_key.to_pkcs1_der()?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());
        let consent = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)?;

        info!(
            client = %self.client,
            user = %self.user,
            scopes = ?claims.scp,
            "Consent granted"
        );

        self.redirect_with_consent(&consent)
    }

    fn redirect_with_consent(&self, consent: &str) -> Result<String> {
        let mut url = Url::parse(&self.redirect)?;
        url.query_pairs_mut().append_pair(CONSENT_PARAM, consent);
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdpConfig;
    use crate::keys::{KeyMaterial, KeyRole};
    use crate::store::MemoryChallengeStore;
    use crate::test_utils;

    fn claims(ttl_secs: i64) -> ChallengeClaims {
        serde_json::from_value(test_utils::challenge_claims(ttl_secs)).unwrap()
    }

    #[test]
    fn test_from_claims_binds_caller_user() {
        let challenge = Challenge::from_claims(claims(300), "alice", Weak::new()).unwrap();

        assert_eq!(challenge.client(), "app-1");
        assert_eq!(challenge.redirect(), "https://app.example/cb");
        assert_eq!(challenge.scopes(), ["openid", "profile"]);
        assert_eq!(challenge.user(), "alice");
        assert!(!challenge.is_expired());
    }

    #[test]
    fn test_from_claims_rejects_past_expiry() {
        let err = Challenge::from_claims(claims(-1), "alice", Weak::new()).unwrap_err();
        assert!(matches!(err, IdpError::ChallengeExpired));
    }

    #[test]
    fn test_from_claims_rejects_expiry_now() {
        let mut c = claims(0);
        c.exp = Utc::now().timestamp();
        assert!(matches!(
            Challenge::from_claims(c, "alice", Weak::new()),
            Err(IdpError::ChallengeExpired)
        ));
    }

    #[test]
    fn test_stored_form_skips_provider_reference() {
        let challenge = Challenge::from_claims(claims(300), "alice", Weak::new()).unwrap();
        let stored = serde_json::to_value(&challenge).unwrap();

        assert_eq!(stored["client"], "app-1");
        assert_eq!(stored["user"], "alice");
        assert!(stored.get("idp").is_none());

        let bytes = serde_json::to_vec(&challenge).unwrap();
        let restored = Challenge::from_stored(&bytes, Weak::new()).unwrap();
        assert_eq!(restored.scopes(), challenge.scopes());
        assert_eq!(restored.expires(), challenge.expires());
    }

    #[test]
    fn test_from_stored_rejects_garbage() {
        assert!(matches!(
            Challenge::from_stored(b"{\"client\":1}", Weak::new()),
            Err(IdpError::BadChallengeCookie)
        ));
    }

    #[test]
    fn test_refuse_access_redirect() {
        let challenge = Challenge::from_claims(claims(300), "alice", Weak::new()).unwrap();
        assert_eq!(
            challenge.refuse_access().unwrap(),
            "https://app.example/cb?consent=false"
        );
    }

    #[tokio::test]
    async fn test_grant_without_provider() {
        let challenge = Challenge::from_claims(claims(300), "alice", Weak::new()).unwrap();
        assert!(matches!(
            challenge.grant_access_to_all().await,
            Err(IdpError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_grant_with_unrepresentable_lifetime() {
        let mut config = IdpConfig::new("idp", "secret", "https://hydra.local");
        config.consent_token_ttl = std::time::Duration::from_secs(u64::MAX);
        let idp = IdentityProvider::new(config, Arc::new(MemoryChallengeStore::default()));
        idp.key_cache()
            .set(
                KeyRole::ConsentSigning,
                KeyMaterial::from(test_utils::consent_private_key()),
                std::time::Duration::from_secs(60),
            )
            .await;

        let challenge = Challenge::from_claims(claims(300), "alice", Arc::downgrade(&idp)).unwrap();
        assert!(matches!(
            challenge.grant_access_to_all().await,
            Err(IdpError::ConsentTokenLifetime(_))
        ));
    }

    #[tokio::test]
    async fn test_grant_unrequested_scope() {
        let challenge = Challenge::from_claims(claims(300), "alice", Weak::new()).unwrap();
        let err = challenge
            .grant_access_to_scopes(&["admin".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, IdpError::BadRequest));
    }
}
