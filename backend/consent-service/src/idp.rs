//! Identity provider facade.
//!
//! ## Lifecycle
//!
//! 1. [`IdentityProvider::new`]: build the key cache and its background tasks
//! 2. [`IdentityProvider::connect`]: client-credentials handshake, then prime
//!    both consent keys; any failure here must fail service startup
//! 3. per request: [`new_challenge`](IdentityProvider::new_challenge) /
//!    [`get_challenge`](IdentityProvider::get_challenge)
//! 4. [`IdentityProvider::close`]: drop the transport and flush the keys
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::challenge::Challenge;
use crate::codec;
use crate::config::IdpConfig;
use crate::error::{IdpError, Result};
use crate::keys::{HydraKeyFetcher, KeyCache, KeyFetcher, KeyRole};
use crate::store::{ChallengeStore, SESSION_COOKIE_NAME};
use crate::trust::{SessionSlot, TrustSession};

pub struct IdentityProvider {
    config: IdpConfig,
    session: SessionSlot,
    fetcher: Arc<dyn KeyFetcher>,
    keys: KeyCache,
    store: Arc<dyn ChallengeStore>,
}

impl IdentityProvider {
    /// Must be called inside a Tokio runtime (the key cache spawns tasks).
    pub fn new(config: IdpConfig, store: Arc<dyn ChallengeStore>) -> Arc<Self> {
        let session: SessionSlot = Arc::new(RwLock::new(None));
        let fetcher: Arc<dyn KeyFetcher> = Arc::new(HydraKeyFetcher::new(Arc::clone(&session)));
        let keys = KeyCache::new(
            config.key_cache_expiration,
            config.key_cache_cleanup_interval,
            Arc::clone(&fetcher),
        );

        Arc::new(Self {
            config,
            session,
            fetcher,
            keys,
            store,
        })
    }

    pub fn config(&self) -> &IdpConfig {
        &self.config
    }

    /// Authenticate with the authorization server and prime both keys.
    ///
    /// A failed handshake leaves no transport behind. A failed prime leaves the
    /// transport in place but the provider not ready; either key may be
    /// missing.
    pub async fn connect(&self) -> Result<()> {
        let session = match TrustSession::establish(&self.config).await {
            Ok(session) => session,
            Err(e) => {
                *self.session.write().await = None;
                return Err(e);
            }
        };
        *self.session.write().await = Some(Arc::new(session));

        for role in KeyRole::ALL {
            let key = match self.fetcher.fetch(role).await {
                Ok(key) => key,
                Err(e) => {
                    warn!(role = %role, error = %e, "Failed to prime key");
                    return Err(e);
                }
            };
            self.keys.set(role, key, self.keys.default_ttl()).await;
        }

        info!(
            address = %self.config.hydra_address,
            "Connected to authorization server, consent keys primed"
        );
        Ok(())
    }

    /// Connected and both keys cached.
    pub async fn is_ready(&self) -> bool {
        if self.session.read().await.is_none() {
            return false;
        }
        for role in KeyRole::ALL {
            if !self.keys.contains(role).await {
                return false;
            }
        }
        true
    }

    pub fn key_cache(&self) -> &KeyCache {
        &self.keys
    }

    pub async fn verification_key(&self) -> Result<Arc<RsaPublicKey>> {
        self.keys.verification_key().await
    }

    pub async fn consent_key(&self) -> Result<Arc<RsaPrivateKey>> {
        self.keys.consent_key().await
    }

    /// Verify the challenge token from a consent request and bind it to `user`.
    ///
    /// `token` is the request's `challenge` form value; a missing or empty
    /// value fails with `BadRequest` before anything else is touched.
    pub async fn new_challenge(self: &Arc<Self>, token: Option<&str>, user: &str) -> Result<Challenge> {
        let token = token.filter(|t| !t.is_empty()).ok_or(IdpError::BadRequest)?;

        let claims = codec::verify_challenge(token, &self.keys).await?;
        Challenge::from_claims(claims, user, Arc::downgrade(self))
    }

    /// Load the challenge stored for `session_id` by an earlier request.
    pub async fn get_challenge(self: &Arc<Self>, session_id: Option<&str>) -> Result<Challenge> {
        let session_id = session_id.ok_or(IdpError::BadChallengeCookie)?;

        let bytes = self
            .store
            .load(session_id, SESSION_COOKIE_NAME)
            .await?
            .ok_or(IdpError::BadChallengeCookie)?;

        Challenge::from_stored(&bytes, Arc::downgrade(self))
    }

    pub(crate) async fn store_challenge(&self, session_id: &str, challenge: &Challenge) -> Result<()> {
        let bytes = serde_json::to_vec(challenge)?;
        self.store
            .save(
                session_id,
                SESSION_COOKIE_NAME,
                bytes,
                self.config.challenge_session_ttl,
            )
            .await
    }

    pub(crate) async fn delete_challenge(&self, session_id: &str) -> Result<()> {
        self.store.remove(session_id, SESSION_COOKIE_NAME).await
    }

    /// Drop the transport and every cached key. Never fails.
    pub async fn close(&self) {
        *self.session.write().await = None;
        self.keys.flush().await;
        info!("Identity provider closed");
    }
}
