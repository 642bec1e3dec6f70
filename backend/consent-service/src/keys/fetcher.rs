//! Fetching key material from the key-publishing endpoint.
use async_trait::async_trait;
use tracing::debug;

use super::jwk::JwkSet;
use super::{KeyKind, KeyMaterial, KeyRole};
use crate::error::{IdpError, Result};
use crate::trust::SessionSlot;

/// Source of fresh key material for a role.
///
/// Implementations surface every failure to the caller and never retry.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch(&self, role: KeyRole) -> Result<KeyMaterial>;
}

/// Fetches `GET /keys/{set}/{kind}` over the current trust session.
pub struct HydraKeyFetcher {
    session: SessionSlot,
}

impl HydraKeyFetcher {
    pub fn new(session: SessionSlot) -> Self {
        Self { session }
    }
}

#[async_trait]
impl KeyFetcher for HydraKeyFetcher {
    async fn fetch(&self, role: KeyRole) -> Result<KeyMaterial> {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(IdpError::NotConnected)?;

        let path = format!("/keys/{}/{}", role.key_set(), role.kind().as_str());
        let set: JwkSet = session.get(&path).await?.json().await?;

        let jwk = set
            .first()
            .ok_or_else(|| IdpError::EmptyKeySet(role.key_set().to_string()))?;

        debug!(role = %role, kid = ?jwk.kid, "Decoding fetched key");

        let key = match role.kind() {
            KeyKind::Public => KeyMaterial::from(jwk.to_public_key()?),
            KeyKind::Private => KeyMaterial::from(jwk.to_private_key()?),
        };
        Ok(key)
    }
}
