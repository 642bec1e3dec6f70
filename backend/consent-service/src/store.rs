//! Session storage for pending challenges.
//!
//! The persistent backend is pluggable through [`ChallengeStore`]; values are
//! opaque bytes stored under a session id and a name, with an expiry.
//! [`MemoryChallengeStore`] keeps them in process.
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Name under which the pending challenge is stored, also used as the cookie
/// carrying the session id.
pub const SESSION_COOKIE_NAME: &str = "idp_challenge";

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn load(&self, session_id: &str, name: &str) -> Result<Option<Vec<u8>>>;

    async fn save(&self, session_id: &str, name: &str, value: Vec<u8>, ttl: Duration)
        -> Result<()>;

    async fn remove(&self, session_id: &str, name: &str) -> Result<()>;
}

#[derive(Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    ttl: Duration,
}

struct StoredValueExpiry;

impl Expiry<(String, String), StoredValue> for StoredValueExpiry {
    fn expire_after_create(
        &self,
        _key: &(String, String),
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &(String, String),
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process store. Entries vanish on restart.
#[derive(Clone)]
pub struct MemoryChallengeStore {
    values: Cache<(String, String), StoredValue>,
}

impl MemoryChallengeStore {
    pub fn new(max_sessions: u64) -> Self {
        let values = Cache::builder()
            .max_capacity(max_sessions)
            .expire_after(StoredValueExpiry)
            .build();
        Self { values }
    }
}

impl Default for MemoryChallengeStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn load(&self, session_id: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let key = (session_id.to_string(), name.to_string());
        Ok(self.values.get(&key).await.map(|v| v.bytes))
    }

    async fn save(
        &self,
        session_id: &str,
        name: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<()> {
        let key = (session_id.to_string(), name.to_string());
        self.values
            .insert(key, StoredValue { bytes: value, ttl })
            .await;
        Ok(())
    }

    async fn remove(&self, session_id: &str, name: &str) -> Result<()> {
        let key = (session_id.to_string(), name.to_string());
        self.values.invalidate(&key).await;
        Ok(())
    }
}
