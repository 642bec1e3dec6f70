//! TTL cache for consent keys with refresh on expiry.
//!
//! # Refresh policy
//!
//! ```text
//! entry expires → sweeper runs pending tasks → eviction listener (Expired)
//!               → role queued on refresh channel
//!               → refresh worker fetches the role in its own task
//!               → success: re-insert with default TTL
//!               → failure: role stays absent until a later refresh or re-prime
//! ```
//!
//! The eviction listener only enqueues; all network I/O happens on the refresh
//! worker, so readers never wait on the authorization server. While a refresh
//! is in flight, `get` for that role simply returns `None`. Eviction happens on
//! the sweep after expiry, so a refresh can lag the TTL by up to one sweep
//! interval plus the timer-wheel granularity (about a second).
//!
//! A refresh that finishes after [`KeyCache::flush`] is discarded: every
//! flush bumps a generation counter, each refresh request carries the
//! generation current at eviction, and the fetched key is only inserted if
//! that generation is still current.
//!
//! Each eviction triggers exactly one fetch. Consecutive failures are counted
//! per role and escalate from `warn!` to `error!` at
//! [`REFRESH_FAILURE_ALERT_THRESHOLD`].

use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::Expiry;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::{KeyFetcher, KeyMaterial, KeyRole};
use crate::error::{IdpError, Result};

/// Consecutive refresh failures for one role before logging at error level.
pub const REFRESH_FAILURE_ALERT_THRESHOLD: u32 = 3;

#[derive(Clone)]
struct CachedKey {
    key: KeyMaterial,
    ttl: Duration,
}

/// Expires every entry after its own TTL, restarting on replacement.
struct PerEntryTtl;

impl Expiry<KeyRole, CachedKey> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _role: &KeyRole,
        entry: &CachedKey,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _role: &KeyRole,
        entry: &CachedKey,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Flush counter. `insert_lock` is held by a flush for its whole duration
/// and by a refresh while it compares and inserts.
#[derive(Default)]
struct Generation {
    current: AtomicU64,
    insert_lock: Mutex<()>,
}

impl Generation {
    fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct RefreshStats {
    consecutive_failures: [AtomicU32; 2],
}

/// Two-entry key cache keyed by [`KeyRole`].
///
/// Must be created inside a Tokio runtime: construction spawns the sweeper
/// and refresh worker, both stopped when the cache is dropped.
pub struct KeyCache {
    entries: Cache<KeyRole, CachedKey>,
    default_ttl: Duration,
    stats: Arc<RefreshStats>,
    generation: Arc<Generation>,
    shutdown_tx: watch::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl KeyCache {
    pub fn new(
        default_ttl: Duration,
        cleanup_interval: Duration,
        fetcher: Arc<dyn KeyFetcher>,
    ) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel::<RefreshRequest>();
        let generation = Arc::new(Generation::default());
        let listener_generation = Arc::clone(&generation);

        let entries: Cache<KeyRole, CachedKey> = Cache::builder()
            .expire_after(PerEntryTtl)
            .eviction_listener(move |role: Arc<KeyRole>, _entry: CachedKey, cause| {
                if !matches!(cause, RemovalCause::Expired) {
                    return;
                }
                debug!(role = %role, "Key expired, scheduling refresh");
                let request = RefreshRequest {
                    role: *role,
                    generation: listener_generation.current(),
                };
                if refresh_tx.send(request).is_err() {
                    debug!(role = %role, "Refresh worker stopped, dropping refresh request");
                }
            })
            .build();

        let stats = Arc::new(RefreshStats::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let sweeper = tokio::spawn(sweep(entries.clone(), cleanup_interval, shutdown_rx.clone()));
        let worker = tokio::spawn(refresh_worker(
            RefreshContext {
                entries: entries.clone(),
                fetcher,
                default_ttl,
                stats: Arc::clone(&stats),
                generation: Arc::clone(&generation),
            },
            refresh_rx,
            shutdown_rx,
        ));

        info!(
            default_ttl = ?default_ttl,
            cleanup_interval = ?cleanup_interval,
            "Key cache initialized"
        );

        Self {
            entries,
            default_ttl,
            stats,
            generation,
            shutdown_tx,
            handles: vec![sweeper, worker],
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store or replace the key for `role`.
    pub async fn set(&self, role: KeyRole, key: KeyMaterial, ttl: Duration) {
        self.entries.insert(role, CachedKey { key, ttl }).await;
    }

    /// Cached key for `role`, or `None` if absent or expired. Never does I/O.
    pub async fn get(&self, role: KeyRole) -> Option<KeyMaterial> {
        self.entries.get(&role).await.map(|entry| entry.key)
    }

    pub async fn contains(&self, role: KeyRole) -> bool {
        self.get(role).await.is_some()
    }

    /// Remove every entry. Removal by flush does not trigger a refresh, and
    /// refreshes already in flight are discarded when they complete.
    pub async fn flush(&self) {
        let _guard = self.generation.insert_lock.lock().await;
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        self.generation.current.fetch_add(1, Ordering::AcqRel);
    }

    /// Run expiry housekeeping now instead of waiting for the next sweep.
    pub async fn sweep_now(&self) {
        self.entries.run_pending_tasks().await;
    }

    pub fn consecutive_failures(&self, role: KeyRole) -> u32 {
        self.stats.consecutive_failures[role.index()].load(Ordering::Relaxed)
    }

    pub async fn verification_key(&self) -> Result<Arc<RsaPublicKey>> {
        let role = KeyRole::Verification;
        match self.get(role).await {
            Some(KeyMaterial::Public(key)) => Ok(key),
            Some(_) => Err(IdpError::BadKey(role)),
            None => Err(IdpError::NoKey(role)),
        }
    }

    pub async fn consent_key(&self) -> Result<Arc<RsaPrivateKey>> {
        let role = KeyRole::ConsentSigning;
        match self.get(role).await {
            Some(KeyMaterial::Private(key)) => Ok(key),
            Some(_) => Err(IdpError::BadKey(role)),
            None => Err(IdpError::NoKey(role)),
        }
    }
}

impl Drop for KeyCache {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn sweep(
    entries: Cache<KeyRole, CachedKey>,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Key cache sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {
                entries.run_pending_tasks().await;
            }
        }
    }
}

#[derive(Clone)]
struct RefreshContext {
    entries: Cache<KeyRole, CachedKey>,
    fetcher: Arc<dyn KeyFetcher>,
    default_ttl: Duration,
    stats: Arc<RefreshStats>,
    generation: Arc<Generation>,
}

#[derive(Debug, Clone, Copy)]
struct RefreshRequest {
    role: KeyRole,
    /// Flush generation when the key expired.
    generation: u64,
}

async fn refresh_worker(
    ctx: RefreshContext,
    mut requests: mpsc::UnboundedReceiver<RefreshRequest>,
    mut shutdown: watch::Receiver<()>,
) {
    // Each refresh runs in its own task so a hanging fetch for one role
    // does not hold up the other.
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Key refresh worker shutting down");
                break;
            }
            Some(request) = requests.recv() => {
                in_flight.spawn(refresh_role(ctx.clone(), request));
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            else => break,
        }
    }
}

async fn refresh_role(ctx: RefreshContext, request: RefreshRequest) {
    let role = request.role;
    let failures = &ctx.stats.consecutive_failures[role.index()];

    match ctx.fetcher.fetch(role).await {
        Ok(key) => {
            let guard = ctx.generation.insert_lock.lock().await;
            if ctx.generation.current() != request.generation {
                debug!(role = %role, "Cache flushed during refresh, discarding fetched key");
                return;
            }
            ctx.entries
                .insert(
                    role,
                    CachedKey {
                        key,
                        ttl: ctx.default_ttl,
                    },
                )
                .await;
            drop(guard);
            failures.store(0, Ordering::Relaxed);
            info!(role = %role, "Refreshed expired key");
        }
        Err(e) => {
            let count = failures.fetch_add(1, Ordering::Relaxed) + 1;
            if count >= REFRESH_FAILURE_ALERT_THRESHOLD {
                error!(
                    role = %role,
                    consecutive_failures = count,
                    error = %e,
                    "Key refresh keeps failing, consent flow is unavailable for this key"
                );
            } else {
                warn!(
                    role = %role,
                    consecutive_failures = count,
                    error = %e,
                    "Key refresh failed, key unavailable until next refresh"
                );
            }
        }
    }
}
