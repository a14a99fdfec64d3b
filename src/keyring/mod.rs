//! Key lifecycle management.
//!
//! The `KeyManager` resolves the usable key(s) for a purpose: fetch-or-
//! bootstrap on first use, rotation, and candidate ordering for decryption.
//! It is built explicitly from a store and a config and handed to whichever
//! component needs it; there is no ambient registry.
//!
//! Resolved rings are cached with a bounded TTL so validators do not pay a
//! store round trip per request; rotations performed by other processes
//! propagate within that TTL window.

use cached::{Cached, TimedCache};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::KeyStoreConfig;
use crate::keystore::{KeyRecord, KeyStore, KeyStoreError};

/// Backoff before the single retry after a store failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// How many times a lost bootstrap/rotate race is replayed before giving up.
/// Each replay re-reads the ring, so one round is enough in practice.
const MAX_WRITE_ATTEMPTS: u32 = 3;

#[derive(Error, Debug)]
pub enum KeyringError {
    /// Empty ring on a deployment that cannot write. Key provisioning is an
    /// out-of-band step for read-only consumers.
    #[error("no active key for purpose '{0}' and the store does not accept writes")]
    NoActiveKey(String),

    /// The store could not be reached, timed out, or failed the write.
    #[error("key store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store returned data that could not be decoded.
    #[error("key store record corrupt: {0}")]
    Corrupt(String),
}

impl From<KeyStoreError> for KeyringError {
    fn from(e: KeyStoreError) -> Self {
        match e {
            KeyStoreError::Corrupt(msg) => Self::Corrupt(msg),
            KeyStoreError::Unsupported => Self::StoreUnavailable("store is read-only".into()),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    /// Purpose chain -> ring in ascending sequence order.
    cache: Mutex<TimedCache<String, Arc<Vec<KeyRecord>>>>,
    store_timeout: Duration,
}

impl KeyManager {
    pub fn new(store: Arc<dyn KeyStore>, config: &KeyStoreConfig) -> Self {
        Self {
            store,
            cache: Mutex::new(TimedCache::with_lifespan(config.cache_ttl_secs)),
            store_timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// The key new seals must use: the most recently created `Active` record.
    ///
    /// On an empty ring this generates fresh random material and persists it
    /// through the store's conditional create; a lost race converges on the
    /// first writer's record, so validators never diverge.
    pub async fn active_key(&self, purpose: &str) -> Result<KeyRecord, KeyringError> {
        let ring = self.ring(purpose).await?;
        if let Some(active) = newest_active(&ring) {
            return Ok(active.clone());
        }
        self.append_key(purpose, "bootstrap").await
    }

    /// Every candidate for opening a token: active keys first, then retired,
    /// newest first within each group. Retired keys stay usable so tokens
    /// sealed before a rotation remain openable until their own expiry.
    pub async fn decryption_keys(&self, purpose: &str) -> Result<Vec<KeyRecord>, KeyringError> {
        let ring = self.ring(purpose).await?;
        let mut candidates: Vec<KeyRecord> = ring.iter().rev().filter(|r| r.is_active()).cloned().collect();
        candidates.extend(ring.iter().rev().filter(|r| !r.is_active()).cloned());
        Ok(candidates)
    }

    /// Hint lookup by the key id embedded in a token. A miss forces one
    /// cache refresh before giving up: the token may have been sealed under
    /// a key newer than our cached ring.
    pub async fn key_for_decryption(
        &self,
        purpose: &str,
        key_id: Uuid,
    ) -> Result<Option<KeyRecord>, KeyringError> {
        let ring = self.ring(purpose).await?;
        if let Some(record) = ring.iter().find(|r| r.key_id == key_id) {
            return Ok(Some(record.clone()));
        }

        self.invalidate(purpose);
        let ring = self.ring(purpose).await?;
        Ok(ring.iter().find(|r| r.key_id == key_id).cloned())
    }

    /// Append a fresh `Active` key. Tokens sealed under the previous key
    /// keep opening until their own `not_after`; nothing is invalidated.
    pub async fn rotate(&self, purpose: &str) -> Result<KeyRecord, KeyringError> {
        self.invalidate(purpose);
        self.append_key(purpose, "rotate").await
    }

    async fn append_key(&self, purpose: &str, op: &str) -> Result<KeyRecord, KeyringError> {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let ring = self.ring(purpose).await?;
            let record = KeyRecord::generate(purpose, ring.len() as u32);

            let put = tokio::time::timeout(
                self.store_timeout,
                self.store.put(purpose, &record),
            )
            .await
            .map_err(|_| KeyringError::StoreUnavailable("put timed out".into()))?;

            match put {
                Ok(()) => {
                    tracing::info!(
                        purpose,
                        key = %record.id_short(),
                        sequence = record.sequence,
                        "{} created new active key",
                        op
                    );
                    self.invalidate(purpose);
                    return Ok(record);
                }
                Err(KeyStoreError::Conflict) => {
                    // Another process won the race. Re-read and adopt its key.
                    tracing::debug!(purpose, attempt, "lost key create race, re-reading ring");
                    self.invalidate(purpose);
                    let ring = self.ring(purpose).await?;
                    if let Some(active) = newest_active(&ring) {
                        return Ok(active.clone());
                    }
                }
                Err(KeyStoreError::Unsupported) => {
                    tracing::warn!(
                        purpose,
                        "store is read-only; keys must be provisioned out-of-band"
                    );
                    return Err(KeyringError::NoActiveKey(purpose.to_string()));
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(KeyringError::StoreUnavailable(format!(
            "could not create key for '{}' after {} attempts",
            purpose, MAX_WRITE_ATTEMPTS
        )))
    }

    async fn ring(&self, purpose: &str) -> Result<Arc<Vec<KeyRecord>>, KeyringError> {
        if let Some(ring) = self
            .cache
            .lock()
            .expect("keyring cache poisoned")
            .cache_get(&purpose.to_string())
        {
            return Ok(Arc::clone(ring));
        }

        let ring = Arc::new(self.fetch_ring(purpose).await?);
        self.cache
            .lock()
            .expect("keyring cache poisoned")
            .cache_set(purpose.to_string(), Arc::clone(&ring));
        Ok(ring)
    }

    /// Timeout-bounded store read with a single backoff retry. A timed-out
    /// fetch is a store failure, never a stale default.
    async fn fetch_ring(&self, purpose: &str) -> Result<Vec<KeyRecord>, KeyringError> {
        let first = self.read_once(purpose).await;
        match first {
            Ok(ring) => Ok(ring),
            Err(KeyringError::Corrupt(msg)) => Err(KeyringError::Corrupt(msg)),
            Err(e) => {
                tracing::warn!(purpose, error = %e, "key store read failed, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.read_once(purpose).await
            }
        }
    }

    async fn read_once(&self, purpose: &str) -> Result<Vec<KeyRecord>, KeyringError> {
        let result = tokio::time::timeout(self.store_timeout, self.store.get_all(purpose))
            .await
            .map_err(|_| KeyringError::StoreUnavailable("get_all timed out".into()))?;
        Ok(result?)
    }

    fn invalidate(&self, purpose: &str) {
        self.cache
            .lock()
            .expect("keyring cache poisoned")
            .cache_remove(&purpose.to_string());
    }
}

fn newest_active(ring: &[KeyRecord]) -> Option<&KeyRecord> {
    ring.iter().rev().find(|r| r.is_active())
}
