//! Key material store for the shared session-token protocol.
//!
//! Every service participating in the shared session reads symmetric key
//! material from one of these stores; the issuing service (and only it, in
//! read-only deployments) also writes. Backends are runtime-selected by
//! configuration and all satisfy the same contract.
//!
//! ## Components
//! - `models`: `KeyRecord` and `KeyStatus`
//! - `fs_store`: local filesystem backend, one JSON document per record
//! - `http_store`: centralized parameter store over HTTP
//! - `memory`: in-process backend for tests and embedded scenarios

pub mod fs_store;
pub mod http_store;
pub mod memory;
pub mod models;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use fs_store::FsKeyStore;
pub use http_store::HttpParamStore;
pub use memory::MemoryKeyStore;
pub use models::{KEY_MATERIAL_LEN, KeyRecord, KeyStatus};

/// Key store failure taxonomy.
///
/// `Conflict` and `Unsupported` are expected, recoverable conditions for
/// callers: a lost create race and a read-only deployment respectively.
#[derive(Error, Debug)]
pub enum KeyStoreError {
    /// Another writer created the record at this ring position first.
    #[error("key record already exists at this ring position")]
    Conflict,

    /// This backend does not support writes (consumer-only deployment).
    #[error("key store is read-only")]
    Unsupported,

    /// The backend could not be reached or the operation failed.
    #[error("key store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be decoded.
    #[error("key store record corrupt: {0}")]
    Corrupt(String),
}

/// Durable storage for the symmetric keys behind the session-token seal.
///
/// `get_all` returns an empty vec (never an error) for a purpose that has no
/// keys yet; that is the normal first-run state and signals "bootstrap".
///
/// `put` is a conditional create keyed on `record.sequence`: the write lands
/// only if it becomes ring position `sequence`, so concurrent writers racing
/// for the same position resolve to exactly one winner and the losers see
/// `Conflict`. Records are append-only; nothing is ever mutated or deleted.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// All records for a purpose, in ring order (oldest first).
    async fn get_all(&self, purpose: &str) -> Result<Vec<KeyRecord>, KeyStoreError>;

    /// Conditionally create a record at ring position `record.sequence`.
    async fn put(&self, purpose: &str, record: &KeyRecord) -> Result<(), KeyStoreError>;
}

/// Wrapper that disables writes on any inner store.
///
/// Deployments that only consume a shared key never generate one; their
/// `put` fails with `Unsupported` and key provisioning happens out-of-band
/// before the first validator starts.
pub struct ReadOnlyStore<S> {
    inner: S,
}

impl<S: KeyStore> ReadOnlyStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: KeyStore> KeyStore for ReadOnlyStore<S> {
    async fn get_all(&self, purpose: &str) -> Result<Vec<KeyRecord>, KeyStoreError> {
        self.inner.get_all(purpose).await
    }

    async fn put(&self, _purpose: &str, _record: &KeyRecord) -> Result<(), KeyStoreError> {
        Err(KeyStoreError::Unsupported)
    }
}

/// Build the configured backend, wrapped read-only when the deployment
/// only consumes keys. Both binaries go through here, so issuer and edge
/// cannot drift on how a backend is selected.
pub fn build_store(config: &crate::config::KeyStoreConfig) -> Arc<dyn KeyStore> {
    use crate::config::KeyStoreBackend;

    match &config.backend {
        KeyStoreBackend::Fs { root } => wrap(FsKeyStore::new(root), config.read_only),
        KeyStoreBackend::ParamStore { base_url } => {
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(config.timeout_ms))
                .build()
                .unwrap_or_default();
            wrap(HttpParamStore::new(base_url.clone(), client), config.read_only)
        }
    }
}

fn wrap<S: KeyStore + 'static>(store: S, read_only: bool) -> Arc<dyn KeyStore> {
    if read_only {
        Arc::new(ReadOnlyStore::new(store))
    } else {
        Arc::new(store)
    }
}

/// Map a purpose chain onto a path/parameter-safe segment.
///
/// Purpose chains contain dots and arbitrary configured names; anything
/// outside a conservative character set becomes `_`.
pub(crate) fn sanitize_purpose(purpose: &str) -> String {
    purpose
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
