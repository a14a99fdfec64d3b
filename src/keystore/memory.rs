//! In-process key store.
//!
//! Backs tests and embedded scenarios where issuer and validator share a
//! process. The `DashMap` entry lock makes `put` an exact compare-and-create
//! on ring position, so the concurrent-bootstrap guarantees match the
//! durable backends.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{KeyRecord, KeyStore, KeyStoreError};

#[derive(Default)]
pub struct MemoryKeyStore {
    rings: DashMap<String, Vec<KeyRecord>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_all(&self, purpose: &str) -> Result<Vec<KeyRecord>, KeyStoreError> {
        Ok(self
            .rings
            .get(purpose)
            .map(|ring| ring.clone())
            .unwrap_or_default())
    }

    async fn put(&self, purpose: &str, record: &KeyRecord) -> Result<(), KeyStoreError> {
        let mut ring = self.rings.entry(purpose.to_string()).or_default();
        if ring.len() != record.sequence as usize {
            return Err(KeyStoreError::Conflict);
        }
        ring.push(record.clone());
        Ok(())
    }
}
