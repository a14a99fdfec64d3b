//! Filesystem key store.
//!
//! One directory per purpose, one JSON document per key record, named by
//! ring position (`key-000000.json`, `key-000001.json`, ...). A write lands
//! as a fully-synced scratch file that is then hard-linked to its ring
//! position, so two processes racing to create the same position resolve at
//! the filesystem: exactly one link wins, the loser gets `Conflict` and
//! re-reads. The directory may be a shared mount; nothing here assumes a
//! single writer process.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{KeyRecord, KeyStore, KeyStoreError, sanitize_purpose};

pub struct FsKeyStore {
    root: PathBuf,
}

impl FsKeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn purpose_dir(&self, purpose: &str) -> PathBuf {
        self.root.join(sanitize_purpose(purpose))
    }

    fn record_path(dir: &Path, sequence: u32) -> PathBuf {
        dir.join(format!("key-{:06}.json", sequence))
    }
}

#[async_trait]
impl KeyStore for FsKeyStore {
    async fn get_all(&self, purpose: &str) -> Result<Vec<KeyRecord>, KeyStoreError> {
        let dir = self.purpose_dir(purpose);

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // A brand-new purpose has no directory yet. Expected, not an error.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(KeyStoreError::Unavailable(e.to_string())),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?;
            let record: KeyRecord = serde_json::from_str(&content).map_err(|e| {
                KeyStoreError::Corrupt(format!("{}: {}", path.display(), e))
            })?;
            records.push(record);
        }

        records.sort_by_key(|r| r.sequence);
        Ok(records)
    }

    async fn put(&self, purpose: &str, record: &KeyRecord) -> Result<(), KeyStoreError> {
        let dir = self.purpose_dir(purpose);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?;

        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| KeyStoreError::Corrupt(e.to_string()))?;

        // Write the full document to a scratch name first, then publish it
        // under the ring-position name via hard_link. The link either
        // appears atomically with complete contents or fails AlreadyExists;
        // readers never observe a partial record.
        let path = Self::record_path(&dir, record.sequence);
        let scratch = dir.join(format!(".tmp-{}", record.key_id.simple()));

        let mut file = tokio::fs::File::create(&scratch)
            .await
            .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?;
        file.write_all(&json)
            .await
            .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| KeyStoreError::Unavailable(e.to_string()))?;
        drop(file);

        let publish = tokio::fs::hard_link(&scratch, &path).await;
        let _ = tokio::fs::remove_file(&scratch).await;

        match publish {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(KeyStoreError::Conflict),
            Err(e) => Err(KeyStoreError::Unavailable(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_purpose_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyStore::new(dir.path());
        let records = store.get_all("App.Scheme.v2").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_put_then_get_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyStore::new(dir.path());

        let first = KeyRecord::generate("App.Scheme.v2", 0);
        let second = KeyRecord::generate("App.Scheme.v2", 1);
        store.put("App.Scheme.v2", &first).await.unwrap();
        store.put("App.Scheme.v2", &second).await.unwrap();

        let records = store.get_all("App.Scheme.v2").await.unwrap();
        assert_eq!(records, vec![first, second]);
    }

    #[tokio::test]
    async fn test_same_sequence_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyStore::new(dir.path());

        let winner = KeyRecord::generate("App.Scheme.v2", 0);
        let loser = KeyRecord::generate("App.Scheme.v2", 0);
        store.put("App.Scheme.v2", &winner).await.unwrap();

        let err = store.put("App.Scheme.v2", &loser).await.unwrap_err();
        assert!(matches!(err, KeyStoreError::Conflict));

        // Only the first writer's record survived.
        let records = store.get_all("App.Scheme.v2").await.unwrap();
        assert_eq!(records, vec![winner]);
    }

    #[tokio::test]
    async fn test_purposes_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyStore::new(dir.path());

        let record = KeyRecord::generate("App.SchemeA.v2", 0);
        store.put("App.SchemeA.v2", &record).await.unwrap();

        assert!(store.get_all("App.SchemeB.v2").await.unwrap().is_empty());
        assert_eq!(store.get_all("App.SchemeA.v2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyStore::new(dir.path());

        let purpose_dir = dir.path().join("App.Scheme.v2");
        std::fs::create_dir_all(&purpose_dir).unwrap();
        std::fs::write(purpose_dir.join("key-000000.json"), b"not json").unwrap();

        let err = store.get_all("App.Scheme.v2").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::Corrupt(_)));
    }
}
