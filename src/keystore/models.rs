//! Key record model shared by every store backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Symmetric key material length in bytes.
pub const KEY_MATERIAL_LEN: usize = 32;

/// Lifecycle status written at creation time.
///
/// Records are append-only and never change status in place. Rotation
/// supersedes the previous key by appending a new `Active` record; the
/// effective active key is always the newest `Active` one. `Retired` exists
/// for operationally imported historical keys that must stay openable but
/// never be selected for sealing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Retired,
}

/// One symmetric key, scoped to exactly one purpose chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Stable identifier, embedded in sealed tokens as a decryption hint.
    pub key_id: Uuid,
    /// Purpose chain this key belongs to. A key never backs two purposes.
    pub purpose: String,
    pub created_at: DateTime<Utc>,
    /// Raw key material, base64 in stored documents.
    #[serde(with = "material_b64")]
    pub material: Vec<u8>,
    pub status: KeyStatus,
    /// Position in the purpose's ring; stores use it for conditional create.
    pub sequence: u32,
}

impl KeyRecord {
    /// Generate a fresh `Active` record with cryptographically random material.
    pub fn generate(purpose: &str, sequence: u32) -> Self {
        use rand::RngCore;

        let mut material = vec![0u8; KEY_MATERIAL_LEN];
        rand::rngs::OsRng.fill_bytes(&mut material);

        Self {
            key_id: Uuid::new_v4(),
            purpose: purpose.to_string(),
            created_at: Utc::now(),
            material,
            status: KeyStatus::Active,
            sequence,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }

    /// Short hex form of the key id for logs. Never log material.
    pub fn id_short(&self) -> String {
        let bytes = self.key_id.as_bytes();
        hex::encode(&bytes[..4])
    }
}

mod material_b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
