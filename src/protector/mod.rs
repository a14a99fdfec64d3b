//! Token protection: authenticated seal/open of an identity payload, bound
//! to a purpose chain and a key ring.
//!
//! ## Components
//! - `claims`: the identity payload sealed inside a token
//! - `envelope`: pure crypto primitives and the wire layout
//!
//! A `TokenProtector` is built once from an explicit `KeyManager` and passed
//! to whichever component needs it (issuer, middleware, edge authorizer);
//! there is no ambient lookup.

pub mod claims;
pub mod envelope;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;

use crate::keyring::{KeyManager, KeyringError};

pub use claims::Claims;
pub use envelope::{FORMAT_VERSION, NONCE_LEN};

/// Version label of the token format, the last element of every purpose
/// chain. Bump together with `envelope::FORMAT_VERSION`.
pub const VERSION_LABEL: &str = "v2";

/// Scopes a key to exactly one protocol usage.
///
/// Two services agree on the same purpose iff they agree on all three parts;
/// the chain string is what enters key derivation and the AAD, so purposes
/// that differ in any component are cryptographically disjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purpose {
    pub app_name: String,
    pub scheme_name: String,
    pub version: String,
}

impl Purpose {
    /// The standard purpose for the current token format.
    pub fn new(app_name: impl Into<String>, scheme_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            scheme_name: scheme_name.into(),
            version: VERSION_LABEL.to_string(),
        }
    }

    /// Serialized purpose chain, also the key store scope.
    pub fn chain(&self) -> String {
        format!("{}.{}.{}", self.app_name, self.scheme_name, self.version)
    }
}

#[derive(Error, Debug)]
pub enum ProtectError {
    /// Tampering, truncation, wrong key, or wrong purpose. All candidates
    /// were exhausted; no payload was recovered.
    #[error("token failed integrity verification")]
    InvalidToken,

    /// Integrity verified but the claims' expiry has passed.
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),

    /// The key ring could not be resolved.
    #[error(transparent)]
    Keyring(#[from] KeyringError),
}

pub struct TokenProtector {
    keys: Arc<KeyManager>,
}

impl TokenProtector {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    /// Seal claims under the purpose's active key into an opaque token.
    pub async fn seal(&self, purpose: &Purpose, claims: &Claims) -> Result<String, ProtectError> {
        let chain = purpose.chain();
        let key = self.keys.active_key(&chain).await?;

        let plaintext = serde_json::to_vec(claims)
            .map_err(|_| ProtectError::InvalidToken)?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let token = envelope::seal(&key.material, &chain, &key.key_id, &nonce, &plaintext);
        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    /// Open a token sealed under this purpose.
    ///
    /// The embedded key id is tried first; if it misses or fails, every
    /// remaining candidate is tried (active, then retired, newest first).
    /// `InvalidToken` only after all candidates are exhausted. Expiry is a
    /// claims-level check, separate from and subsequent to integrity.
    pub async fn open(&self, purpose: &Purpose, token: &str) -> Result<Claims, ProtectError> {
        let chain = purpose.chain();
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| ProtectError::InvalidToken)?;
        let parsed = envelope::parse(&raw).ok_or(ProtectError::InvalidToken)?;

        if let Some(hinted) = self.keys.key_for_decryption(&chain, parsed.key_id).await? {
            if let Some(plaintext) = envelope::open(&hinted.material, &chain, &parsed) {
                return finish_open(&plaintext);
            }
        }

        for candidate in self.keys.decryption_keys(&chain).await? {
            if candidate.key_id == parsed.key_id {
                continue; // already tried via the hint
            }
            if let Some(plaintext) = envelope::open(&candidate.material, &chain, &parsed) {
                return finish_open(&plaintext);
            }
        }

        Err(ProtectError::InvalidToken)
    }
}

fn finish_open(plaintext: &[u8]) -> Result<Claims, ProtectError> {
    let claims: Claims =
        serde_json::from_slice(plaintext).map_err(|_| ProtectError::InvalidToken)?;
    if claims.is_expired_at(Utc::now()) {
        return Err(ProtectError::Expired(claims.not_after));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyStoreConfig;
    use crate::keystore::MemoryKeyStore;
    use chrono::Duration;

    fn protector() -> TokenProtector {
        let store = Arc::new(MemoryKeyStore::new());
        let config = KeyStoreConfig {
            cache_ttl_secs: 0,
            ..KeyStoreConfig::default()
        };
        TokenProtector::new(Arc::new(KeyManager::new(store, &config)))
    }

    fn shared_protectors() -> (TokenProtector, TokenProtector) {
        let store = Arc::new(MemoryKeyStore::new());
        let config = KeyStoreConfig {
            cache_ttl_secs: 0,
            ..KeyStoreConfig::default()
        };
        let a = TokenProtector::new(Arc::new(KeyManager::new(store.clone(), &config)));
        let b = TokenProtector::new(Arc::new(KeyManager::new(store, &config)));
        (a, b)
    }

    fn purpose() -> Purpose {
        Purpose::new("SharedApp", "Identity.Application")
    }

    #[test]
    fn test_purpose_chain() {
        assert_eq!(purpose().chain(), "SharedApp.Identity.Application.v2");
    }

    #[tokio::test]
    async fn test_seal_open_round_trip() {
        let protector = protector();
        let claims = Claims::issue("admin", "Administrator", Duration::hours(1));

        let token = protector.seal(&purpose(), &claims).await.unwrap();
        let opened = protector.open(&purpose(), &token).await.unwrap();
        assert_eq!(opened.sub, claims.sub);
        assert_eq!(opened.name, claims.name);
        assert_eq!(opened.not_after.timestamp(), claims.not_after.timestamp());
    }

    #[tokio::test]
    async fn test_token_is_opaque() {
        let protector = protector();
        let claims = Claims::issue("admin", "Administrator", Duration::hours(1));
        let token = protector.seal(&purpose(), &claims).await.unwrap();

        // Cookie-safe and payload-free on the outside.
        assert!(!token.contains("admin"));
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_single_byte_tamper_fails() {
        let protector = protector();
        let claims = Claims::issue("admin", "Administrator", Duration::hours(1));
        let token = protector.seal(&purpose(), &claims).await.unwrap();

        let raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let tampered_token = URL_SAFE_NO_PAD.encode(&tampered);

            let err = protector.open(&purpose(), &tampered_token).await.unwrap_err();
            assert!(
                matches!(err, ProtectError::InvalidToken),
                "byte {} did not fail closed",
                i
            );
        }
    }

    #[tokio::test]
    async fn test_expired_token_fails_after_integrity() {
        let protector = protector();
        let mut claims = Claims::issue("admin", "Administrator", Duration::hours(1));
        claims.not_after = Utc::now() - Duration::seconds(1);

        let token = protector.seal(&purpose(), &claims).await.unwrap();
        let err = protector.open(&purpose(), &token).await.unwrap_err();
        // Integrity passed - this is the claims-level expiry, not tampering.
        assert!(matches!(err, ProtectError::Expired(_)));
    }

    #[tokio::test]
    async fn test_purpose_isolation() {
        let (a, b) = shared_protectors();
        let claims = Claims::issue("admin", "Administrator", Duration::hours(1));

        let scheme_a = Purpose::new("svc", "SchemeA");
        let scheme_b = Purpose::new("svc", "SchemeB");

        let token = a.seal(&scheme_a, &claims).await.unwrap();
        // Same store, same raw material universe - different scheme fails.
        let err = b.open(&scheme_b, &token).await.unwrap_err();
        assert!(matches!(err, ProtectError::InvalidToken));
        // Sanity: the right scheme still opens across protector instances.
        assert!(b.open(&scheme_a, &token).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotation_continuity() {
        let store = Arc::new(MemoryKeyStore::new());
        let config = KeyStoreConfig {
            cache_ttl_secs: 0,
            ..KeyStoreConfig::default()
        };
        let manager = Arc::new(KeyManager::new(store, &config));
        let protector = TokenProtector::new(manager.clone());

        let claims = Claims::issue("admin", "Administrator", Duration::hours(1));
        let token = protector.seal(&purpose(), &claims).await.unwrap();

        let rotated = manager.rotate(&purpose().chain()).await.unwrap();

        // New seals use the new key; the old token still opens.
        let new_token = protector.seal(&purpose(), &claims).await.unwrap();
        assert_ne!(token, new_token);
        let opened = protector.open(&purpose(), &token).await.unwrap();
        assert_eq!(opened.sub, "admin");

        // And the new token opens under the rotated key.
        let raw = URL_SAFE_NO_PAD.decode(&new_token).unwrap();
        assert_eq!(envelope::parse(&raw).unwrap().key_id, rotated.key_id);
    }

    #[tokio::test]
    async fn test_garbage_tokens_fail_closed() {
        let protector = protector();
        // Force a key to exist so failures are about the tokens.
        let claims = Claims::issue("admin", "Administrator", Duration::hours(1));
        protector.seal(&purpose(), &claims).await.unwrap();

        for garbage in ["", "not-base64!", "AAAA", &"A".repeat(2048)] {
            let err = protector.open(&purpose(), garbage).await.unwrap_err();
            assert!(matches!(err, ProtectError::InvalidToken));
        }
    }
}
