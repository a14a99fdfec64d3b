//! Downstream relay credential.
//!
//! A service that calls another internal service on the caller's behalf can
//! either forward the original cookie unchanged or mint one of these: a
//! short-lived HS256 bearer token carrying the same subject. The relay
//! purpose is a protection domain of its own - its HMAC secret derives from
//! the relay purpose's key ring, never from the cookie's - so compromising
//! one domain reveals nothing about the other.

use chrono::{Duration, Utc};
use hkdf::Hkdf;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;

use crate::config::RelayConfig;
use crate::keyring::{KeyManager, KeyringError};
use crate::keystore::KeyRecord;
use crate::protector::Purpose;

const DERIVE_LABEL: &[u8] = b"relay-hmac/v1/";

/// Claims of a relay bearer token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayClaims {
    /// Subject (same principal as the originating session)
    pub sub: String,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at
    pub iat: usize,
}

#[derive(Error, Debug)]
pub enum RelayError {
    /// Bad signature under every candidate key, or malformed token.
    #[error("relay token failed verification")]
    Invalid,

    /// Signature verified but the token is past its expiry.
    #[error("relay token expired")]
    Expired,

    #[error(transparent)]
    Keyring(#[from] KeyringError),
}

pub struct RelayIssuer {
    keys: Arc<KeyManager>,
    purpose: Purpose,
    ttl: Duration,
}

impl RelayIssuer {
    pub fn new(keys: Arc<KeyManager>, purpose: Purpose, config: &RelayConfig) -> Self {
        Self {
            keys,
            purpose,
            ttl: Duration::seconds(config.ttl_secs as i64),
        }
    }

    /// Mint a bearer token for `subject` under the relay purpose's active key.
    pub async fn mint(&self, subject: &str) -> Result<String, RelayError> {
        let chain = self.purpose.chain();
        let key = self.keys.active_key(&chain).await?;
        let secret = hmac_secret(&key, &chain);

        let now = Utc::now();
        let claims = RelayClaims {
            sub: subject.to_string(),
            exp: (now + self.ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(key.key_id.simple().to_string());

        encode(&header, &claims, &EncodingKey::from_secret(&secret))
            .map_err(|_| RelayError::Invalid)
    }

    /// Verify a relay token against every current and retired relay key.
    pub async fn verify(&self, token: &str) -> Result<RelayClaims, RelayError> {
        let chain = self.purpose.chain();
        let kid = decode_header(token)
            .map_err(|_| RelayError::Invalid)?
            .kid;

        let mut candidates = self.keys.decryption_keys(&chain).await?;
        // Hinted key first; order among the rest already favors newest.
        if let Some(kid) = &kid {
            candidates.sort_by_key(|r| r.key_id.simple().to_string() != *kid);
        }

        let validation = Validation::new(Algorithm::HS256);
        for record in &candidates {
            let secret = hmac_secret(record, &chain);
            match decode::<RelayClaims>(token, &DecodingKey::from_secret(&secret), &validation) {
                Ok(data) => return Ok(data.claims),
                // Right key, token simply too old: stop trying.
                Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                    return Err(RelayError::Expired);
                }
                Err(_) => continue,
            }
        }

        Err(RelayError::Invalid)
    }
}

/// Per-purpose HMAC secret derived from raw key material.
fn hmac_secret(record: &KeyRecord, purpose_chain: &str) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, &record.material);
    let mut info = Vec::with_capacity(DERIVE_LABEL.len() + purpose_chain.len());
    info.extend_from_slice(DERIVE_LABEL);
    info.extend_from_slice(purpose_chain.as_bytes());

    let mut okm = [0u8; 32];
    let Ok(()) = hk.expand(&info, &mut okm) else {
        unreachable!("32-byte HKDF expansion cannot fail");
    };
    okm
}
