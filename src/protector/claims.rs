//! Identity payload sealed inside a session token.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The claims sealed into a token. Immutable once created; validity is
/// proven solely by the ability to re-open the token, so nothing here is
/// ever persisted server-side.
///
/// Timestamps serialize as unix seconds to keep the cookie small. `extra`
/// is a `BTreeMap` so serialization stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Stable principal identifier (never an email or display string).
    pub sub: String,
    /// Human-readable name, for downstream display only.
    pub name: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,
    /// Hard expiry. Every token has one; enforced on every open.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub not_after: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Claims {
    /// Build claims valid from now for `ttl`.
    pub fn issue(subject: impl Into<String>, name: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: subject.into(),
            name: name.into(),
            issued_at: now,
            not_after: now + ttl,
            extra: BTreeMap::new(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.not_after <= now
    }
}
