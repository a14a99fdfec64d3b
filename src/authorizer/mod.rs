//! Edge authorizer: admit/deny from the shared cookie alone.
//!
//! Runs with none of the issuing service's machinery - no user directory, no
//! login flow, no database. One pass per request, no retry, no suspension
//! beyond the bounded key fetch, and every outcome is a `Decision`: nothing
//! here returns an error to its caller, panics, or leaks why a token was
//! rejected. Unexpected failures deny (fail closed).
//!
//! ## Components
//! - `config`: environment-only configuration for edge deployments

pub mod config;

use axum::http::HeaderMap;
use std::sync::Arc;

use crate::protector::{Claims, ProtectError, Purpose, TokenProtector};

pub use config::{EdgeConfig, EdgeConfigError};

/// Terminal state of one authorization pass.
#[derive(Debug, Clone)]
pub enum Decision {
    Allow {
        /// The opened identity, available for forwarding downstream.
        claims: Claims,
    },
    Deny {
        /// Recorded for observability, never surfaced to the caller.
        reason: DenyReason,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow { .. } => None,
            Self::Deny { reason } => Some(*reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The named cookie was absent. Expected traffic, not an attack signal.
    NoCookie,
    /// Required configuration missing: an operator error, not a caller error.
    MisconfiguredEnvironment,
    /// Integrity verification failed: tampering, wrong key, or wrong purpose.
    InvalidToken,
    /// Cryptographically sound but past its `not_after`.
    Expired,
    /// The key store could not be reached. Failing closed.
    StoreUnavailable,
}

impl DenyReason {
    /// Stable name for logs and metrics.
    pub fn name(self) -> &'static str {
        match self {
            Self::NoCookie => "NO_COOKIE",
            Self::MisconfiguredEnvironment => "MISCONFIGURED_ENVIRONMENT",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Expired => "EXPIRED",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

/// Value of the named cookie across all `Cookie` headers on the request.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k.trim() == name).then(|| v.trim())
        })
        .next()
}

pub struct EdgeAuthorizer {
    protector: Arc<TokenProtector>,
    purpose: Purpose,
    cookie_name: String,
}

impl EdgeAuthorizer {
    pub fn new(protector: Arc<TokenProtector>, purpose: Purpose, cookie_name: String) -> Self {
        Self {
            protector,
            purpose,
            cookie_name,
        }
    }

    /// One authorization pass over an inbound request's headers.
    pub async fn authorize(&self, headers: &HeaderMap) -> Decision {
        // No cookie: deny without touching the key store.
        let Some(token) = cookie_value(headers, &self.cookie_name) else {
            tracing::debug!(cookie = %self.cookie_name, "no session cookie presented");
            return Decision::Deny {
                reason: DenyReason::NoCookie,
            };
        };

        match self.protector.open(&self.purpose, token).await {
            Ok(claims) => {
                tracing::debug!(subject = %claims.sub, "session admitted");
                Decision::Allow { claims }
            }
            Err(ProtectError::Expired(not_after)) => {
                tracing::info!(%not_after, "session cookie expired");
                Decision::Deny {
                    reason: DenyReason::Expired,
                }
            }
            Err(ProtectError::InvalidToken) => {
                // Token contents are untrusted; log nothing from the payload.
                tracing::warn!("session cookie failed integrity verification");
                Decision::Deny {
                    reason: DenyReason::InvalidToken,
                }
            }
            Err(ProtectError::Keyring(e)) => {
                tracing::error!(error = %e, "key store unavailable, failing closed");
                Decision::Deny {
                    reason: DenyReason::StoreUnavailable,
                }
            }
        }
    }
}
