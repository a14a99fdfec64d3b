//! Session issuance: authenticate, build claims, seal, wrap in the shared
//! cookie binding.

use chrono::Duration;
use std::sync::Arc;
use thiserror::Error;

use super::directory::{CredentialError, Identity, UserDirectory};
use crate::config::{CookieConfig, SessionConfig};
use crate::protector::{Claims, ProtectError, Purpose, TokenProtector};

/// Transport wrapper for a sealed token. The name and domain scope are
/// configuration shared byte-identically by every participating service;
/// a mismatch is a deployment error, not a runtime one.
#[derive(Debug, Clone)]
pub struct CookieBinding {
    pub name: String,
    pub token: String,
    pub domain_scope: String,
    pub max_age_secs: i64,
}

impl CookieBinding {
    /// Render as a `Set-Cookie` header value.
    pub fn to_set_cookie(&self) -> String {
        format!(
            "{}={}; Domain={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Lax",
            self.name, self.token, self.domain_scope, self.max_age_secs
        )
    }

    /// A `Set-Cookie` value that expires the binding (logout).
    pub fn removal(name: &str, domain_scope: &str) -> String {
        format!(
            "{}=; Domain={}; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=Lax",
            name, domain_scope
        )
    }
}

#[derive(Error, Debug)]
pub enum IssueError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Sealing failed (key store fault). The login fails; nothing half-issued.
    #[error(transparent)]
    Protect(#[from] ProtectError),
}

pub struct SessionIssuer {
    protector: Arc<TokenProtector>,
    purpose: Purpose,
    directory: Arc<dyn UserDirectory>,
    cookie: CookieConfig,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(
        protector: Arc<TokenProtector>,
        purpose: Purpose,
        directory: Arc<dyn UserDirectory>,
        cookie: CookieConfig,
        session: &SessionConfig,
    ) -> Self {
        Self {
            protector,
            purpose,
            directory,
            cookie,
            ttl: Duration::seconds(session.ttl_secs as i64),
        }
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<Identity, IssueError> {
        Ok(self.directory.verify(username, password)?)
    }

    /// Seal a fresh session for an authenticated identity.
    ///
    /// No server-side state is recorded; the cookie is the session.
    pub async fn issue_session(&self, identity: &Identity) -> Result<CookieBinding, IssueError> {
        let claims = Claims::issue(&identity.subject, &identity.display_name, self.ttl);
        let token = self.protector.seal(&self.purpose, &claims).await?;

        tracing::info!(
            subject = %identity.subject,
            not_after = %claims.not_after,
            "issued shared session"
        );

        Ok(CookieBinding {
            name: self.cookie.name.clone(),
            token,
            domain_scope: self.cookie.domain.clone(),
            max_age_secs: self.ttl.num_seconds(),
        })
    }

    /// Authenticate and issue in one step (the login endpoint's whole job).
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(Identity, CookieBinding), IssueError> {
        let identity = self.authenticate(username, password)?;
        let binding = self.issue_session(&identity).await?;
        Ok((identity, binding))
    }

    /// The `Set-Cookie` value that clears the session cookie.
    pub fn logout_cookie(&self) -> String {
        CookieBinding::removal(&self.cookie.name, &self.cookie.domain)
    }

    /// Open a presented session token (used by the issuer's own middleware).
    pub async fn open_session(&self, token: &str) -> Result<Claims, ProtectError> {
        self.protector.open(&self.purpose, token).await
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }
}
