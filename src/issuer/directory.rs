//! Credential verification.
//!
//! Authentication backends are pluggable business logic; the protocol core
//! only needs "credential -> identity or one generic failure". The failure
//! is deliberately a single variant with a single message: whether the
//! username or the password was wrong must not be distinguishable.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::UserEntry;

/// The authenticated principal, input to session issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub display_name: String,
}

#[derive(Error, Debug)]
pub enum CredentialError {
    /// One message for every failure mode. Prevents account enumeration.
    #[error("invalid credentials")]
    InvalidCredential,
}

pub trait UserDirectory: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> Result<Identity, CredentialError>;
}

/// Config-backed directory: username -> argon2 PHC hash + display name.
pub struct StaticDirectory {
    users: HashMap<String, UserEntry>,
}

impl StaticDirectory {
    pub fn new(entries: Vec<UserEntry>) -> Self {
        let users = entries
            .into_iter()
            .map(|e| (e.username.clone(), e))
            .collect();
        Self { users }
    }
}

impl UserDirectory for StaticDirectory {
    fn verify(&self, username: &str, password: &str) -> Result<Identity, CredentialError> {
        let entry = self
            .users
            .get(username)
            .ok_or(CredentialError::InvalidCredential)?;

        let parsed_hash = PasswordHash::new(&entry.password_hash)
            .map_err(|_| CredentialError::InvalidCredential)?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| CredentialError::InvalidCredential)?;

        Ok(Identity {
            subject: entry.username.clone(),
            display_name: entry.display_name.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) fn hash_password(password: &str) -> String {
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}
