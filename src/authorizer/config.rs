//! Environment-only configuration for edge deployments.
//!
//! The edge authorizer runs where no config file ships - a container
//! sidecar, a serverless function - so everything comes from process
//! environment variables. The two shared names are required and must match
//! the issuer's configuration exactly; a missing one is an operator error
//! and must read as such in the logs, not as an authentication failure.

use thiserror::Error;

use crate::config::{KeyStoreBackend, KeyStoreConfig};
use crate::protector::Purpose;

pub const SHARED_APP_NAME_VAR: &str = "SHARED_APP_NAME";
pub const SHARED_SCHEME_NAME_VAR: &str = "SHARED_SCHEME_NAME";
pub const SHARED_COOKIE_NAME_VAR: &str = "SHARED_COOKIE_NAME";
pub const KEY_STORE_URL_VAR: &str = "KEY_STORE_URL";
pub const KEY_STORE_PATH_VAR: &str = "KEY_STORE_PATH";
pub const KEY_STORE_READ_ONLY_VAR: &str = "KEY_STORE_READ_ONLY";
pub const EDGE_PORT_VAR: &str = "EDGE_PORT";

const DEFAULT_COOKIE_NAME: &str = "SharedSessionCookie";
const DEFAULT_EDGE_PORT: u16 = 8081;

#[derive(Error, Debug)]
pub enum EdgeConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("environment variable {0} has an invalid value")]
    InvalidVar(&'static str),
}

#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub app_name: String,
    pub scheme_name: String,
    pub cookie_name: String,
    pub keystore: KeyStoreConfig,
    pub port: u16,
}

impl EdgeConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, EdgeConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from any key lookup. Tests inject a map here instead of
    /// mutating the process environment.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, EdgeConfigError> {
        let app_name = require(&lookup, SHARED_APP_NAME_VAR)?;
        let scheme_name = require(&lookup, SHARED_SCHEME_NAME_VAR)?;

        let cookie_name = lookup(SHARED_COOKIE_NAME_VAR)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());

        let backend = match (lookup(KEY_STORE_URL_VAR), lookup(KEY_STORE_PATH_VAR)) {
            (Some(base_url), _) if !base_url.is_empty() => KeyStoreBackend::ParamStore { base_url },
            (_, Some(root)) if !root.is_empty() => KeyStoreBackend::Fs { root },
            _ => KeyStoreBackend::default(),
        };

        // The edge only consumes keys; it writes nothing unless an operator
        // explicitly opts in.
        let read_only = match lookup(KEY_STORE_READ_ONLY_VAR).as_deref() {
            None | Some("") => true,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(_) => return Err(EdgeConfigError::InvalidVar(KEY_STORE_READ_ONLY_VAR)),
        };

        let port = match lookup(EDGE_PORT_VAR) {
            None => DEFAULT_EDGE_PORT,
            Some(raw) => raw
                .parse()
                .map_err(|_| EdgeConfigError::InvalidVar(EDGE_PORT_VAR))?,
        };

        Ok(Self {
            app_name,
            scheme_name,
            cookie_name,
            keystore: KeyStoreConfig {
                backend,
                read_only,
                ..KeyStoreConfig::default()
            },
            port,
        })
    }

    pub fn purpose(&self) -> Purpose {
        Purpose::new(&self.app_name, &self.scheme_name)
    }
}

fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, EdgeConfigError> {
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or(EdgeConfigError::MissingVar(key))
}
