use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// Shared cookie binding. Name and domain must be byte-identical across
    /// every service participating in the shared session.
    pub cookie: CookieConfig,
    /// Shared protection purpose. App name and scheme name must match across
    /// all participating services, the edge authorizer included.
    pub protection: ProtectionConfig,
    #[serde(default)]
    pub keystore: KeyStoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    /// Static user directory for the login endpoint (argon2 PHC hashes).
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub domain: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "SharedSessionCookie".to_string(),
            domain: "localhost".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProtectionConfig {
    pub app_name: String,
    pub scheme_name: String,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            app_name: "SharedSessionApp".to_string(),
            scheme_name: "Identity.Application".to_string(),
        }
    }
}

/// Key store backend selection. The backend is picked by configuration at
/// startup; every variant satisfies the same `KeyStore` contract.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum KeyStoreBackend {
    /// Local filesystem, one JSON document per key record.
    Fs { root: String },
    /// Centralized parameter store over HTTP.
    ParamStore { base_url: String },
}

impl Default for KeyStoreBackend {
    fn default() -> Self {
        Self::Fs {
            root: "./data/keys".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KeyStoreConfig {
    #[serde(flatten)]
    pub backend: KeyStoreBackend,
    /// Consumers that never generate keys run read-only; writes fail with
    /// `Unsupported` and bootstrap becomes an out-of-band operational step.
    #[serde(default)]
    pub read_only: bool,
    /// Upper bound on any single store round trip.
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
    /// Resolved key rings are cached this long; rotations propagate to other
    /// processes within this window.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_store_timeout_ms() -> u64 {
    3_000
}

fn default_cache_ttl_secs() -> u64 {
    30
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            backend: KeyStoreBackend::default(),
            read_only: false,
            timeout_ms: default_store_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Session lifetime in seconds. Every token carries a hard `not_after`.
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 3_600 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayConfig {
    /// Lifetime of service-to-service relay tokens. Deliberately short.
    pub ttl_secs: u64,
    /// Scheme name of the relay protection domain. Must differ from the
    /// cookie scheme so the two token kinds never share a derived key.
    pub scheme_name: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            scheme_name: "Internal.Relay".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserEntry {
    pub username: String,
    pub display_name: String,
    /// Argon2 hash in PHC string format.
    pub password_hash: String,
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}
