//! Session Gate - shared session-token protocol.
//!
//! Single-sign-on across independently deployed services: a user
//! authenticates once against the issuer, which seals the identity into a
//! tamper-evident token carried in a shared cookie. Every other service -
//! down to a minimal edge authorizer with none of the issuer's machinery -
//! validates that cookie locally, with no network call back to the issuer.
//!
//! # Modules
//!
//! - [`keystore`] - pluggable storage for the symmetric key material
//! - [`keyring`] - key lifecycle: fetch-or-bootstrap, rotation, candidates
//! - [`protector`] - authenticated seal/open bound to a purpose chain
//! - [`issuer`] - credential check, claims construction, cookie binding
//! - [`authorizer`] - stateless edge admit/deny from the cookie alone
//! - [`relay`] - short-lived service-to-service bearer credential
//! - [`gateway`] - the issuer service's HTTP wiring
//! - [`config`] / [`logging`] - application configuration and tracing setup

pub mod authorizer;
pub mod config;
pub mod gateway;
pub mod issuer;
pub mod keyring;
pub mod keystore;
pub mod logging;
pub mod protector;
pub mod relay;

// Convenient re-exports at crate root
pub use authorizer::{Decision, DenyReason, EdgeAuthorizer, EdgeConfig};
pub use config::AppConfig;
pub use issuer::{CookieBinding, Identity, SessionIssuer};
pub use keyring::KeyManager;
pub use keystore::{FsKeyStore, HttpParamStore, KeyRecord, KeyStore, MemoryKeyStore};
pub use protector::{Claims, Purpose, TokenProtector};
pub use relay::RelayIssuer;
