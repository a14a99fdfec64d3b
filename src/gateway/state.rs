use std::sync::Arc;

use crate::issuer::SessionIssuer;
use crate::keyring::KeyManager;
use crate::protector::Purpose;
use crate::relay::RelayIssuer;

/// Issuer gateway shared state.
///
/// Everything here is built once at startup from explicit configuration and
/// cloned into handlers; there is no ambient registry to look things up in.
#[derive(Clone)]
pub struct AppState {
    /// Session issuance + in-process validation
    pub issuer: Arc<SessionIssuer>,
    /// Relay bearer-token mint (distinct protection domain)
    pub relay: Arc<RelayIssuer>,
    /// Key lifecycle, shared by issuer and relay
    pub key_manager: Arc<KeyManager>,
    /// Purpose of the shared session cookie
    pub session_purpose: Purpose,
    /// Advertised relay token lifetime
    pub relay_ttl_secs: u64,
}
