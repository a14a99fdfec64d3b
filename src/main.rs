//! Session Gate issuer service.
//!
//! Loads the environment's YAML config, builds the key store selected by
//! that config, and serves the issuer gateway (login, logout, session echo,
//! relay mint, key rotation). The edge authorizer is a separate binary; see
//! `src/bin/edge_authorizer.rs`.

use session_gate::config::AppConfig;
use session_gate::{gateway, keystore, logging};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config = AppConfig::load(&env);
    if let Some(port) = get_port_override() {
        config.gateway.port = port;
    }

    let _log_guard = logging::init_logging(&config);

    tracing::info!("starting session-gate issuer in {} mode", env);
    tracing::info!(
        cookie = %config.cookie.name,
        purpose_app = %config.protection.app_name,
        purpose_scheme = %config.protection.scheme_name,
        "shared session configuration loaded"
    );

    let store = keystore::build_store(&config.keystore);
    gateway::serve(&config, store).await
}
