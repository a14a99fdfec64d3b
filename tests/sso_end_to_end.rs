//! End-to-end shared-session scenarios.
//!
//! Each test stands up the issuer and one or more validators as separate
//! component instances sharing nothing but a key store directory - the
//! closest in-process analog to independently deployed services.

use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use axum::http::{HeaderMap, header::COOKIE};
use std::path::Path;
use std::sync::Arc;

use session_gate::authorizer::{DenyReason, EdgeAuthorizer};
use session_gate::config::{
    AppConfig, CookieConfig, GatewayConfig, KeyStoreBackend, KeyStoreConfig, ProtectionConfig,
    RelayConfig, SessionConfig, UserEntry,
};
use session_gate::keyring::KeyManager;
use session_gate::keystore::{FsKeyStore, KeyStore, ReadOnlyStore};
use session_gate::protector::{Purpose, TokenProtector};
use session_gate::gateway;

const COOKIE_NAME: &str = "SharedSessionCookie";
const APP_NAME: &str = "SharedSessionApp";
const SCHEME_NAME: &str = "Identity.Application";
const PASSWORD: &str = "correct horse battery staple";

fn hash_password(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

fn test_config(keys_root: &Path, session_ttl_secs: u64) -> AppConfig {
    AppConfig {
        log_level: "info".to_string(),
        log_dir: "./logs".to_string(),
        log_file: "test.log".to_string(),
        use_json: false,
        rotation: "never".to_string(),
        gateway: GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        cookie: CookieConfig {
            name: COOKIE_NAME.to_string(),
            domain: "localhost".to_string(),
        },
        protection: ProtectionConfig {
            app_name: APP_NAME.to_string(),
            scheme_name: SCHEME_NAME.to_string(),
        },
        keystore: KeyStoreConfig {
            backend: KeyStoreBackend::Fs {
                root: keys_root.display().to_string(),
            },
            read_only: false,
            cache_ttl_secs: 0,
            timeout_ms: 3_000,
        },
        session: SessionConfig {
            ttl_secs: session_ttl_secs,
        },
        relay: RelayConfig::default(),
        users: vec![UserEntry {
            username: "admin".to_string(),
            display_name: "Administrator".to_string(),
            password_hash: hash_password(PASSWORD),
        }],
    }
}

/// A validator as a separate deployment would run it: its own store handle
/// (read-only), its own key manager and protector, configuration only.
fn edge_authorizer(keys_root: &Path, cookie_name: &str) -> EdgeAuthorizer {
    let store = Arc::new(ReadOnlyStore::new(FsKeyStore::new(keys_root)));
    let manager = Arc::new(KeyManager::new(
        store,
        &KeyStoreConfig {
            cache_ttl_secs: 0,
            ..KeyStoreConfig::default()
        },
    ));
    EdgeAuthorizer::new(
        Arc::new(TokenProtector::new(manager)),
        Purpose::new(APP_NAME, SCHEME_NAME),
        cookie_name.to_string(),
    )
}

fn cookie_headers(cookie_name: &str, token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        COOKIE,
        format!("{}={}", cookie_name, token).parse().unwrap(),
    );
    headers
}

/// Start the issuer gateway on an ephemeral port, return its base URL.
async fn spawn_gateway(config: &AppConfig, keys_root: &Path) -> String {
    let state = gateway::build_state(config, Arc::new(FsKeyStore::new(keys_root)));
    let app = gateway::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn login_and_extract_token(client: &reqwest::Client, base: &str) -> String {
    let resp = client
        .post(format!("{}/api/v1/auth/login", base))
        .json(&serde_json::json!({ "username": "admin", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let set_cookie = resp
        .headers()
        .get("set-cookie")
        .expect("login must set the shared cookie")
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with(&format!("{}=", COOKIE_NAME)));
    assert!(set_cookie.contains("HttpOnly"));

    let (_, rest) = set_cookie.split_once('=').unwrap();
    rest.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn e2e_login_cookie_admits_at_separate_edge() {
    let keys_dir = tempfile::tempdir().unwrap();
    let config = test_config(keys_dir.path(), 3_600);
    let base = spawn_gateway(&config, keys_dir.path()).await;

    let client = reqwest::Client::new();
    let token = login_and_extract_token(&client, &base).await;

    // A completely separate validator over the same key directory admits it.
    let edge = edge_authorizer(keys_dir.path(), COOKIE_NAME);
    let decision = edge.authorize(&cookie_headers(COOKIE_NAME, &token)).await;
    assert!(decision.is_allowed(), "edge denied a freshly issued session");

    // Same request against an authorizer configured with a different cookie
    // name: the token never reaches decryption.
    let renamed = edge_authorizer(keys_dir.path(), "SomeOtherCookie");
    let decision = renamed.authorize(&cookie_headers(COOKIE_NAME, &token)).await;
    assert_eq!(decision.deny_reason(), Some(DenyReason::NoCookie));
}

#[tokio::test]
async fn e2e_session_endpoints_round_trip() {
    let keys_dir = tempfile::tempdir().unwrap();
    let config = test_config(keys_dir.path(), 3_600);
    let base = spawn_gateway(&config, keys_dir.path()).await;

    let client = reqwest::Client::new();
    let token = login_and_extract_token(&client, &base).await;
    let cookie = format!("{}={}", COOKIE_NAME, token);

    // Session echo sees the identity that logged in.
    let me: serde_json::Value = client
        .get(format!("{}/api/v1/session/me", base))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["code"], 0);
    assert_eq!(me["data"]["subject"], "admin");
    assert_eq!(me["data"]["display_name"], "Administrator");

    // Without the cookie the same endpoint is closed.
    let resp = client
        .get(format!("{}/api/v1/session/me", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // A session can mint a relay token for service-to-service hops.
    let relay: serde_json::Value = client
        .post(format!("{}/api/v1/relay/token", base))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(relay["code"], 0);
    assert!(relay["data"]["token"].as_str().unwrap().contains('.'));
}

#[tokio::test]
async fn e2e_bad_credentials_get_one_generic_message() {
    let keys_dir = tempfile::tempdir().unwrap();
    let config = test_config(keys_dir.path(), 3_600);
    let base = spawn_gateway(&config, keys_dir.path()).await;
    let client = reqwest::Client::new();

    let mut messages = Vec::new();
    for (user, pass) in [("admin", "wrong-password"), ("no-such-user", PASSWORD)] {
        let resp = client
            .post(format!("{}/api/v1/auth/login", base))
            .json(&serde_json::json!({ "username": user, "password": pass }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        let body: serde_json::Value = resp.json().await.unwrap();
        messages.push(body["msg"].as_str().unwrap().to_string());
    }

    // Wrong password and unknown user must be indistinguishable.
    assert_eq!(messages[0], messages[1]);
}

#[tokio::test]
async fn e2e_rotation_preserves_outstanding_sessions() {
    let keys_dir = tempfile::tempdir().unwrap();
    let config = test_config(keys_dir.path(), 3_600);
    let base = spawn_gateway(&config, keys_dir.path()).await;

    let client = reqwest::Client::new();
    let token = login_and_extract_token(&client, &base).await;
    let cookie = format!("{}={}", COOKIE_NAME, token);

    // Rotate through the admin endpoint (session-protected).
    let rotate: serde_json::Value = client
        .post(format!("{}/api/v1/admin/keys/rotate", base))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rotate["code"], 0);
    assert_eq!(rotate["data"]["sequence"], 1);

    // A validator started after the rotation still admits the old session.
    let edge = edge_authorizer(keys_dir.path(), COOKIE_NAME);
    let decision = edge.authorize(&cookie_headers(COOKIE_NAME, &token)).await;
    assert!(decision.is_allowed(), "rotation invalidated a live session");

    // And sessions issued after the rotation admit as well.
    let new_token = login_and_extract_token(&client, &base).await;
    let decision = edge
        .authorize(&cookie_headers(COOKIE_NAME, &new_token))
        .await;
    assert!(decision.is_allowed());
}

#[tokio::test]
async fn e2e_expired_session_denies_at_edge() {
    let keys_dir = tempfile::tempdir().unwrap();
    // ttl of zero: not_after == issued_at, expired on arrival.
    let config = test_config(keys_dir.path(), 0);
    let base = spawn_gateway(&config, keys_dir.path()).await;

    let client = reqwest::Client::new();
    let token = login_and_extract_token(&client, &base).await;

    let edge = edge_authorizer(keys_dir.path(), COOKIE_NAME);
    let decision = edge.authorize(&cookie_headers(COOKIE_NAME, &token)).await;
    assert_eq!(decision.deny_reason(), Some(DenyReason::Expired));
}

#[tokio::test]
async fn e2e_tampered_cookie_denies_at_edge() {
    let keys_dir = tempfile::tempdir().unwrap();
    let config = test_config(keys_dir.path(), 3_600);
    let base = spawn_gateway(&config, keys_dir.path()).await;

    let client = reqwest::Client::new();
    let token = login_and_extract_token(&client, &base).await;

    // Flip one character of the sealed token.
    let mut tampered: Vec<char> = token.chars().collect();
    let last = tampered.len() - 1;
    tampered[last] = if tampered[last] == 'A' { 'B' } else { 'A' };
    let tampered: String = tampered.into_iter().collect();

    let edge = edge_authorizer(keys_dir.path(), COOKIE_NAME);
    let decision = edge
        .authorize(&cookie_headers(COOKIE_NAME, &tampered))
        .await;
    assert_eq!(decision.deny_reason(), Some(DenyReason::InvalidToken));
}

#[tokio::test]
async fn concurrent_bootstrap_converges_on_one_persisted_key() {
    let keys_dir = tempfile::tempdir().unwrap();
    let purpose = Purpose::new(APP_NAME, SCHEME_NAME);
    let chain = purpose.chain();

    // Eight "processes", each with its own store handle and manager, race
    // first use against an empty directory.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let root = keys_dir.path().to_path_buf();
        let chain = chain.clone();
        handles.push(tokio::spawn(async move {
            let store: Arc<dyn KeyStore> = Arc::new(FsKeyStore::new(root));
            let manager = KeyManager::new(
                store,
                &KeyStoreConfig {
                    cache_ttl_secs: 0,
                    ..KeyStoreConfig::default()
                },
            );
            manager.active_key(&chain).await.unwrap().key_id
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 1, "bootstrap produced divergent active keys");

    // Exactly one record on disk.
    let purpose_dir = keys_dir.path().join(&chain);
    let persisted = std::fs::read_dir(&purpose_dir).unwrap().count();
    assert_eq!(persisted, 1);
}

#[tokio::test]
async fn validator_works_from_claims_alone() {
    // The allow decision carries the opened claims so an edge can forward
    // identity downstream without any further lookup.
    let keys_dir = tempfile::tempdir().unwrap();
    let config = test_config(keys_dir.path(), 3_600);
    let base = spawn_gateway(&config, keys_dir.path()).await;

    let client = reqwest::Client::new();
    let token = login_and_extract_token(&client, &base).await;

    let edge = edge_authorizer(keys_dir.path(), COOKIE_NAME);
    match edge.authorize(&cookie_headers(COOKIE_NAME, &token)).await {
        session_gate::Decision::Allow { claims } => {
            assert_eq!(claims.sub, "admin");
            assert!(!claims.is_expired_at(chrono::Utc::now()));
        }
        session_gate::Decision::Deny { reason } => {
            panic!("denied: {}", reason.name());
        }
    }
}
