//! Edge authorizer service.
//!
//! A deliberately minimal binary that fronts services which never see the
//! issuer: it reads the shared cookie from each inbound request and answers
//! 204 (admit) or 401 (deny) in the forward-auth style reverse proxies
//! expect. Configuration is environment-only; there is no config file, no
//! user directory, and no write path to the key store by default.
//!
//! A misconfigured environment does not crash-loop the process: it serves
//! an always-deny handler so the fronted services stay closed, and the logs
//! say operator error rather than authentication failure.

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use session_gate::authorizer::{Decision, DenyReason, EdgeAuthorizer, EdgeConfig};
use session_gate::keyring::KeyManager;
use session_gate::keystore;
use session_gate::protector::TokenProtector;

/// Identity echo header on admitted requests, for downstream services.
const SUBJECT_HEADER: &str = "x-auth-subject";

const MISCONFIGURED_PORT: u16 = 8081;

async fn authorize(
    State(authorizer): State<Arc<EdgeAuthorizer>>,
    headers: HeaderMap,
) -> Response {
    match authorizer.authorize(&headers).await {
        Decision::Allow { claims } => {
            let mut response = StatusCode::NO_CONTENT.into_response();
            if let Ok(value) = HeaderValue::from_str(&claims.sub) {
                response.headers_mut().insert(SUBJECT_HEADER, value);
            }
            response
        }
        // The reason stays in the logs; callers only see 401.
        Decision::Deny { .. } => StatusCode::UNAUTHORIZED.into_response(),
    }
}

/// Every request denied, config error logged as such. Operators fix the
/// environment; callers never get admitted by accident.
async fn deny_misconfigured() -> StatusCode {
    tracing::error!(
        reason = DenyReason::MisconfiguredEnvironment.name(),
        "denying request: required environment variables are missing"
    );
    StatusCode::UNAUTHORIZED
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (app, port): (Router, u16) = match EdgeConfig::from_env() {
        Ok(config) => {
            let store = keystore::build_store(&config.keystore);
            let key_manager = Arc::new(KeyManager::new(store, &config.keystore));
            let protector = Arc::new(TokenProtector::new(key_manager));
            let authorizer = Arc::new(EdgeAuthorizer::new(
                protector,
                config.purpose(),
                config.cookie_name.clone(),
            ));

            tracing::info!(
                purpose = %config.purpose().chain(),
                cookie = %config.cookie_name,
                "edge authorizer configured"
            );

            let app = Router::new()
                .route("/authorize", get(authorize))
                .route("/healthz", get(|| async { StatusCode::NO_CONTENT }))
                .with_state(authorizer);
            (app, config.port)
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                "edge authorizer misconfigured; serving always-deny"
            );
            let app = Router::new()
                .route("/authorize", get(deny_misconfigured))
                .route("/healthz", get(|| async { StatusCode::NO_CONTENT }));
            (app, MISCONFIGURED_PORT)
        }
    };

    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %addr, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!("edge authorizer listening on http://{}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
