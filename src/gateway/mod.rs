//! Issuer gateway wiring: state construction, router, serve loop.
//!
//! ## Components
//! - `state`: shared `AppState` built once from explicit configuration
//! - `types`: unified `ApiResponse` envelope and error codes
//! - `openapi`: Swagger UI / OpenAPI document

pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::issuer::{SessionIssuer, StaticDirectory, handlers, session_middleware};
use crate::keyring::KeyManager;
use crate::keystore::KeyStore;
use crate::protector::{Purpose, TokenProtector};
use crate::relay::RelayIssuer;
use state::AppState;
use types::ApiResponse;

/// Health check response data
#[derive(serde::Serialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_u64)]
    pub timestamp_ms: u64,
    #[schema(example = "0.1.0")]
    pub version: &'static str,
}

/// Health check endpoint
///
/// Liveness only; deliberately does not touch the key store, so a store
/// outage degrades logins without flapping the service itself.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse)
    ),
    tag = "System"
)]
pub async fn health_check(
    State(_state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    (
        StatusCode::OK,
        Json(ApiResponse::success(HealthResponse {
            timestamp_ms,
            version: env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Build the shared state from explicit configuration and a key store.
///
/// The store is constructed by the caller (backend selection lives with the
/// binary), everything downstream of it here: one `KeyManager`, one
/// `TokenProtector`, and the issuers that share them.
pub fn build_state(config: &AppConfig, store: Arc<dyn KeyStore>) -> Arc<AppState> {
    let key_manager = Arc::new(KeyManager::new(store, &config.keystore));
    let protector = Arc::new(TokenProtector::new(key_manager.clone()));

    let session_purpose = Purpose::new(
        &config.protection.app_name,
        &config.protection.scheme_name,
    );
    let relay_purpose = Purpose::new(&config.protection.app_name, &config.relay.scheme_name);

    let issuer = Arc::new(SessionIssuer::new(
        protector,
        session_purpose.clone(),
        Arc::new(StaticDirectory::new(config.users.clone())),
        config.cookie.clone(),
        &config.session,
    ));
    let relay = Arc::new(RelayIssuer::new(
        key_manager.clone(),
        relay_purpose,
        &config.relay,
    ));

    Arc::new(AppState {
        issuer,
        relay,
        key_manager,
        session_purpose,
        relay_ttl_secs: config.relay.ttl_secs,
    })
}

/// Assemble the issuer gateway router.
pub fn build_router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // Auth routes (no session required)
    // ==========================================================================
    let auth_routes = Router::new()
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout));

    // ==========================================================================
    // Session-protected routes
    // ==========================================================================
    let session_routes = Router::new()
        .route("/me", get(handlers::me))
        .layer(from_fn_with_state(state.clone(), session_middleware));

    let relay_routes = Router::new()
        .route("/token", post(handlers::mint_relay_token))
        .layer(from_fn_with_state(state.clone(), session_middleware));

    let admin_routes = Router::new()
        .route("/keys/rotate", post(handlers::rotate_keys))
        .layer(from_fn_with_state(state.clone(), session_middleware));

    Router::new()
        .route("/api/v1/health", get(health_check))
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1/session", session_routes)
        .nest("/api/v1/relay", relay_routes)
        .nest("/api/v1/admin", admin_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Bind and serve until shutdown.
pub async fn serve(config: &AppConfig, store: Arc<dyn KeyStore>) -> anyhow::Result<()> {
    let state = build_state(config, store);
    let app = build_router(state);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "failed to bind to {}: {} (is the port already in use?)",
            addr,
            e
        )
    })?;

    tracing::info!("issuer gateway listening on http://{}", addr);
    tracing::info!("api docs at http://{}/docs", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
