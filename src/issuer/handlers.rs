use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use super::middleware::SessionIdentity;
use super::service::IssueError;
use crate::gateway::types::{ApiResponse, error_codes};
use crate::gateway::state::AppState;

/// Login Request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin")]
    #[validate(length(min = 1))]
    pub username: String,
    #[schema(example = "correct horse battery staple")]
    #[validate(length(min = 1))]
    pub password: String,
}

/// Login Response (the session itself travels in the Set-Cookie header)
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub subject: String,
    pub display_name: String,
    pub not_after: DateTime<Utc>,
}

/// Session echo for the authenticated caller
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub subject: String,
    pub display_name: String,
    pub issued_at: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Relay token mint response
#[derive(Debug, Serialize, ToSchema)]
pub struct RelayTokenResponse {
    pub token: String,
    pub expires_in_secs: u64,
}

/// Key rotation response
#[derive(Debug, Serialize, ToSchema)]
pub struct RotateResponse {
    /// Short id of the new active key
    pub key_id: String,
    pub sequence: u32,
}

/// Login and receive the shared session cookie
///
/// POST /api/v1/auth/login
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; shared cookie set", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials"),
        (status = 503, description = "Key store unavailable")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<
    (StatusCode, [(axum::http::HeaderName, String); 1], Json<ApiResponse<LoginResponse>>),
    (StatusCode, Json<ApiResponse<()>>),
> {
    if req.validate().is_err() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                error_codes::INVALID_PARAMETER,
                "Username and password are required",
            )),
        ));
    }

    match state.issuer.login(&req.username, &req.password).await {
        Ok((identity, binding)) => {
            let not_after = Utc::now() + chrono::Duration::seconds(binding.max_age_secs);
            let set_cookie = binding.to_set_cookie();
            Ok((
                StatusCode::OK,
                [(SET_COOKIE, set_cookie)],
                Json(ApiResponse::success(LoginResponse {
                    subject: identity.subject,
                    display_name: identity.display_name,
                    not_after,
                })),
            ))
        }
        Err(IssueError::Credential(_)) => {
            // One generic message no matter which part was wrong.
            tracing::warn!(username = %req.username, "login failed");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::<()>::error(
                    error_codes::AUTH_FAILED,
                    "Invalid username or password",
                )),
            ))
        }
        Err(IssueError::Protect(e)) => {
            tracing::error!(error = %e, "session issuance failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<()>::error(
                    error_codes::SERVICE_UNAVAILABLE,
                    "Unable to issue session",
                )),
            ))
        }
    }
}

/// Clear the shared session cookie
///
/// POST /api/v1/auth/logout
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Cookie cleared")
    ),
    tag = "Auth"
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, [(axum::http::HeaderName, String); 1], Json<ApiResponse<()>>) {
    // Sessions are stateless: there is nothing to revoke server-side, only
    // the client-held cookie to expire.
    (
        StatusCode::OK,
        [(SET_COOKIE, state.issuer.logout_cookie())],
        Json(ApiResponse::success(())),
    )
}

/// Echo the authenticated session
///
/// GET /api/v1/session/me
#[utoipa::path(
    get,
    path = "/api/v1/session/me",
    responses(
        (status = 200, description = "Current session", body = ApiResponse<SessionResponse>),
        (status = 401, description = "No valid session")
    ),
    tag = "Session"
)]
pub async fn me(
    Extension(SessionIdentity(claims)): Extension<SessionIdentity>,
) -> (StatusCode, Json<ApiResponse<SessionResponse>>) {
    (
        StatusCode::OK,
        Json(ApiResponse::success(SessionResponse {
            subject: claims.sub,
            display_name: claims.name,
            issued_at: claims.issued_at,
            not_after: claims.not_after,
        })),
    )
}

/// Mint a short-lived relay token for service-to-service calls
///
/// POST /api/v1/relay/token
#[utoipa::path(
    post,
    path = "/api/v1/relay/token",
    responses(
        (status = 200, description = "Relay token minted", body = ApiResponse<RelayTokenResponse>),
        (status = 401, description = "No valid session"),
        (status = 503, description = "Key store unavailable")
    ),
    tag = "Session"
)]
pub async fn mint_relay_token(
    State(state): State<Arc<AppState>>,
    Extension(SessionIdentity(claims)): Extension<SessionIdentity>,
) -> Result<(StatusCode, Json<ApiResponse<RelayTokenResponse>>), (StatusCode, Json<ApiResponse<()>>)>
{
    match state.relay.mint(&claims.sub).await {
        Ok(token) => Ok((
            StatusCode::OK,
            Json(ApiResponse::success(RelayTokenResponse {
                token,
                expires_in_secs: state.relay_ttl_secs,
            })),
        )),
        Err(e) => {
            tracing::error!(error = %e, "relay token mint failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<()>::error(
                    error_codes::SERVICE_UNAVAILABLE,
                    "Unable to mint relay token",
                )),
            ))
        }
    }
}

/// Rotate the session signing key
///
/// POST /api/v1/admin/keys/rotate
///
/// Appends a new active key. Sessions sealed under the previous key keep
/// validating until their own expiry; other processes pick the new key up
/// within their ring-cache TTL.
#[utoipa::path(
    post,
    path = "/api/v1/admin/keys/rotate",
    responses(
        (status = 200, description = "New active key created", body = ApiResponse<RotateResponse>),
        (status = 401, description = "No valid session"),
        (status = 503, description = "Key store unavailable or read-only")
    ),
    tag = "Admin"
)]
pub async fn rotate_keys(
    State(state): State<Arc<AppState>>,
    Extension(SessionIdentity(claims)): Extension<SessionIdentity>,
) -> Result<(StatusCode, Json<ApiResponse<RotateResponse>>), (StatusCode, Json<ApiResponse<()>>)> {
    match state.key_manager.rotate(&state.session_purpose.chain()).await {
        Ok(record) => {
            tracing::info!(by = %claims.sub, key = %record.id_short(), "session key rotated");
            Ok((
                StatusCode::OK,
                Json(ApiResponse::success(RotateResponse {
                    key_id: record.id_short(),
                    sequence: record.sequence,
                })),
            ))
        }
        Err(e) => {
            tracing::error!(error = %e, "key rotation failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<()>::error(
                    error_codes::SERVICE_UNAVAILABLE,
                    "Key rotation failed",
                )),
            ))
        }
    }
}
