//! Cookie-session middleware for the issuer's own protected routes.
//!
//! Other services validate the same cookie through the edge authorizer; the
//! issuing service validates it in-process with this middleware and injects
//! the opened identity into request extensions.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::authorizer::cookie_value;
use crate::gateway::state::AppState;
use crate::gateway::types::{ApiResponse, error_codes};
use crate::protector::{Claims, ProtectError};

/// Identity opened from the session cookie, injected into extensions.
#[derive(Debug, Clone)]
pub struct SessionIdentity(pub Claims);

pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiResponse<()>>)> {
    // 1. Extract the shared cookie
    let token = cookie_value(request.headers(), state.issuer.cookie_name())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(
                error_codes::MISSING_SESSION,
                "No session cookie",
            )),
        ))?
        .to_string();

    // 2. Open the token
    match state.issuer.open_session(&token).await {
        Ok(claims) => {
            // 3. Inject identity and continue
            request.extensions_mut().insert(SessionIdentity(claims));
            Ok(next.run(request).await)
        }
        Err(ProtectError::Expired(_)) => Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(
                error_codes::SESSION_EXPIRED,
                "Session expired",
            )),
        )),
        Err(ProtectError::InvalidToken) => Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error(
                error_codes::AUTH_FAILED,
                "Invalid session",
            )),
        )),
        Err(ProtectError::Keyring(e)) => {
            tracing::error!(error = %e, "session validation unavailable");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<()>::error(
                    error_codes::SERVICE_UNAVAILABLE,
                    "Session validation unavailable",
                )),
            ))
        }
    }
}
