//! OpenAPI / Swagger UI documentation for the issuer gateway.
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::HealthResponse;
use crate::issuer::handlers::{
    LoginRequest, LoginResponse, RelayTokenResponse, RotateResponse, SessionResponse,
};

/// Shared-cookie security scheme
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "SharedSessionCookie",
                    "Opaque sealed session token set by POST /api/v1/auth/login. \
                     The cookie name is configuration and must match across all \
                     participating services.",
                ))),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Session Gate Issuer API",
        version = "0.1.0",
        description = "Shared session-token issuer: authenticates once, seals an identity \
                       into a portable cookie every participating service can validate locally.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::health_check,
        crate::issuer::handlers::login,
        crate::issuer::handlers::logout,
        crate::issuer::handlers::me,
        crate::issuer::handlers::mint_relay_token,
        crate::issuer::handlers::rotate_keys,
    ),
    components(
        schemas(
            HealthResponse,
            LoginRequest,
            LoginResponse,
            SessionResponse,
            RelayTokenResponse,
            RotateResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and logout"),
        (name = "Session", description = "Session-protected endpoints"),
        (name = "Admin", description = "Key lifecycle operations"),
        (name = "System", description = "Health and diagnostics"),
    )
)]
pub struct ApiDoc;
