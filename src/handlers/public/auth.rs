use axum::{
    extract::State,
    http::{HeaderMap, Uri},
    Json,
};

use crate::error::ApiError;
use crate::middleware::site::resolve_from_request;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::auth_service::{LoginRequest, TokenResponse};
use crate::state::AppState;

/// POST /auth/login - exchange credentials for a bearer token
///
/// ```json
/// { "email": "sales@acme.com", "password": "...", "site_id": "optional uuid" }
/// ```
///
/// Without `site_id` the site is resolved from the request host.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<TokenResponse> {
    let site_id = match payload.site_id {
        Some(id) => id,
        None => resolve_from_request(&state, &headers, &uri).await?.id,
    };

    let security = &state.config.security;
    let token = state
        .auth()
        .login(
            site_id,
            &payload.email,
            &payload.password,
            &security.jwt_secret,
            security.jwt_expiry_hours,
        )
        .await
        .map_err(ApiError::from)?;
    Ok(ApiResponse::success(token))
}
