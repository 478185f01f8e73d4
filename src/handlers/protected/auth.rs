use axum::{extract::State, Extension};

use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::services::auth_service::TokenResponse;
use crate::services::AuthService;
use crate::state::AppState;

/// GET /api/auth/whoami - the resolved user and its effective permission codes
pub async fn whoami(Extension(user): Extension<CurrentUser>) -> ApiResult<CurrentUser> {
    Ok(ApiResponse::success(user))
}

/// POST /api/auth/refresh - fresh token for the current user
pub async fn refresh(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<TokenResponse> {
    let record = state.directory().get_user(user.site_id, user.id).await?;
    let security = &state.config.security;
    let token = AuthService::issue(record, &security.jwt_secret, security.jwt_expiry_hours)?;
    tracing::debug!(user_id = %user.id, "Refreshed token");
    Ok(ApiResponse::success(token))
}
