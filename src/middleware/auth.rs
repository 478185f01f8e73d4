use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::{self, AuthError, Claims};
use crate::error::ApiError;
use crate::state::AppState;

/// Token claims of the caller, set by `jwt_auth_middleware`
#[derive(Clone, Debug)]
pub struct AuthClaims {
    pub user_id: Uuid,
    pub site_id: Uuid,
    pub email: String,
    pub exp: i64,
}

impl From<Claims> for AuthClaims {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            site_id: claims.site_id,
            email: claims.email,
            exp: claims.exp,
        }
    }
}

/// Validate the bearer token and inject `AuthClaims`
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers).map_err(ApiError::unauthorized)?;

    let claims = auth::decode_jwt(token, &state.config.security.jwt_secret).map_err(|e| match e {
        AuthError::MissingSecret => {
            tracing::error!("JWT secret is not configured");
            ApiError::service_unavailable("Authentication is not configured")
        }
        other => {
            tracing::debug!("Rejected token: {}", other);
            ApiError::unauthorized("Invalid or expired token")
        }
    })?;

    request.extensions_mut().insert(AuthClaims::from(claims));
    Ok(next.run(request).await)
}

/// Extract the token from `Authorization: Bearer <token>`
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("Missing Authorization header")?
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or("Authorization header must use Bearer token format")?
        .trim();
    if token.is_empty() {
        return Err("Empty bearer token");
    }
    Ok(token)
}
