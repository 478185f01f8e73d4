use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::media::content_type_for_key;
use crate::state::AppState;

/// GET /media/*key - stream an object back for backends without a public origin
pub async fn serve(State(state): State<AppState>, Path(key): Path<String>) -> Result<Response, ApiError> {
    let key = key.trim_start_matches('/');
    if !key.starts_with("sites/") || key.contains("..") {
        return Err(ApiError::not_found("Object not found"));
    }

    let (body, content_type) = state.media().fetch(key).await?;
    let content_type = content_type.unwrap_or_else(|| content_type_for_key(key).to_string());

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=31536000, immutable"));
    Ok(response)
}
