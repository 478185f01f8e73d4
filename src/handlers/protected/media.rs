use axum::{
    extract::{Multipart, Path, Query, State},
    Extension, Json,
};
use bytes::Bytes;
use uuid::Uuid;

use crate::auth::Permission;
use crate::database::models::MediaAsset;
use crate::database::Paginated;
use crate::error::ApiError;
use crate::media::PresignedUpload;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::services::media_service::{MediaFilter, PresignRequest, RegisterMedia};
use crate::state::AppState;

/// GET /api/media?folder=&page=&page_size=
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<MediaFilter>,
) -> ApiResult<Paginated<MediaAsset>> {
    user.require(Permission::CatalogRead)?;
    let page = state.media().list(user.site_id, &filter, &state.config.listing).await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/media - multipart with a `file` part and an optional `folder` part
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> ApiResult<MediaAsset> {
    user.require(Permission::MediaWrite)?;

    let mut file: Option<(String, Bytes)> = None;
    let mut folder: Option<String> = None;
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let body = field.bytes().await?;
                file = Some((content_type, body));
            }
            Some("folder") => folder = Some(field.text().await?),
            _ => {}
        }
    }

    let (content_type, body) = file.ok_or_else(|| ApiError::field("file", "A file part is required"))?;
    let asset = state
        .media()
        .upload(user.site_id, Some(user.id), folder.as_deref(), &content_type, body)
        .await?;
    Ok(ApiResponse::created(asset))
}

/// POST /api/media/presign `{"filename", "content_type", "folder"}`
pub async fn presign(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<PresignRequest>,
) -> ApiResult<PresignedUpload> {
    user.require(Permission::MediaWrite)?;
    Ok(ApiResponse::success(state.media().presign(user.site_id, payload).await?))
}

/// POST /api/media/register `{"key", "content_type"}` after a presigned upload
pub async fn register(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<RegisterMedia>,
) -> ApiResult<MediaAsset> {
    user.require(Permission::MediaWrite)?;
    Ok(ApiResponse::created(state.media().register(user.site_id, Some(user.id), payload).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Permission::MediaWrite)?;
    state.media().delete(user.site_id, id).await?;
    Ok(ApiResponse::no_content())
}
