use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::Permission;
use crate::database::models::Inquiry;
use crate::database::Paginated;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser, FileDownload};
use crate::notify::quotation::QUOTATION_CONTENT_TYPE;
use crate::services::inquiry_service::{InquiryFilter, Reassign, UpdateStatus};
use crate::state::AppState;

/// Any of the inquiry read permissions; the scope narrows what is visible
fn require_read(user: &CurrentUser) -> Result<(), ApiError> {
    if user.can(Permission::InquiryRead)
        || user.can(Permission::InquiryReadDepartment)
        || user.can(Permission::InquiryReadAll)
    {
        Ok(())
    } else {
        user.require(Permission::InquiryRead)
    }
}

/// GET /api/inquiries?status=&is_public=&q=&page=&page_size=&sort=
///
/// `inquiry:read_all` sees the whole site, `inquiry:read_department` sees the
/// department's inquiries, everyone else sees their own. The public pool is
/// always included.
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<InquiryFilter>,
) -> ApiResult<Paginated<Inquiry>> {
    require_read(&user)?;
    let page = state
        .inquiries()
        .list(user.site_id, user.inquiry_scope(), &filter, &state.config.listing)
        .await?;
    Ok(ApiResponse::success(page))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Inquiry> {
    require_read(&user)?;
    Ok(ApiResponse::success(state.inquiries().get(user.site_id, user.inquiry_scope(), id).await?))
}

/// PATCH /api/inquiries/:id/status `{"status": "processing"}`
pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatus>,
) -> ApiResult<Inquiry> {
    user.require(Permission::InquiryWrite)?;
    let inquiry = state
        .inquiries()
        .update_status(user.site_id, user.inquiry_scope(), id, payload)
        .await?;
    Ok(ApiResponse::success(inquiry))
}

/// POST /api/inquiries/:id/claim - take a public-pool inquiry (409 if already taken)
pub async fn claim(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Inquiry> {
    user.require(Permission::InquiryWrite)?;
    Ok(ApiResponse::success(state.inquiries().claim(user.site_id, id, user.id).await?))
}

/// POST /api/inquiries/:id/assign `{"user_id": "uuid"}`
pub async fn reassign(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<Reassign>,
) -> ApiResult<Inquiry> {
    user.require(Permission::InquiryAssign)?;
    Ok(ApiResponse::success(state.inquiries().reassign(user.site_id, id, payload).await?))
}

/// GET /api/inquiries/:id/quotation - regenerated xlsx workbook
pub async fn quotation(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<FileDownload, ApiError> {
    require_read(&user)?;
    let site = state.sites().get(user.site_id).await?;
    let (filename, body) = state.inquiries().quotation(&site, user.inquiry_scope(), id).await?;
    Ok(FileDownload {
        filename,
        content_type: QUOTATION_CONTENT_TYPE.to_string(),
        body,
    })
}
