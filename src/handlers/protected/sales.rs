use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use crate::auth::Permission;
use crate::database::models::SalesResponsibility;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::services::sales_service::{CreateResponsibility, ResponsibilityFilter, UpdateResponsibility};
use crate::state::AppState;

/// GET /api/sales-responsibilities?category_id=&user_id=
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<ResponsibilityFilter>,
) -> ApiResult<Vec<SalesResponsibility>> {
    user.require(Permission::SalesManage)?;
    Ok(ApiResponse::success(state.sales().list(user.site_id, &filter).await?))
}

/// POST /api/sales-responsibilities - `master_category_id` must be a root category
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateResponsibility>,
) -> ApiResult<SalesResponsibility> {
    user.require(Permission::SalesManage)?;
    Ok(ApiResponse::created(state.sales().create(user.site_id, payload).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateResponsibility>,
) -> ApiResult<SalesResponsibility> {
    user.require(Permission::SalesManage)?;
    Ok(ApiResponse::success(state.sales().update(user.site_id, id, payload).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    user.require(Permission::SalesManage)?;
    state.sales().delete(user.site_id, id).await?;
    Ok(ApiResponse::no_content())
}
