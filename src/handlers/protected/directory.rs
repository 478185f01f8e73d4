use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::Permission;
use crate::database::models::{Department, Role, User};
use crate::database::Paginated;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::services::directory_service::{
    CreateDepartment, CreateRole, CreateUser, UpdateDepartment, UpdateRole, UpdateUser, UserDetail, UserFilter,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleIds {
    pub role_ids: Vec<Uuid>,
}

// Departments

/// GET /api/departments - readable by any signed-in user
pub async fn department_list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Vec<Department>> {
    Ok(ApiResponse::success(state.directory().list_departments(user.site_id).await?))
}

pub async fn department_get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Department> {
    Ok(ApiResponse::success(state.directory().get_department(user.site_id, id).await?))
}

pub async fn department_create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateDepartment>,
) -> ApiResult<Department> {
    user.require(Permission::DepartmentManage)?;
    Ok(ApiResponse::created(state.directory().create_department(user.site_id, payload).await?))
}

pub async fn department_update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDepartment>,
) -> ApiResult<Department> {
    user.require(Permission::DepartmentManage)?;
    Ok(ApiResponse::success(state.directory().update_department(user.site_id, id, payload).await?))
}

/// DELETE /api/departments/:id - 409 while users remain
pub async fn department_delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Permission::DepartmentManage)?;
    state.directory().delete_department(user.site_id, id).await?;
    Ok(ApiResponse::no_content())
}

// Roles

pub async fn role_list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Vec<Role>> {
    user.require(Permission::UserManage)?;
    Ok(ApiResponse::success(state.directory().list_roles(user.site_id).await?))
}

pub async fn role_create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateRole>,
) -> ApiResult<Role> {
    user.require(Permission::UserManage)?;
    Ok(ApiResponse::created(state.directory().create_role(user.site_id, payload).await?))
}

pub async fn role_update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRole>,
) -> ApiResult<Role> {
    user.require(Permission::UserManage)?;
    Ok(ApiResponse::success(state.directory().update_role(user.site_id, id, payload).await?))
}

pub async fn role_delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Permission::UserManage)?;
    state.directory().delete_role(user.site_id, id).await?;
    Ok(ApiResponse::no_content())
}

// Users

/// GET /api/users?page=&page_size=&q=&department_id=&is_active=
pub async fn user_list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<UserFilter>,
) -> ApiResult<Paginated<User>> {
    user.require(Permission::UserManage)?;
    let page = state
        .directory()
        .list_users(user.site_id, &filter, &state.config.listing)
        .await?;
    Ok(ApiResponse::success(page))
}

pub async fn user_get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<UserDetail> {
    user.require(Permission::UserManage)?;
    Ok(ApiResponse::success(state.directory().get_user_detail(user.site_id, id).await?))
}

pub async fn user_create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateUser>,
) -> ApiResult<UserDetail> {
    user.require(Permission::UserManage)?;
    if payload.is_super_admin && !user.is_super_admin {
        return Err(ApiError::forbidden("Only super admins can create super admins"));
    }
    Ok(ApiResponse::created(state.directory().create_user(user.site_id, payload).await?))
}

pub async fn user_update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUser>,
) -> ApiResult<User> {
    user.require(Permission::UserManage)?;
    if id == user.id && payload.is_active == Some(false) {
        return Err(ApiError::field("is_active", "You cannot deactivate your own account"));
    }
    let target = state.directory().get_user(user.site_id, id).await?;
    user.require_manageable(&target)?;
    Ok(ApiResponse::success(state.directory().update_user(user.site_id, id, payload).await?))
}

/// PUT /api/users/:id/roles - replace role assignments
pub async fn user_set_roles(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleIds>,
) -> ApiResult<UserDetail> {
    user.require(Permission::UserManage)?;
    let target = state.directory().get_user(user.site_id, id).await?;
    user.require_manageable(&target)?;
    Ok(ApiResponse::success(state.directory().set_user_roles(user.site_id, id, payload.role_ids).await?))
}
