use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::Site;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::services::site_service::{CreateSite, UpdateSite};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SiteQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /api/root/sites?include_inactive=true
pub async fn list(State(state): State<AppState>, Query(query): Query<SiteQuery>) -> ApiResult<Vec<Site>> {
    Ok(ApiResponse::success(state.sites().list(query.include_inactive).await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Site> {
    Ok(ApiResponse::success(state.sites().get(id).await?))
}

/// POST /api/root/sites `{"name", "domain", "aliases", "contact_email"}`
pub async fn create(State(state): State<AppState>, Json(payload): Json<CreateSite>) -> ApiResult<Site> {
    Ok(ApiResponse::created(state.sites().create(payload).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSite>,
) -> ApiResult<Site> {
    if payload.is_active == Some(false) {
        refuse_own_site(&user, id)?;
    }
    Ok(ApiResponse::success(state.sites().update(id, payload).await?))
}

/// DELETE /api/root/sites/:id - deactivates; rows are kept
pub async fn deactivate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Site> {
    refuse_own_site(&user, id)?;
    let site = state.sites().deactivate(id).await?;
    tracing::info!(site_id = %id, "Site deactivated");
    Ok(ApiResponse::success(site))
}

/// Staff of a deactivated site can no longer sign in, the caller included
fn refuse_own_site(user: &CurrentUser, site_id: Uuid) -> Result<(), ApiError> {
    if site_id == user.site_id {
        return Err(ApiError::conflict("Cannot deactivate the site your own account belongs to"));
    }
    Ok(())
}
