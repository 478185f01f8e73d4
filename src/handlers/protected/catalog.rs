use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::Permission;
use crate::database::models::{Category, CategoryNode, Product, ProductDetail, ProductTemplate, Sku};
use crate::database::Paginated;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::services::catalog_service::{
    CreateCategory, CreateProduct, CreateSku, CreateTemplate, ProductFilter, UpdateCategory, UpdateProduct, UpdateSku,
    UpdateTemplate,
};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct CategoryIds {
    pub category_ids: Vec<Uuid>,
}

// Categories

/// GET /api/categories - flat list ordered by sort_order, name
pub async fn category_list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<CategoryQuery>,
) -> ApiResult<Vec<Category>> {
    user.require(Permission::CatalogRead)?;
    let categories = state.catalog().list_categories(user.site_id, query.active_only).await?;
    Ok(ApiResponse::success(categories))
}

/// GET /api/categories/tree
pub async fn category_tree(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<CategoryQuery>,
) -> ApiResult<Vec<CategoryNode>> {
    user.require(Permission::CatalogRead)?;
    let tree = state.catalog().category_tree(user.site_id, query.active_only).await?;
    Ok(ApiResponse::success(tree))
}

pub async fn category_get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Category> {
    user.require(Permission::CatalogRead)?;
    Ok(ApiResponse::success(state.catalog().get_category(user.site_id, id).await?))
}

pub async fn category_create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateCategory>,
) -> ApiResult<Category> {
    user.require(Permission::CatalogWrite)?;
    Ok(ApiResponse::created(state.catalog().create_category(user.site_id, payload).await?))
}

pub async fn category_update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategory>,
) -> ApiResult<Category> {
    user.require(Permission::CatalogWrite)?;
    Ok(ApiResponse::success(state.catalog().update_category(user.site_id, id, payload).await?))
}

/// DELETE /api/categories/:id - 409 while children or products reference it
pub async fn category_delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Permission::CatalogWrite)?;
    state.catalog().delete_category(user.site_id, id).await?;
    Ok(ApiResponse::no_content())
}

// Templates

pub async fn template_list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Vec<ProductTemplate>> {
    user.require(Permission::CatalogRead)?;
    Ok(ApiResponse::success(state.catalog().list_templates(user.site_id).await?))
}

pub async fn template_get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductTemplate> {
    user.require(Permission::CatalogRead)?;
    Ok(ApiResponse::success(state.catalog().get_template(user.site_id, id).await?))
}

pub async fn template_create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateTemplate>,
) -> ApiResult<ProductTemplate> {
    user.require(Permission::CatalogWrite)?;
    Ok(ApiResponse::created(state.catalog().create_template(user.site_id, payload).await?))
}

pub async fn template_update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTemplate>,
) -> ApiResult<ProductTemplate> {
    user.require(Permission::CatalogWrite)?;
    Ok(ApiResponse::success(state.catalog().update_template(user.site_id, id, payload).await?))
}

pub async fn template_delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Permission::CatalogWrite)?;
    state.catalog().delete_template(user.site_id, id).await?;
    Ok(ApiResponse::no_content())
}

// Products

/// GET /api/products?page=&page_size=&q=&category_id=&status=&sort=-created_at
pub async fn product_list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<Paginated<Product>> {
    user.require(Permission::CatalogRead)?;
    let page = state
        .catalog()
        .list_products(user.site_id, &filter, &state.config.listing, false)
        .await?;
    Ok(ApiResponse::success(page))
}

pub async fn product_get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductDetail> {
    user.require(Permission::CatalogRead)?;
    Ok(ApiResponse::success(state.catalog().get_product(user.site_id, id).await?))
}

pub async fn product_create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateProduct>,
) -> ApiResult<ProductDetail> {
    user.require(Permission::CatalogWrite)?;
    Ok(ApiResponse::created(state.catalog().create_product(user.site_id, payload).await?))
}

pub async fn product_update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProduct>,
) -> ApiResult<ProductDetail> {
    user.require(Permission::CatalogWrite)?;
    Ok(ApiResponse::success(state.catalog().update_product(user.site_id, id, payload).await?))
}

/// PUT /api/products/:id/categories - replace category links
pub async fn product_set_categories(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryIds>,
) -> ApiResult<ProductDetail> {
    user.require(Permission::CatalogWrite)?;
    let detail = state
        .catalog()
        .set_product_categories(user.site_id, id, payload.category_ids)
        .await?;
    Ok(ApiResponse::success(detail))
}

pub async fn product_delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Permission::CatalogWrite)?;
    state.catalog().delete_product(user.site_id, id).await?;
    Ok(ApiResponse::no_content())
}

// SKUs

pub async fn sku_list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Vec<Sku>> {
    user.require(Permission::CatalogRead)?;
    Ok(ApiResponse::success(state.catalog().list_skus(user.site_id, product_id).await?))
}

pub async fn sku_create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<CreateSku>,
) -> ApiResult<Sku> {
    user.require(Permission::CatalogWrite)?;
    Ok(ApiResponse::created(state.catalog().create_sku(user.site_id, product_id, payload).await?))
}

pub async fn sku_get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Sku> {
    user.require(Permission::CatalogRead)?;
    Ok(ApiResponse::success(state.catalog().get_sku(user.site_id, id).await?))
}

pub async fn sku_update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSku>,
) -> ApiResult<Sku> {
    user.require(Permission::CatalogWrite)?;
    Ok(ApiResponse::success(state.catalog().update_sku(user.site_id, id, payload).await?))
}

pub async fn sku_delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Permission::CatalogWrite)?;
    state.catalog().delete_sku(user.site_id, id).await?;
    Ok(ApiResponse::no_content())
}
