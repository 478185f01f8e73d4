use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};

use crate::database::models::{CategoryNode, Product, ProductDetail};
use crate::database::Paginated;
use crate::middleware::{ApiResponse, ApiResult, CurrentSite};
use crate::services::catalog_service::ProductFilter;
use crate::services::inquiry_service::{InquiryReceipt, SubmitInquiry};
use crate::state::AppState;

/// GET /store/categories - active category tree
pub async fn categories(
    State(state): State<AppState>,
    Extension(CurrentSite(site)): Extension<CurrentSite>,
) -> ApiResult<Vec<CategoryNode>> {
    let tree = state.catalog().category_tree(site.id, true).await?;
    Ok(ApiResponse::success(tree))
}

/// GET /store/products - published products, same filters as the admin listing
pub async fn products(
    State(state): State<AppState>,
    Extension(CurrentSite(site)): Extension<CurrentSite>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<Paginated<Product>> {
    let page = state
        .catalog()
        .list_products(site.id, &filter, &state.config.listing, true)
        .await?;
    Ok(ApiResponse::success(page))
}

/// GET /store/products/:slug
pub async fn product(
    State(state): State<AppState>,
    Extension(CurrentSite(site)): Extension<CurrentSite>,
    Path(slug): Path<String>,
) -> ApiResult<ProductDetail> {
    let detail = state.catalog().get_published_by_slug(site.id, &slug).await?;
    Ok(ApiResponse::success(detail))
}

/// POST /store/inquiries - submit a quote request
///
/// ```json
/// {
///   "email": "buyer@example.com", "name": "Jane", "company": "Acme",
///   "product_id": "uuid", "sku_id": "uuid", "quantity": 500,
///   "message": "Need pricing for Q3"
/// }
/// ```
pub async fn submit_inquiry(
    State(state): State<AppState>,
    Extension(CurrentSite(site)): Extension<CurrentSite>,
    headers: HeaderMap,
    Json(payload): Json<SubmitInquiry>,
) -> ApiResult<InquiryReceipt> {
    let receipt = state.inquiries().submit(&site, payload, client_ip(&headers)).await?;
    Ok(ApiResponse::created(receipt))
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| header("x-real-ip"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
