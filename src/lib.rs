pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod media;
pub mod middleware;
pub mod notify;
pub mod services;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::SecurityConfig;
use crate::handlers::{elevated, protected, public};
use crate::middleware::{
    jwt_auth_middleware, require_super_admin_middleware, resolve_site_middleware, validate_user_middleware,
};

pub use state::AppState;

/// Build the full router for the given state
pub fn app(state: AppState) -> Router {
    let body_limit = state
        .config
        .api
        .max_request_size_bytes
        .max(state.config.storage.max_upload_bytes + 64 * 1024);

    let mut router = Router::new()
        .merge(public_routes())
        .merge(store_routes(&state))
        .merge(protected_routes(&state))
        .layer(DefaultBodyLimit::max(body_limit));

    if state.config.security.enable_cors {
        router = router.layer(cors_layer(&state.config.security));
    }
    if state.config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router.with_state(state)
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(public::system::root))
        .route("/health", get(public::system::health))
        .route("/auth/login", post(public::auth::login))
        .route("/media/*key", get(public::media::serve))
}

fn store_routes(state: &AppState) -> Router<AppState> {
    use public::store;

    Router::new()
        .route("/store/categories", get(store::categories))
        .route("/store/products", get(store::products))
        .route("/store/products/:slug", get(store::product))
        .route("/store/inquiries", post(store::submit_inquiry))
        .route_layer(from_fn_with_state(state.clone(), resolve_site_middleware))
}

fn protected_routes(state: &AppState) -> Router<AppState> {
    use protected::{auth, catalog, directory, inquiries, media, sales};

    Router::new()
        // Session
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/auth/refresh", post(auth::refresh))
        // Catalog
        .route("/api/categories", get(catalog::category_list).post(catalog::category_create))
        .route("/api/categories/tree", get(catalog::category_tree))
        .route(
            "/api/categories/:id",
            get(catalog::category_get)
                .patch(catalog::category_update)
                .delete(catalog::category_delete),
        )
        .route("/api/templates", get(catalog::template_list).post(catalog::template_create))
        .route(
            "/api/templates/:id",
            get(catalog::template_get)
                .patch(catalog::template_update)
                .delete(catalog::template_delete),
        )
        .route("/api/products", get(catalog::product_list).post(catalog::product_create))
        .route(
            "/api/products/:id",
            get(catalog::product_get)
                .patch(catalog::product_update)
                .delete(catalog::product_delete),
        )
        .route("/api/products/:id/categories", put(catalog::product_set_categories))
        .route("/api/products/:id/skus", get(catalog::sku_list).post(catalog::sku_create))
        .route(
            "/api/skus/:id",
            get(catalog::sku_get).patch(catalog::sku_update).delete(catalog::sku_delete),
        )
        // Directory
        .route(
            "/api/departments",
            get(directory::department_list).post(directory::department_create),
        )
        .route(
            "/api/departments/:id",
            get(directory::department_get)
                .patch(directory::department_update)
                .delete(directory::department_delete),
        )
        .route("/api/roles", get(directory::role_list).post(directory::role_create))
        .route("/api/roles/:id", axum::routing::patch(directory::role_update).delete(directory::role_delete))
        .route("/api/users", get(directory::user_list).post(directory::user_create))
        .route("/api/users/:id", get(directory::user_get).patch(directory::user_update))
        .route("/api/users/:id/roles", put(directory::user_set_roles))
        // Sales responsibilities
        .route("/api/sales-responsibilities", get(sales::list).post(sales::create))
        .route(
            "/api/sales-responsibilities/:id",
            axum::routing::patch(sales::update).delete(sales::delete),
        )
        // Inquiries
        .route("/api/inquiries", get(inquiries::list))
        .route("/api/inquiries/:id", get(inquiries::get))
        .route("/api/inquiries/:id/status", axum::routing::patch(inquiries::update_status))
        .route("/api/inquiries/:id/claim", post(inquiries::claim))
        .route("/api/inquiries/:id/assign", post(inquiries::reassign))
        .route("/api/inquiries/:id/quotation", get(inquiries::quotation))
        // Media
        .route("/api/media", get(media::list).post(media::upload))
        .route("/api/media/presign", post(media::presign))
        .route("/api/media/register", post(media::register))
        .route("/api/media/:id", axum::routing::delete(media::delete))
        .merge(elevated_routes())
        // Layers run bottom-up: token first, then user loading
        .route_layer(from_fn_with_state(state.clone(), validate_user_middleware))
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware))
}

fn elevated_routes() -> Router<AppState> {
    use elevated::sites;

    Router::new()
        .route("/api/root/sites", get(sites::list).post(sites::create))
        .route(
            "/api/root/sites/:id",
            get(sites::get).patch(sites::update).delete(sites::deactivate),
        )
        .route_layer(from_fn(require_super_admin_middleware))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if security.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
