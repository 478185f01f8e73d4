//! Site-scoped catalog: categories, attribute templates, products and SKUs.
//!
//! Every query carries `site_id`; an id from another site behaves exactly
//! like a missing one.

mod category;
mod product;
mod sku;
mod template;

use sqlx::PgPool;

pub use category::{build_tree, would_create_cycle, CreateCategory, UpdateCategory};
pub use product::{CreateProduct, ProductFilter, ProductStatus, UpdateProduct, PRODUCT_SORT_COLUMNS};
pub use sku::{CreateSku, UpdateSku};
pub use template::{validate_attributes, CreateTemplate, FieldKind, TemplateField, UpdateTemplate};

pub struct CatalogService {
    pool: PgPool,
}

impl CatalogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
