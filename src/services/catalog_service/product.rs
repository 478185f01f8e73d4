use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use super::CatalogService;
use crate::config::ListingConfig;
use crate::database::listing::like_pattern;
use crate::database::models::{Category, Product, ProductDetail, Sku};
use crate::database::{ListParams, Paginated, SortOrder};
use crate::services::site_service::conflict_on_unique;
use crate::services::{clean, double_option, is_valid_slug, ServiceError};

pub const PRODUCT_SORT_COLUMNS: &[&str] = &["created_at", "updated_at", "name", "sort_order"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductStatus {
    Draft,
    Published,
    Archived,
}

impl ProductStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(ProductStatus::Draft),
            "published" => Some(ProductStatus::Published),
            "archived" => Some(ProductStatus::Archived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Published => "published",
            ProductStatus::Archived => "archived",
        }
    }
}

fn parse_status(value: &str) -> Result<ProductStatus, ServiceError> {
    ProductStatus::parse(value).ok_or_else(|| ServiceError::field("status", "Status must be draft, published or archived"))
}

/// Query string of product listings. Kept flat: url-encoded values cannot
/// pass through `#[serde(flatten)]` into numeric fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<String>,
    pub q: Option<String>,
    pub category_id: Option<Uuid>,
    pub status: Option<String>,
}

impl ProductFilter {
    pub fn params(&self) -> ListParams {
        ListParams {
            page: self.page,
            page_size: self.page_size,
            sort: self.sort.clone(),
            q: self.q.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub slug: String,
    pub template_id: Option<Uuid>,
    pub spu_code: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub main_image_url: Option<String>,
    #[serde(default)]
    pub gallery: Vec<String>,
    #[serde(default = "empty_object")]
    pub attributes: Value,
    pub status: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub template_id: Option<Option<Uuid>>,
    pub spu_code: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub main_image_url: Option<String>,
    pub gallery: Option<Vec<String>>,
    pub attributes: Option<Value>,
    pub status: Option<String>,
    pub sort_order: Option<i32>,
    pub category_ids: Option<Vec<Uuid>>,
}

/// Append the shared WHERE clause for product listings
fn push_product_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    site_id: Uuid,
    filter: &ProductFilter,
    status: Option<ProductStatus>,
) {
    qb.push(" WHERE p.site_id = ").push_bind(site_id);

    if let Some(status) = status {
        qb.push(" AND p.status = ").push_bind(status.as_str());
    }

    let params = filter.params();
    if let Some(term) = params.search() {
        let pattern = like_pattern(term);
        qb.push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.spu_code ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(category_id) = filter.category_id {
        qb.push(
            " AND EXISTS (SELECT 1 FROM product_categories pc WHERE pc.product_id = p.id AND pc.category_id IN (
                WITH RECURSIVE sub AS (
                    SELECT id FROM categories WHERE id = ",
        )
        .push_bind(category_id)
        .push(" AND site_id = ")
        .push_bind(site_id)
        .push(
            " UNION ALL
                    SELECT c.id FROM categories c JOIN sub ON c.parent_id = sub.id
                ) SELECT id FROM sub))",
        );
    }
}

impl CatalogService {
    /// Paged product listing. `published_only` pins the status filter for storefront reads.
    pub async fn list_products(
        &self,
        site_id: Uuid,
        filter: &ProductFilter,
        listing: &ListingConfig,
        published_only: bool,
    ) -> Result<Paginated<Product>, ServiceError> {
        let params = filter.params();
        let page = params.page(listing);
        let orders = SortOrder::parse(params.sort.as_deref(), PRODUCT_SORT_COLUMNS, SortOrder::desc("created_at"))?;

        let status = if published_only {
            Some(ProductStatus::Published)
        } else {
            filter.status.as_deref().map(parse_status).transpose()?
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        push_product_filters(&mut count, site_id, filter, status);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT p.* FROM products p");
        push_product_filters(&mut query, site_id, filter, status);
        query.push(SortOrder::to_sql(&orders, Some("p")));
        query.push(" LIMIT ").push_bind(page.limit());
        query.push(" OFFSET ").push_bind(page.offset());
        let items = query.build_query_as::<Product>().fetch_all(&self.pool).await?;

        Ok(Paginated::new(items, total, page))
    }

    pub async fn get_product(&self, site_id: Uuid, id: Uuid) -> Result<ProductDetail, ServiceError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Product '{}' not found", id)))?;
        self.product_detail(product, false).await
    }

    /// Storefront lookup: published products with active SKUs and categories only
    pub async fn get_published_by_slug(&self, site_id: Uuid, slug: &str) -> Result<ProductDetail, ServiceError> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE site_id = $1 AND slug = $2 AND status = 'published'",
        )
        .bind(site_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Product '{}' not found", slug)))?;
        self.product_detail(product, true).await
    }

    async fn product_detail(&self, product: Product, active_only: bool) -> Result<ProductDetail, ServiceError> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT c.* FROM categories c
             JOIN product_categories pc ON pc.category_id = c.id
             WHERE pc.product_id = $1 AND (c.is_active OR NOT $2)
             ORDER BY c.sort_order, c.name",
        )
        .bind(product.id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        let skus = sqlx::query_as::<_, Sku>(
            "SELECT * FROM skus WHERE product_id = $1 AND (is_active OR NOT $2) ORDER BY sku_code",
        )
        .bind(product.id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(ProductDetail {
            product,
            categories,
            skus,
        })
    }

    pub async fn create_product(&self, site_id: Uuid, input: CreateProduct) -> Result<ProductDetail, ServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::field("name", "Name is required"));
        }
        let slug = input.slug.trim().to_string();
        if !is_valid_slug(&slug) {
            return Err(ServiceError::field("slug", "Slug must be lowercase letters, digits and dashes"));
        }
        let status = input.status.as_deref().map(parse_status).transpose()?.unwrap_or(ProductStatus::Draft);
        self.check_attributes(site_id, input.template_id, &input.attributes).await?;
        let category_ids = self.check_category_ids(site_id, &input.category_ids).await?;

        let mut tx = self.pool.begin().await?;

        let product = sqlx::query_as::<_, Product>(
            "INSERT INTO products
                (site_id, template_id, name, slug, spu_code, summary, description, main_image_url, gallery, attributes, status, sort_order)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING *",
        )
        .bind(site_id)
        .bind(input.template_id)
        .bind(&name)
        .bind(&slug)
        .bind(clean(input.spu_code))
        .bind(clean(input.summary))
        .bind(clean(input.description))
        .bind(clean(input.main_image_url))
        .bind(&input.gallery)
        .bind(&input.attributes)
        .bind(status.as_str())
        .bind(input.sort_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, format!("Product slug '{}' already exists", slug)))?;

        link_categories(&mut tx, product.id, &category_ids).await?;
        tx.commit().await?;

        info!(site_id = %site_id, product_id = %product.id, "Created product '{}'", product.slug);
        self.product_detail(product, false).await
    }

    pub async fn update_product(&self, site_id: Uuid, id: Uuid, input: UpdateProduct) -> Result<ProductDetail, ServiceError> {
        let existing = self.get_product(site_id, id).await?.product;

        let slug = clean(input.slug);
        if let Some(slug) = &slug {
            if !is_valid_slug(slug) {
                return Err(ServiceError::field("slug", "Slug must be lowercase letters, digits and dashes"));
            }
        }
        let status = input.status.as_deref().map(parse_status).transpose()?;

        // Validate the row as it will look after the update
        let template_id = match input.template_id {
            Some(template_id) => template_id,
            None => existing.template_id,
        };
        let attributes = input.attributes.as_ref().unwrap_or(&existing.attributes);
        self.check_attributes(site_id, template_id, attributes).await?;

        let category_ids = match &input.category_ids {
            Some(ids) => Some(self.check_category_ids(site_id, ids).await?),
            None => None,
        };

        let mut tx = self.pool.begin().await?;

        let product = sqlx::query_as::<_, Product>(
            "UPDATE products SET
                name = COALESCE($3, name),
                slug = COALESCE($4, slug),
                template_id = $5,
                spu_code = COALESCE($6, spu_code),
                summary = COALESCE($7, summary),
                description = COALESCE($8, description),
                main_image_url = COALESCE($9, main_image_url),
                gallery = COALESCE($10, gallery),
                attributes = COALESCE($11, attributes),
                status = COALESCE($12, status),
                sort_order = COALESCE($13, sort_order),
                updated_at = now()
             WHERE site_id = $1 AND id = $2
             RETURNING *",
        )
        .bind(site_id)
        .bind(id)
        .bind(clean(input.name))
        .bind(&slug)
        .bind(template_id)
        .bind(clean(input.spu_code))
        .bind(clean(input.summary))
        .bind(clean(input.description))
        .bind(clean(input.main_image_url))
        .bind(&input.gallery)
        .bind(&input.attributes)
        .bind(status.map(|s| s.as_str()))
        .bind(input.sort_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Product slug already exists".to_string()))?;

        if let Some(category_ids) = category_ids {
            sqlx::query("DELETE FROM product_categories WHERE product_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            link_categories(&mut tx, id, &category_ids).await?;
        }
        tx.commit().await?;

        self.product_detail(product, false).await
    }

    /// Replace the product's category links
    pub async fn set_product_categories(
        &self,
        site_id: Uuid,
        id: Uuid,
        category_ids: Vec<Uuid>,
    ) -> Result<ProductDetail, ServiceError> {
        self.update_product(
            site_id,
            id,
            UpdateProduct {
                category_ids: Some(category_ids),
                ..Default::default()
            },
        )
        .await
    }

    /// Delete a product; SKUs and category links cascade
    pub async fn delete_product(&self, site_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM products WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("Product '{}' not found", id)));
        }
        info!(site_id = %site_id, product_id = %id, "Deleted product");
        Ok(())
    }

    /// Deduplicate and verify every id is a category of this site
    async fn check_category_ids(&self, site_id: Uuid, ids: &[Uuid]) -> Result<Vec<Uuid>, ServiceError> {
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if ids.is_empty() {
            return Ok(ids);
        }

        let (found,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories WHERE site_id = $1 AND id = ANY($2)")
            .bind(site_id)
            .bind(&ids)
            .fetch_one(&self.pool)
            .await?;
        if found as usize != ids.len() {
            return Err(ServiceError::field("category_ids", "One or more categories do not exist"));
        }
        Ok(ids)
    }
}

async fn link_categories(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    product_id: Uuid,
    category_ids: &[Uuid],
) -> Result<(), ServiceError> {
    if category_ids.is_empty() {
        return Ok(());
    }
    sqlx::query("INSERT INTO product_categories (product_id, category_id) SELECT $1, unnest($2::uuid[])")
        .bind(product_id)
        .bind(category_ids)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_statuses() {
        assert_eq!(ProductStatus::parse("Published"), Some(ProductStatus::Published));
        assert_eq!(ProductStatus::parse("deleted"), None);
        assert!(parse_status("live").is_err());
    }

    #[test]
    fn filter_exposes_list_params() {
        let filter = ProductFilter {
            page: Some(2),
            q: Some(" pipe ".into()),
            status: Some("draft".into()),
            ..Default::default()
        };
        assert_eq!(filter.params().page, Some(2));
        assert_eq!(filter.params().search(), Some("pipe"));
        assert_eq!(filter.status.as_deref(), Some("draft"));
    }

    #[test]
    fn listing_sql_filters_by_category_subtree() {
        let filter = ProductFilter {
            category_id: Some(Uuid::nil()),
            q: Some("steel".into()),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT p.* FROM products p");
        push_product_filters(&mut qb, Uuid::nil(), &filter, Some(ProductStatus::Published));
        let sql = qb.sql();
        assert!(sql.contains("p.site_id = $1"));
        assert!(sql.contains("p.status = $2"));
        assert!(sql.contains("p.name ILIKE $3 OR p.spu_code ILIKE $4"));
        assert!(sql.contains("WITH RECURSIVE sub"));
        assert!(sql.contains("site_id = $6"));
    }

    #[test]
    fn update_template_can_be_cleared() {
        let patch: UpdateProduct = serde_json::from_str(r#"{"template_id": null}"#).unwrap();
        assert_eq!(patch.template_id, Some(None));
        let patch: UpdateProduct = serde_json::from_str("{}").unwrap();
        assert_eq!(patch.template_id, None);
    }
}
