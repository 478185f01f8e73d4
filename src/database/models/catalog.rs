use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub site_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Category with its children, for tree responses
#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductTemplate {
    pub id: Uuid,
    pub site_id: Uuid,
    pub name: String,
    pub fields: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub site_id: Uuid,
    pub template_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub spu_code: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub main_image_url: Option<String>,
    pub gallery: Vec<String>,
    pub attributes: Value,
    pub status: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Sku {
    pub id: Uuid,
    pub site_id: Uuid,
    pub product_id: Uuid,
    pub sku_code: String,
    pub spec: Value,
    pub price: Option<Decimal>,
    pub currency: String,
    pub moq: i32,
    pub stock: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product with its category links and SKUs
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub categories: Vec<Category>,
    pub skus: Vec<Sku>,
}
