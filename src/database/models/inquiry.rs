use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub site_id: Uuid,
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inquiry row joined with customer and assignee display fields
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Inquiry {
    pub id: Uuid,
    pub site_id: Uuid,
    pub inquiry_no: String,
    pub customer_id: Uuid,
    pub customer_email: String,
    pub customer_name: String,
    pub customer_company: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_country: Option<String>,
    pub product_id: Option<Uuid>,
    pub sku_id: Option<Uuid>,
    pub product_name: String,
    pub sku_code: Option<String>,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub currency: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub assigned_user_id: Option<Uuid>,
    pub assignee_name: Option<String>,
    pub assignee_email: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SalesResponsibility {
    pub id: i64,
    pub site_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_is_active: bool,
    pub master_category_id: Uuid,
    pub category_name: String,
    pub is_auto_assign: bool,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
