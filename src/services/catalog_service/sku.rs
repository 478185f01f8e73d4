use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::CatalogService;
use crate::database::models::Sku;
use crate::services::site_service::conflict_on_unique;
use crate::services::{clean, FieldErrors, ServiceError};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSku {
    pub sku_code: String,
    #[serde(default = "empty_object")]
    pub spec: Value,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub moq: Option<i32>,
    pub stock: Option<i32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSku {
    pub sku_code: Option<String>,
    pub spec: Option<Value>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub moq: Option<i32>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}

fn check_sku_fields(
    sku_code: Option<&str>,
    spec: Option<&Value>,
    price: Option<Decimal>,
    currency: Option<&str>,
    moq: Option<i32>,
    stock: Option<i32>,
) -> Result<(), ServiceError> {
    let mut errors = FieldErrors::new();
    if let Some(code) = sku_code {
        errors.check(
            !code.is_empty() && code.len() <= 64 && !code.chars().any(char::is_whitespace),
            "sku_code",
            "SKU code must be 1-64 characters without spaces",
        );
    }
    if let Some(spec) = spec {
        errors.check(spec.is_object(), "spec", "Spec must be an object");
    }
    if let Some(price) = price {
        errors.check(!price.is_sign_negative(), "price", "Price cannot be negative");
    }
    if let Some(currency) = currency {
        errors.check(
            currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()),
            "currency",
            "Currency must be a 3-letter ISO code",
        );
    }
    if let Some(moq) = moq {
        errors.check(moq >= 1, "moq", "Minimum order quantity must be at least 1");
    }
    if let Some(stock) = stock {
        errors.check(stock >= 0, "stock", "Stock cannot be negative");
    }
    errors.into_result()
}

fn normalize_currency(currency: Option<String>) -> Option<String> {
    clean(currency).map(|c| c.to_ascii_uppercase())
}

impl CatalogService {
    pub async fn list_skus(&self, site_id: Uuid, product_id: Uuid) -> Result<Vec<Sku>, ServiceError> {
        // Confirms the product is in this site
        self.get_product(site_id, product_id).await?;
        let skus = sqlx::query_as::<_, Sku>("SELECT * FROM skus WHERE site_id = $1 AND product_id = $2 ORDER BY sku_code")
            .bind(site_id)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(skus)
    }

    pub async fn get_sku(&self, site_id: Uuid, id: Uuid) -> Result<Sku, ServiceError> {
        sqlx::query_as::<_, Sku>("SELECT * FROM skus WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("SKU '{}' not found", id)))
    }

    pub async fn create_sku(&self, site_id: Uuid, product_id: Uuid, input: CreateSku) -> Result<Sku, ServiceError> {
        let sku_code = input.sku_code.trim().to_string();
        let currency = normalize_currency(input.currency).unwrap_or_else(|| "USD".to_string());
        let moq = input.moq.unwrap_or(1);
        check_sku_fields(Some(&sku_code), Some(&input.spec), input.price, Some(&currency), Some(moq), input.stock)?;

        self.get_product(site_id, product_id).await?;

        let sku = sqlx::query_as::<_, Sku>(
            "INSERT INTO skus (site_id, product_id, sku_code, spec, price, currency, moq, stock, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(site_id)
        .bind(product_id)
        .bind(&sku_code)
        .bind(&input.spec)
        .bind(input.price)
        .bind(&currency)
        .bind(moq)
        .bind(input.stock)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("SKU code '{}' already exists", sku_code)))?;

        info!(site_id = %site_id, product_id = %product_id, sku_id = %sku.id, "Created SKU {}", sku.sku_code);
        Ok(sku)
    }

    pub async fn update_sku(&self, site_id: Uuid, id: Uuid, input: UpdateSku) -> Result<Sku, ServiceError> {
        let sku_code = clean(input.sku_code);
        let currency = normalize_currency(input.currency);
        check_sku_fields(
            sku_code.as_deref(),
            input.spec.as_ref(),
            input.price,
            currency.as_deref(),
            input.moq,
            input.stock,
        )?;

        sqlx::query_as::<_, Sku>(
            "UPDATE skus SET
                sku_code = COALESCE($3, sku_code),
                spec = COALESCE($4, spec),
                price = COALESCE($5, price),
                currency = COALESCE($6, currency),
                moq = COALESCE($7, moq),
                stock = COALESCE($8, stock),
                is_active = COALESCE($9, is_active),
                updated_at = now()
             WHERE site_id = $1 AND id = $2
             RETURNING *",
        )
        .bind(site_id)
        .bind(id)
        .bind(&sku_code)
        .bind(&input.spec)
        .bind(input.price)
        .bind(&currency)
        .bind(input.moq)
        .bind(input.stock)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "SKU code already exists".to_string()))?
        .ok_or_else(|| ServiceError::not_found(format!("SKU '{}' not found", id)))
    }

    pub async fn delete_sku(&self, site_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM skus WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("SKU '{}' not found", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn accepts_valid_sku() {
        let price = Decimal::from_str("9.99").unwrap();
        assert!(check_sku_fields(Some("SP-1"), Some(&json!({})), Some(price), Some("USD"), Some(1), Some(0)).is_ok());
    }

    #[test]
    fn rejects_negative_price_and_zero_moq() {
        let price = Decimal::from_str("-1").unwrap();
        match check_sku_fields(None, None, Some(price), None, Some(0), None) {
            Err(ServiceError::Validation { field_errors, .. }) => {
                assert!(field_errors.contains_key("price"));
                assert!(field_errors.contains_key("moq"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_codes_and_currency() {
        assert!(check_sku_fields(Some("has space"), None, None, None, None, None).is_err());
        assert!(check_sku_fields(None, None, None, Some("usd"), None, None).is_err());
        assert!(check_sku_fields(None, Some(&json!([1])), None, None, None, None).is_err());
    }

    #[test]
    fn currency_is_uppercased() {
        assert_eq!(normalize_currency(Some(" eur ".into())), Some("EUR".to_string()));
        assert_eq!(normalize_currency(Some("".into())), None);
    }
}
