use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::site_service::conflict_on_unique;
use super::ServiceError;
use crate::database::models::SalesResponsibility;

const SELECT_RESPONSIBILITY: &str = "
    SELECT sr.id, sr.site_id, sr.user_id, u.name AS user_name, u.is_active AS user_is_active,
           sr.master_category_id, c.name AS category_name, sr.is_auto_assign, sr.last_assigned_at, sr.created_at
    FROM sales_responsibilities sr
    JOIN users u ON u.id = sr.user_id
    JOIN categories c ON c.id = sr.master_category_id";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsibilityFilter {
    pub category_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateResponsibility {
    pub user_id: Uuid,
    pub master_category_id: Uuid,
    #[serde(default = "default_true")]
    pub is_auto_assign: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateResponsibility {
    pub is_auto_assign: bool,
}

pub struct SalesService {
    pool: PgPool,
}

impl SalesService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, site_id: Uuid, filter: &ResponsibilityFilter) -> Result<Vec<SalesResponsibility>, ServiceError> {
        let sql = format!(
            "{} WHERE sr.site_id = $1
                AND ($2::uuid IS NULL OR sr.master_category_id = $2)
                AND ($3::uuid IS NULL OR sr.user_id = $3)
             ORDER BY c.name, sr.last_assigned_at NULLS FIRST, sr.id",
            SELECT_RESPONSIBILITY
        );
        let rows = sqlx::query_as::<_, SalesResponsibility>(&sql)
            .bind(site_id)
            .bind(filter.category_id)
            .bind(filter.user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, site_id: Uuid, id: i64) -> Result<SalesResponsibility, ServiceError> {
        let sql = format!("{} WHERE sr.site_id = $1 AND sr.id = $2", SELECT_RESPONSIBILITY);
        sqlx::query_as::<_, SalesResponsibility>(&sql)
            .bind(site_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Sales responsibility {} not found", id)))
    }

    pub async fn create(&self, site_id: Uuid, input: CreateResponsibility) -> Result<SalesResponsibility, ServiceError> {
        let user: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(input.user_id)
            .fetch_optional(&self.pool)
            .await?;
        if user.is_none() {
            return Err(ServiceError::field("user_id", "User not found"));
        }

        let category: Option<(Option<Uuid>,)> = sqlx::query_as("SELECT parent_id FROM categories WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(input.master_category_id)
            .fetch_optional(&self.pool)
            .await?;
        match category {
            None => return Err(ServiceError::field("master_category_id", "Category not found")),
            Some((Some(_),)) => {
                return Err(ServiceError::Unprocessable(
                    "Sales responsibilities can only be attached to root categories".to_string(),
                ))
            }
            Some((None,)) => {}
        }

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO sales_responsibilities (site_id, user_id, master_category_id, is_auto_assign)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(site_id)
        .bind(input.user_id)
        .bind(input.master_category_id)
        .bind(input.is_auto_assign)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "User is already responsible for this category".to_string()))?;

        info!(site_id = %site_id, user_id = %input.user_id, category_id = %input.master_category_id, "Added sales responsibility {}", id);
        self.get(site_id, id).await
    }

    pub async fn update(&self, site_id: Uuid, id: i64, input: UpdateResponsibility) -> Result<SalesResponsibility, ServiceError> {
        let result = sqlx::query("UPDATE sales_responsibilities SET is_auto_assign = $3 WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .bind(input.is_auto_assign)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("Sales responsibility {} not found", id)));
        }
        self.get(site_id, id).await
    }

    pub async fn delete(&self, site_id: Uuid, id: i64) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM sales_responsibilities WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("Sales responsibility {} not found", id)));
        }
        Ok(())
    }
}
