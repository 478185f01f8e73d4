use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use super::site_service::conflict_on_unique;
use super::{clean, double_option, is_valid_email, ServiceError};
use crate::auth::{self, permission};
use crate::config::ListingConfig;
use crate::database::listing::like_pattern;
use crate::database::models::{Department, Role, User};
use crate::database::{ListParams, Paginated, SortOrder};

pub const USER_SORT_COLUMNS: &[&str] = &["created_at", "name", "email", "last_login_at"];
const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDepartment {
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDepartment {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub manager_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRole {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub phone: Option<String>,
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub role_ids: Vec<Uuid>,
    #[serde(default)]
    pub is_super_admin: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub department_id: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

/// Query string of user listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<String>,
    pub q: Option<String>,
    pub department_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

/// User with its role assignments
#[derive(Debug, Clone, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<Role>,
}

fn check_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ServiceError::field(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_CHARS),
        ));
    }
    Ok(())
}

fn check_permission_codes(codes: &[String]) -> Result<Vec<String>, ServiceError> {
    let unknown = permission::unknown_codes(codes);
    if !unknown.is_empty() {
        return Err(ServiceError::field("permissions", format!("Unknown permissions: {}", unknown.join(", "))));
    }
    let mut codes: Vec<String> = codes.iter().map(|c| c.trim().to_string()).collect();
    codes.sort();
    codes.dedup();
    Ok(codes)
}

async fn hash(password: &str) -> Result<String, ServiceError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(format!("Password hashing task failed: {}", e)))?
        .map_err(ServiceError::from)
}

pub struct DirectoryService {
    pool: PgPool,
}

impl DirectoryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Departments

    pub async fn list_departments(&self, site_id: Uuid) -> Result<Vec<Department>, ServiceError> {
        let departments = sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE site_id = $1 ORDER BY name, id")
            .bind(site_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(departments)
    }

    pub async fn get_department(&self, site_id: Uuid, id: Uuid) -> Result<Department, ServiceError> {
        sqlx::query_as::<_, Department>("SELECT * FROM departments WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Department '{}' not found", id)))
    }

    pub async fn create_department(&self, site_id: Uuid, input: CreateDepartment) -> Result<Department, ServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::field("name", "Name is required"));
        }
        if let Some(parent_id) = input.parent_id {
            self.get_department(site_id, parent_id)
                .await
                .map_err(|_| ServiceError::field("parent_id", "Parent department not found"))?;
        }
        if let Some(manager_id) = input.manager_id {
            self.get_user(site_id, manager_id)
                .await
                .map_err(|_| ServiceError::field("manager_id", "Manager not found"))?;
        }

        let department = sqlx::query_as::<_, Department>(
            "INSERT INTO departments (site_id, name, parent_id, manager_id) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(site_id)
        .bind(&name)
        .bind(input.parent_id)
        .bind(input.manager_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("Department '{}' already exists", name)))?;

        info!(site_id = %site_id, department_id = %department.id, "Created department '{}'", department.name);
        Ok(department)
    }

    pub async fn update_department(&self, site_id: Uuid, id: Uuid, input: UpdateDepartment) -> Result<Department, ServiceError> {
        let existing = self.get_department(site_id, id).await?;

        let parent_id = match input.parent_id {
            Some(Some(parent_id)) => {
                if parent_id == id {
                    return Err(ServiceError::Unprocessable("A department cannot be its own parent".to_string()));
                }
                self.get_department(site_id, parent_id)
                    .await
                    .map_err(|_| ServiceError::field("parent_id", "Parent department not found"))?;
                Some(parent_id)
            }
            Some(None) => None,
            None => existing.parent_id,
        };
        let manager_id = match input.manager_id {
            Some(Some(manager_id)) => {
                self.get_user(site_id, manager_id)
                    .await
                    .map_err(|_| ServiceError::field("manager_id", "Manager not found"))?;
                Some(manager_id)
            }
            Some(None) => None,
            None => existing.manager_id,
        };

        let department = sqlx::query_as::<_, Department>(
            "UPDATE departments SET
                name = COALESCE($3, name),
                parent_id = $4,
                manager_id = $5,
                updated_at = now()
             WHERE site_id = $1 AND id = $2
             RETURNING *",
        )
        .bind(site_id)
        .bind(id)
        .bind(clean(input.name))
        .bind(parent_id)
        .bind(manager_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Department name already exists".to_string()))?;
        Ok(department)
    }

    pub async fn delete_department(&self, site_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        self.get_department(site_id, id).await?;
        let (members,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE department_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if members > 0 {
            return Err(ServiceError::conflict(format!("Department still has {} users", members)));
        }

        sqlx::query("DELETE FROM departments WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        info!(site_id = %site_id, department_id = %id, "Deleted department");
        Ok(())
    }

    // Roles

    pub async fn list_roles(&self, site_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE site_id = $1 ORDER BY name, id")
            .bind(site_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    pub async fn create_role(&self, site_id: Uuid, input: CreateRole) -> Result<Role, ServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::field("name", "Name is required"));
        }
        let permissions = check_permission_codes(&input.permissions)?;

        let role = sqlx::query_as::<_, Role>(
            "INSERT INTO roles (site_id, name, description, permissions) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(site_id)
        .bind(&name)
        .bind(clean(input.description))
        .bind(&permissions)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("Role '{}' already exists", name)))?;

        info!(site_id = %site_id, role_id = %role.id, "Created role '{}'", role.name);
        Ok(role)
    }

    pub async fn update_role(&self, site_id: Uuid, id: Uuid, input: UpdateRole) -> Result<Role, ServiceError> {
        let permissions = input.permissions.as_deref().map(check_permission_codes).transpose()?;

        sqlx::query_as::<_, Role>(
            "UPDATE roles SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                permissions = COALESCE($5, permissions),
                updated_at = now()
             WHERE site_id = $1 AND id = $2
             RETURNING *",
        )
        .bind(site_id)
        .bind(id)
        .bind(clean(input.name))
        .bind(clean(input.description))
        .bind(&permissions)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Role name already exists".to_string()))?
        .ok_or_else(|| ServiceError::not_found(format!("Role '{}' not found", id)))
    }

    pub async fn delete_role(&self, site_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM roles WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("Role '{}' not found", id)));
        }
        Ok(())
    }

    // Users

    pub async fn list_users(
        &self,
        site_id: Uuid,
        filter: &UserFilter,
        listing: &ListingConfig,
    ) -> Result<Paginated<User>, ServiceError> {
        let params = ListParams {
            page: filter.page,
            page_size: filter.page_size,
            sort: filter.sort.clone(),
            q: filter.q.clone(),
        };
        let page = params.page(listing);
        let orders = SortOrder::parse(params.sort.as_deref(), USER_SORT_COLUMNS, SortOrder::asc("name"))?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users u");
        push_user_filters(&mut count, site_id, &params, filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT u.* FROM users u");
        push_user_filters(&mut query, site_id, &params, filter);
        query.push(SortOrder::to_sql(&orders, Some("u")));
        query.push(" LIMIT ").push_bind(page.limit());
        query.push(" OFFSET ").push_bind(page.offset());
        let items = query.build_query_as::<User>().fetch_all(&self.pool).await?;

        Ok(Paginated::new(items, total, page))
    }

    pub async fn get_user(&self, site_id: Uuid, id: Uuid) -> Result<User, ServiceError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("User '{}' not found", id)))
    }

    pub async fn get_user_detail(&self, site_id: Uuid, id: Uuid) -> Result<UserDetail, ServiceError> {
        let user = self.get_user(site_id, id).await?;
        let roles = sqlx::query_as::<_, Role>(
            "SELECT r.* FROM roles r JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = $1 ORDER BY r.name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(UserDetail { user, roles })
    }

    pub async fn create_user(&self, site_id: Uuid, input: CreateUser) -> Result<UserDetail, ServiceError> {
        let email = input.email.trim().to_ascii_lowercase();
        if !is_valid_email(&email) {
            return Err(ServiceError::field("email", "Invalid email format"));
        }
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::field("name", "Name is required"));
        }
        check_password(&input.password)?;
        if let Some(department_id) = input.department_id {
            self.get_department(site_id, department_id)
                .await
                .map_err(|_| ServiceError::field("department_id", "Department not found"))?;
        }
        let password_hash = hash(&input.password).await?;

        let mut tx = self.pool.begin().await?;
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (site_id, department_id, email, name, phone, password_hash, is_super_admin)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(site_id)
        .bind(input.department_id)
        .bind(&email)
        .bind(&name)
        .bind(clean(input.phone))
        .bind(&password_hash)
        .bind(input.is_super_admin)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, format!("A user with email '{}' already exists", email)))?;

        replace_roles(&mut tx, site_id, user.id, &input.role_ids).await?;
        tx.commit().await?;

        info!(site_id = %site_id, user_id = %user.id, "Created user {}", user.email);
        self.get_user_detail(site_id, user.id).await
    }

    pub async fn update_user(&self, site_id: Uuid, id: Uuid, input: UpdateUser) -> Result<User, ServiceError> {
        let existing = self.get_user(site_id, id).await?;

        let department_id = match input.department_id {
            Some(Some(department_id)) => {
                self.get_department(site_id, department_id)
                    .await
                    .map_err(|_| ServiceError::field("department_id", "Department not found"))?;
                Some(department_id)
            }
            Some(None) => None,
            None => existing.department_id,
        };

        let password_hash = match &input.password {
            Some(password) => {
                check_password(password)?;
                Some(hash(password).await?)
            }
            None => None,
        };

        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET
                name = COALESCE($3, name),
                phone = COALESCE($4, phone),
                department_id = $5,
                is_active = COALESCE($6, is_active),
                password_hash = COALESCE($7, password_hash),
                updated_at = now()
             WHERE site_id = $1 AND id = $2
             RETURNING *",
        )
        .bind(site_id)
        .bind(id)
        .bind(clean(input.name))
        .bind(clean(input.phone))
        .bind(department_id)
        .bind(input.is_active)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await?;

        if input.is_active == Some(false) {
            info!(site_id = %site_id, user_id = %id, "Deactivated user");
        }
        Ok(user)
    }

    pub async fn set_user_roles(&self, site_id: Uuid, id: Uuid, role_ids: Vec<Uuid>) -> Result<UserDetail, ServiceError> {
        self.get_user(site_id, id).await?;
        let mut tx = self.pool.begin().await?;
        replace_roles(&mut tx, site_id, id, &role_ids).await?;
        tx.commit().await?;
        self.get_user_detail(site_id, id).await
    }
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, site_id: Uuid, params: &ListParams, filter: &UserFilter) {
    qb.push(" WHERE u.site_id = ").push_bind(site_id);
    if let Some(term) = params.search() {
        let pattern = like_pattern(term);
        qb.push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(department_id) = filter.department_id {
        qb.push(" AND u.department_id = ").push_bind(department_id);
    }
    if let Some(is_active) = filter.is_active {
        qb.push(" AND u.is_active = ").push_bind(is_active);
    }
}

async fn replace_roles(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    site_id: Uuid,
    user_id: Uuid,
    role_ids: &[Uuid],
) -> Result<(), ServiceError> {
    let mut role_ids = role_ids.to_vec();
    role_ids.sort();
    role_ids.dedup();

    if !role_ids.is_empty() {
        let (found,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM roles WHERE site_id = $1 AND id = ANY($2)")
            .bind(site_id)
            .bind(&role_ids)
            .fetch_one(&mut **tx)
            .await?;
        if found as usize != role_ids.len() {
            return Err(ServiceError::field("role_ids", "One or more roles do not exist"));
        }
    }

    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    if !role_ids.is_empty() {
        sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT $1, unnest($2::uuid[])")
            .bind(user_id)
            .bind(&role_ids)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_codes_are_validated_and_sorted() {
        let codes = vec!["inquiry:write".to_string(), "catalog:read".to_string(), "catalog:read".to_string()];
        assert_eq!(check_permission_codes(&codes).unwrap(), vec!["catalog:read", "inquiry:write"]);

        let bad = vec!["catalog:read".to_string(), "admin:*".to_string()];
        match check_permission_codes(&bad) {
            Err(ServiceError::Validation { field_errors, .. }) => {
                assert!(field_errors["permissions"].contains("admin:*"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(check_password("short").is_err());
        assert!(check_password("long enough").is_ok());
    }

    #[test]
    fn user_patch_can_clear_department() {
        let patch: UpdateUser = serde_json::from_str(r#"{"department_id": null, "is_active": false}"#).unwrap();
        assert_eq!(patch.department_id, Some(None));
        assert_eq!(patch.is_active, Some(false));
    }
}
