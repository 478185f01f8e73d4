use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use super::ServiceError;
use crate::auth::{self, Claims};
use crate::database::models::User;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Verified against when no account matches, so unknown emails cost a full bcrypt round
static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| auth::hash_password("no-such-account-placeholder").unwrap_or_default());

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Explicit site; defaults to the site resolved from the request host
    pub site_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: User,
}

/// A user with the union of its role permission codes
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: User,
    pub site_is_active: bool,
    pub permission_codes: Vec<String>,
}

#[derive(FromRow)]
struct PrincipalRow {
    #[sqlx(flatten)]
    user: User,
    site_is_active: bool,
}

pub struct AuthService {
    pool: PgPool,
}

impl AuthService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn login(
        &self,
        site_id: Uuid,
        email: &str,
        password: &str,
        secret: &str,
        expiry_hours: u64,
    ) -> Result<TokenResponse, ServiceError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        // Deactivated sites lock out their staff along with their storefront
        let user = sqlx::query_as::<_, User>(
            "SELECT u.* FROM users u
             JOIN sites s ON s.id = u.site_id
             WHERE u.site_id = $1 AND lower(u.email) = lower($2) AND s.is_active",
        )
        .bind(site_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let hash = user.as_ref().map(|u| u.password_hash.clone());
        let matches = verify_off_thread(password, hash).await?;

        let user = match user {
            Some(user) if user.is_active && matches => user,
            Some(user) if !user.is_active => {
                warn!(site_id = %site_id, user_id = %user.id, "Login rejected for inactive user");
                return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
            }
            Some(user) => {
                warn!(site_id = %site_id, user_id = %user.id, "Login rejected for bad password");
                return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
            }
            None => {
                warn!(site_id = %site_id, "Login rejected for unknown email or inactive site");
                return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
            }
        };

        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        info!(site_id = %site_id, user_id = %user.id, "User logged in");
        Self::issue(user, secret, expiry_hours)
    }

    /// New token for an already authenticated user
    pub fn issue(user: User, secret: &str, expiry_hours: u64) -> Result<TokenResponse, ServiceError> {
        let claims = Claims::new(user.id, user.site_id, user.email.clone(), expiry_hours);
        let token = auth::generate_jwt(&claims, secret)?;
        Ok(TokenResponse {
            token,
            expires_in: claims.expires_in(),
            user,
        })
    }

    /// Load the user behind a token along with its role permissions
    pub async fn load_principal(&self, user_id: Uuid) -> Result<Option<Principal>, ServiceError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "SELECT u.*, s.is_active AS site_is_active
             FROM users u
             JOIN sites s ON s.id = u.site_id
             WHERE u.id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let PrincipalRow { user, site_is_active } = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let codes: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT unnest(r.permissions)
             FROM user_roles ur
             JOIN roles r ON r.id = ur.role_id
             WHERE ur.user_id = $1 AND r.site_id = $2",
        )
        .bind(user.id)
        .bind(user.site_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Principal {
            user,
            site_is_active,
            permission_codes: codes.into_iter().map(|(code,)| code).collect(),
        }))
    }
}

/// bcrypt is deliberately slow; keep it off the async workers. A missing hash
/// is checked against `DUMMY_HASH` and never matches.
async fn verify_off_thread(password: &str, hash: Option<String>) -> Result<bool, ServiceError> {
    let candidate = password.to_string();
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => auth::verify_password(&candidate, &hash),
        None => {
            auth::verify_password(&candidate, &DUMMY_HASH);
            false
        }
    })
    .await
    .map_err(|e| ServiceError::Internal(format!("Password verification task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_hash_is_a_real_bcrypt_hash() {
        assert!(DUMMY_HASH.starts_with("$2"));
        assert!(!auth::verify_password("anything", &DUMMY_HASH));
    }

    #[tokio::test]
    async fn unknown_email_still_runs_verification() {
        assert!(!verify_off_thread("guess", None).await.unwrap());
        assert!(!verify_off_thread("no-such-account-placeholder", None).await.unwrap());

        let hash = auth::hash_password("correct horse").unwrap();
        assert!(verify_off_thread("correct horse", Some(hash)).await.unwrap());
    }
}
