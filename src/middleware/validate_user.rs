use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use uuid::Uuid;

use super::auth::AuthClaims;
use crate::auth::{Permission, PermissionSet};
use crate::database::models::User;
use crate::error::ApiError;
use crate::services::auth_service::Principal;
use crate::services::inquiry_service::InquiryScope;
use crate::state::AppState;

/// The authenticated, active user behind a request with its effective permissions
#[derive(Clone, Debug, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub site_id: Uuid,
    pub department_id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub is_super_admin: bool,
    pub permissions: PermissionSet,
}

impl CurrentUser {
    pub fn from_principal(principal: Principal) -> Self {
        let user = principal.user;
        let permissions = if user.is_super_admin {
            PermissionSet::all()
        } else {
            PermissionSet::from_codes(principal.permission_codes.iter().map(String::as_str))
        };
        Self {
            id: user.id,
            site_id: user.site_id,
            department_id: user.department_id,
            email: user.email,
            name: user.name,
            is_super_admin: user.is_super_admin,
            permissions,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.is_super_admin || self.permissions.contains(permission)
    }

    /// 403 unless the user holds `permission`
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.can(permission) {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.id, "Missing permission {}", permission);
            Err(ApiError::forbidden(format!("Missing permission '{}'", permission)))
        }
    }

    /// Only super admins may change another super admin's account
    pub fn require_manageable(&self, target: &User) -> Result<(), ApiError> {
        if target.is_super_admin && !self.is_super_admin {
            tracing::warn!(user_id = %self.id, target_id = %target.id, "Refused change to a super admin account");
            return Err(ApiError::forbidden("Only super admins can modify super admin accounts"));
        }
        Ok(())
    }

    pub fn inquiry_scope(&self) -> InquiryScope {
        InquiryScope::for_user(
            self.id,
            self.department_id,
            self.can(Permission::InquiryReadAll),
            self.can(Permission::InquiryReadDepartment),
        )
    }
}

/// Load the user named by the token; inject `CurrentUser`
pub async fn validate_user_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<AuthClaims>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let principal = state
        .auth()
        .load_principal(claims.user_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id = %claims.user_id, "Token refers to a missing user");
            ApiError::unauthorized("User no longer exists")
        })?;

    check_principal(&principal, &claims)?;

    request.extensions_mut().insert(CurrentUser::from_principal(principal));
    Ok(next.run(request).await)
}

/// Token and account must still agree with the database
fn check_principal(principal: &Principal, claims: &AuthClaims) -> Result<(), ApiError> {
    if principal.user.site_id != claims.site_id {
        tracing::warn!(user_id = %claims.user_id, site_id = %claims.site_id, "Token site does not match user site");
        return Err(ApiError::unauthorized("Invalid or expired token"));
    }
    if !principal.site_is_active {
        tracing::warn!(user_id = %claims.user_id, site_id = %claims.site_id, "Request from a deactivated site");
        return Err(ApiError::forbidden("Site is deactivated"));
    }
    if !principal.user.is_active {
        return Err(ApiError::forbidden("User account is disabled"));
    }
    Ok(())
}

/// Gate for `/api/root/*`
pub async fn require_super_admin_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    if !user.is_super_admin {
        tracing::warn!(user_id = %user.id, "Super admin route refused");
        return Err(ApiError::forbidden("Super admin access required"));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(is_super_admin: bool) -> User {
        User {
            id: Uuid::new_v4(),
            site_id: Uuid::new_v4(),
            department_id: None,
            email: "sales@example.com".into(),
            name: "Sales".into(),
            phone: None,
            password_hash: String::new(),
            is_active: true,
            is_super_admin,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn role_codes_become_permissions() {
        let current = CurrentUser::from_principal(Principal {
            user: user(false),
            site_is_active: true,
            permission_codes: vec!["inquiry:read".into(), "legacy:thing".into()],
        });
        assert!(current.can(Permission::InquiryRead));
        assert!(!current.can(Permission::CatalogWrite));
        assert!(current.require(Permission::CatalogWrite).is_err());
        assert_eq!(current.inquiry_scope(), InquiryScope::Own { user_id: current.id });
    }

    #[test]
    fn super_admin_holds_everything() {
        let current = CurrentUser::from_principal(Principal {
            user: user(true),
            site_is_active: true,
            permission_codes: vec![],
        });
        for permission in Permission::ALL {
            assert!(current.require(permission).is_ok());
        }
        assert_eq!(current.inquiry_scope(), InquiryScope::Site);
    }

    fn claims_for(user: &User) -> AuthClaims {
        AuthClaims {
            user_id: user.id,
            site_id: user.site_id,
            email: user.email.clone(),
            exp: Utc::now().timestamp() + 3600,
        }
    }

    #[test]
    fn deactivated_site_is_forbidden() {
        let principal = Principal {
            user: user(false),
            site_is_active: false,
            permission_codes: vec![],
        };
        let err = check_principal(&principal, &claims_for(&principal.user)).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "Site is deactivated");
    }

    #[test]
    fn site_mismatch_is_unauthorized() {
        let principal = Principal {
            user: user(false),
            site_is_active: true,
            permission_codes: vec![],
        };
        let mut claims = claims_for(&principal.user);
        claims.site_id = Uuid::new_v4();
        let err = check_principal(&principal, &claims).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn active_user_on_active_site_passes() {
        let principal = Principal {
            user: user(false),
            site_is_active: true,
            permission_codes: vec![],
        };
        assert!(check_principal(&principal, &claims_for(&principal.user)).is_ok());
    }

    #[test]
    fn only_super_admins_manage_super_admins() {
        let manager = CurrentUser::from_principal(Principal {
            user: user(false),
            site_is_active: true,
            permission_codes: vec!["user:manage".into()],
        });
        let root = CurrentUser::from_principal(Principal {
            user: user(true),
            site_is_active: true,
            permission_codes: vec![],
        });

        let err = manager.require_manageable(&user(true)).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
        assert!(manager.require_manageable(&user(false)).is_ok());
        assert!(root.require_manageable(&user(true)).is_ok());
    }
}
