pub mod auth;
pub mod response;
pub mod site;
pub mod validate_user;

pub use auth::{jwt_auth_middleware, AuthClaims};
pub use response::{ApiResponse, ApiResult, FileDownload};
pub use site::{resolve_site_middleware, CurrentSite};
pub use validate_user::{require_super_admin_middleware, validate_user_middleware, CurrentUser};
