// Public handlers: token acquisition, storefront reads and inquiry intake.
// Storefront routes run behind site resolution; nothing here requires a JWT.
pub mod auth;
pub mod media;
pub mod store;
pub mod system;
