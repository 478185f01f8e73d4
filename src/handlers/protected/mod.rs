// Protected handlers (/api/*): bearer token, active user, per-route permission checks
pub mod auth;
pub mod catalog;
pub mod directory;
pub mod inquiries;
pub mod media;
pub mod sales;
