pub mod catalog;
pub mod inquiry;
pub mod media;
pub mod site;
pub mod user;

pub use catalog::{Category, CategoryNode, Product, ProductDetail, ProductTemplate, Sku};
pub use inquiry::{Customer, Inquiry, SalesResponsibility};
pub use media::MediaAsset;
pub use site::Site;
pub use user::{Department, Role, User};
