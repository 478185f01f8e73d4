pub mod listing;
pub mod manager;
pub mod models;

pub use listing::{ListParams, ListingError, Page, Paginated, SortOrder};
pub use manager::{DatabaseError, DatabaseManager};
