pub mod health;
pub mod migrate;
pub mod seed;
pub mod site;
pub mod user;
