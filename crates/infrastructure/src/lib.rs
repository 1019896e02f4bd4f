pub mod database;
pub mod gateways;
pub mod observability;

pub use database::*;
pub use gateways::*;
pub use observability::*;
