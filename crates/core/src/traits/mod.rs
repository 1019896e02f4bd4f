pub mod repository;
pub mod services;

pub use repository::*;
pub use services::*;
