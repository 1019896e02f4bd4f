//! # Symphonia Testing Utils
//!
//! Shared testing utilities for the carrier dispatch workspace:
//!
//! - **Mock collaborators**: in-memory implementations of the repository and
//!   external-service traits, with failure injection
//! - **Test data builders**: lanes, carriers, chains and order contexts with
//!   sensible defaults
//! - **Database test container**: PostgreSQL container with the dispatch schema
//! - **Helpers**: polling/waiting utilities for async assertions

pub mod builders;
pub mod containers;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use containers::*;
pub use helpers::*;
pub use mocks::*;
