pub mod dispatch_chain;
pub mod lane;
pub mod order;

pub use dispatch_chain::*;
pub use lane::*;
pub use order::*;
