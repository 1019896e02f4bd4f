pub mod postgres_chain_repository;
pub mod postgres_lane_repository;

pub use postgres_chain_repository::PostgresDispatchChainRepository;
pub use postgres_lane_repository::PostgresLaneRepository;
