pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::*;
pub use errors::*;
// 从models只导出常用条目，避免命名冲突
pub use models::{
    Address, AttemptStatus, ChainStatus, ChainTransition, DeliveryRecord, DispatchAttempt,
    DispatchChain, DispatchConfig, EscalationRecord, EscalationStatus, GeoPoint, Lane,
    LaneCarrier, LaneEndpoint, NotificationChannel, OrderContext, ResponseDetails,
    ResponseOutcome,
};
pub use traits::{
    CarrierScoringService, DispatchChainRepository, EscalationGateway, EscalationHandle,
    LaneRepository, NotificationDispatcher,
};

/// 统一的Result类型
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
