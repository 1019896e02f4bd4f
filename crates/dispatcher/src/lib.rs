//! 派单编排层
//!
//! 驱动运单在排名承运商列表上的顺序报价：发出报价、在限定窗口内等待
//! 响应、拒绝/超时后推进、接受后指派、列表用尽后升级到外部市场。

pub mod engine;
pub mod lane_registry;
pub mod sweeper;

pub use engine::{ChainEngine, DispatchOutcome, SweepStats};
pub use lane_registry::{LaneRegistry, ResolvedLane};
pub use sweeper::TimeoutSweeper;
