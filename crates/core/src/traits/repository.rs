//! 仓储抽象
//!
//! 派单链文档是唯一事实来源，所有引擎操作都表达为
//! 读取-修改-条件写入；条件不满足时该操作整体作废。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ChainStatus, DispatchChain, Lane};
use crate::DispatchResult;

/// 派单链仓储抽象
#[async_trait]
pub trait DispatchChainRepository: Send + Sync {
    async fn create(&self, chain: &DispatchChain) -> DispatchResult<DispatchChain>;

    async fn get_by_id(&self, id: i64) -> DispatchResult<Option<DispatchChain>>;

    async fn get_by_order_id(&self, order_id: &str) -> DispatchResult<Option<DispatchChain>>;

    /// 查找当前轮次已过响应截止时间的InProgress链，按截止时间升序
    async fn find_expired_in_progress(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> DispatchResult<Vec<DispatchChain>>;

    /// 以比较-交换方式提交链的新状态
    ///
    /// 仅当持久化文档仍处于 `(expected_status, expected_index)` 时写入成功；
    /// 返回 `false` 表示另一个变更方赢得了竞争，调用方应视本次操作为无操作。
    async fn commit_transition(
        &self,
        chain: &DispatchChain,
        expected_status: ChainStatus,
        expected_index: i32,
    ) -> DispatchResult<bool>;
}

/// 线路仓储抽象
#[async_trait]
pub trait LaneRepository: Send + Sync {
    async fn create(&self, lane: &Lane) -> DispatchResult<Lane>;

    async fn get_by_id(&self, id: i64) -> DispatchResult<Option<Lane>>;

    async fn find_active(&self) -> DispatchResult<Vec<Lane>>;
}
