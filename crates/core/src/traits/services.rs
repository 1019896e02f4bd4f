//! 外部协作方接口
//!
//! 通知投递、市场升级和承运商评分都是托管服务，
//! 引擎只依赖这些窄接口，由组合根注入具体实现。

use async_trait::async_trait;

use crate::models::{DeliveryRecord, DispatchAttempt, NotificationChannel, OrderContext};
use crate::DispatchResult;

/// 升级网关返回的跟踪句柄
#[derive(Debug, Clone)]
pub struct EscalationHandle {
    pub tracking_id: String,
}

/// 向当前承运商发送报价通知
///
/// 投递失败会被记录但不会阻塞响应超时时钟，引擎自身不做重发。
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(
        &self,
        order_id: &str,
        attempt: &DispatchAttempt,
        channels: &[NotificationChannel],
    ) -> DispatchResult<Vec<DeliveryRecord>>;
}

/// 链用尽后将运单移交外部市场撮合服务
#[async_trait]
pub trait EscalationGateway: Send + Sync {
    async fn escalate(&self, context: &OrderContext) -> DispatchResult<EscalationHandle>;
}

/// 承运商全局评分查询，用于线路的minScore过滤
#[async_trait]
pub trait CarrierScoringService: Send + Sync {
    async fn get_global_score(&self, carrier_id: &str) -> DispatchResult<f64>;
}
