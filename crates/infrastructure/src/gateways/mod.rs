//! 外部协作方的本地适配器
//!
//! 真实的邮件/短信投递和市场撮合API属于托管服务，派单服务只持有
//! 窄接口。这里的适配器把外发动作落到结构化日志和人工处理队列，
//! 供独立部署和演练环境使用。

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use symphonia_core::{
    models::{DeliveryRecord, DispatchAttempt, NotificationChannel, OrderContext},
    traits::{EscalationGateway, EscalationHandle, NotificationDispatcher},
    DispatchResult,
};

/// 把报价通知写入结构化日志的投递器
///
/// 每个渠道产生一条投递记录，detail标记为日志投递，
/// 由日志管道转发给下游通知服务。
#[derive(Default)]
pub struct LoggingNotificationDispatcher;

impl LoggingNotificationDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationDispatcher for LoggingNotificationDispatcher {
    async fn send(
        &self,
        order_id: &str,
        attempt: &DispatchAttempt,
        channels: &[NotificationChannel],
    ) -> DispatchResult<Vec<DeliveryRecord>> {
        let now = Utc::now();
        let deliveries = channels
            .iter()
            .map(|channel| {
                info!(
                    order_id,
                    carrier_id = %attempt.carrier_id,
                    channel = %channel,
                    expires_at = ?attempt.expires_at,
                    "派单报价通知"
                );
                DeliveryRecord {
                    channel: *channel,
                    delivered: true,
                    detail: Some("log-pipeline".to_string()),
                    recorded_at: now,
                }
            })
            .collect();

        Ok(deliveries)
    }
}

/// 把用尽的派单链转入人工处理队列的升级网关
///
/// 生成本地跟踪号并以warn级别记录，运营端按跟踪号认领。
#[derive(Default)]
pub struct ManualReviewEscalationGateway;

impl ManualReviewEscalationGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EscalationGateway for ManualReviewEscalationGateway {
    async fn escalate(&self, context: &OrderContext) -> DispatchResult<EscalationHandle> {
        let tracking_id = format!("ESC-{}", Uuid::new_v4());
        warn!(
            order_id = %context.order_id,
            origin = %context.origin.summary(),
            destination = %context.destination.summary(),
            tracking_id = %tracking_id,
            "派单链已用尽，转入人工处理队列"
        );
        Ok(EscalationHandle { tracking_id })
    }
}
