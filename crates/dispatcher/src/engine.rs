use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use symphonia_core::{
    models::{
        ChainStatus, ChainTransition, DispatchChain, OrderContext, ResponseDetails,
        ResponseOutcome,
    },
    traits::{DispatchChainRepository, EscalationGateway, NotificationDispatcher},
    DispatchError, DispatchResult,
};
use symphonia_infrastructure::DispatchMetrics;

use crate::lane_registry::ResolvedLane;

/// 引擎操作对调用方（订单服务）可见的结果
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// 链已指派给承运商
    Assigned { carrier_id: String },
    /// 已推进到下一轮次
    AdvancedTo(usize),
    /// 链已用尽并移交升级网关
    Escalated,
    /// 链已用尽且自动升级未启用，链被取消
    Exhausted,
    /// 链已处于终态，本次调用为无操作
    Ignored,
}

/// 一次超时清扫的统计
#[derive(Debug, Default, Clone)]
pub struct SweepStats {
    pub examined: usize,
    pub timed_out: usize,
    pub escalated: usize,
    pub lost_races: usize,
}

/// 派单链引擎
///
/// 所有写入都经由仓储的条件提交：先在内存中完成状态转换，再以
/// `(order_id, 期望状态, 期望轮次下标)` 为前置条件写回。提交失败
/// 说明另一个变更方（响应处理或超时清扫）赢得竞争，本次操作作废。
/// 通知和升级等副作用只在提交成功后执行。
pub struct ChainEngine {
    chain_repo: Arc<dyn DispatchChainRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
    escalation_gateway: Arc<dyn EscalationGateway>,
    metrics: Arc<DispatchMetrics>,
}

impl ChainEngine {
    pub fn new(
        chain_repo: Arc<dyn DispatchChainRepository>,
        notifier: Arc<dyn NotificationDispatcher>,
        escalation_gateway: Arc<dyn EscalationGateway>,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        Self {
            chain_repo,
            notifier,
            escalation_gateway,
            metrics,
        }
    }

    /// 为匹配到线路的运单创建派单链，承运商列表按当前排名快照
    pub async fn create_chain(
        &self,
        order: &OrderContext,
        resolved: &ResolvedLane,
    ) -> DispatchResult<DispatchChain> {
        let eligible: Vec<_> = resolved.carriers.iter().collect();
        let chain = DispatchChain::from_lane(order, &resolved.lane, &eligible);

        let created = self.chain_repo.create(&chain).await?;
        self.metrics.record_chain_created();

        info!(
            "为运单 {} 创建派单链，线路 {}，{} 个候选承运商",
            order.order_id,
            resolved.lane.name,
            created.attempts.len()
        );
        Ok(created)
    }

    /// 启动派单链：向排名第一的承运商发出报价
    pub async fn start(&self, order_id: &str) -> DispatchResult<DispatchOutcome> {
        let mut chain = self.load_chain(order_id).await?;

        let expected_status = chain.status;
        let expected_index = chain.current_attempt_index;
        let transition = chain.start_at(Utc::now())?;

        if !self
            .chain_repo
            .commit_transition(&chain, expected_status, expected_index)
            .await?
        {
            self.metrics.record_precondition_loss();
            return Err(DispatchError::precondition_failed(
                order_id.to_string(),
                "启动提交失败，链已被并发修改".to_string(),
            ));
        }

        self.metrics.record_chain_started();
        info!("派单链 {} 已启动", order_id);

        self.apply_side_effects(chain, transition).await
    }

    /// 记录承运商对当前报价的响应
    ///
    /// 过期响应（承运商不是当前轮次，或当前轮次已不再等待）返回
    /// `StaleResponse`，链状态不受影响，调用方记录日志即可。
    pub async fn record_response(
        &self,
        order_id: &str,
        carrier_id: &str,
        outcome: ResponseOutcome,
        details: ResponseDetails,
    ) -> DispatchResult<DispatchOutcome> {
        let mut chain = self.load_chain(order_id).await?;

        if chain.is_terminal() {
            debug!(
                "派单链 {} 已处于终态 {:?}，忽略承运商 {} 的响应",
                order_id, chain.status, carrier_id
            );
            return Ok(DispatchOutcome::Ignored);
        }

        let expected_status = chain.status;
        let expected_index = chain.current_attempt_index;
        let now = Utc::now();

        let transition = match outcome {
            ResponseOutcome::Accepted => {
                chain.accept_current(carrier_id, details.price, now)
            }
            ResponseOutcome::Refused => {
                chain.refuse_current(carrier_id, details.reason.clone(), now)
            }
        };
        let transition = match transition {
            Ok(t) => t,
            Err(e @ DispatchError::StaleResponse { .. }) => {
                warn!("忽略过期响应: {}", e);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if !self
            .chain_repo
            .commit_transition(&chain, expected_status, expected_index)
            .await?
        {
            self.metrics.record_precondition_loss();
            warn!(
                "派单链 {} 的响应提交输给了并发变更，操作作废",
                order_id
            );
            return Err(DispatchError::precondition_failed(
                order_id.to_string(),
                "响应提交失败，链已被并发修改".to_string(),
            ));
        }

        if outcome == ResponseOutcome::Refused {
            self.metrics.record_attempt_refused();
        }

        self.apply_side_effects(chain, transition).await
    }

    /// 取消派单链（订单取消时调用），终态下为无操作
    pub async fn cancel(&self, order_id: &str, reason: &str) -> DispatchResult<bool> {
        // 取消必须最终生效：与清扫器竞争失败时重读后重试
        for _ in 0..3 {
            let mut chain = self.load_chain(order_id).await?;
            if chain.is_terminal() {
                debug!("派单链 {} 已处于终态，无需取消", order_id);
                return Ok(false);
            }

            let expected_status = chain.status;
            let expected_index = chain.current_attempt_index;
            chain.cancel(reason, Utc::now());

            if self
                .chain_repo
                .commit_transition(&chain, expected_status, expected_index)
                .await?
            {
                self.metrics.record_chain_cancelled();
                info!("派单链 {} 已取消: {}", order_id, reason);
                return Ok(true);
            }
            self.metrics.record_precondition_loss();
        }

        Err(DispatchError::precondition_failed(
            order_id.to_string(),
            "取消重试次数用尽".to_string(),
        ))
    }

    /// 运营人员跳过当前承运商（例如承运商被临时停用）
    pub async fn skip_current_attempt(
        &self,
        order_id: &str,
        reason: &str,
    ) -> DispatchResult<DispatchOutcome> {
        let mut chain = self.load_chain(order_id).await?;

        if chain.is_terminal() {
            return Ok(DispatchOutcome::Ignored);
        }

        let expected_status = chain.status;
        let expected_index = chain.current_attempt_index;
        let transition = chain.skip_current(reason, Utc::now())?;

        if !self
            .chain_repo
            .commit_transition(&chain, expected_status, expected_index)
            .await?
        {
            self.metrics.record_precondition_loss();
            return Err(DispatchError::precondition_failed(
                order_id.to_string(),
                "跳过提交失败，链已被并发修改".to_string(),
            ));
        }

        self.metrics.record_attempt_skipped();
        info!("派单链 {} 跳过当前承运商: {}", order_id, reason);

        self.apply_side_effects(chain, transition).await
    }

    /// 人工直接指派承运商，任何链状态下都允许（运营兜底通道）
    pub async fn assign_manually(
        &self,
        order_id: &str,
        carrier_id: &str,
    ) -> DispatchResult<()> {
        for _ in 0..3 {
            let mut chain = self.load_chain(order_id).await?;

            let expected_status = chain.status;
            let expected_index = chain.current_attempt_index;
            chain.assign_manually(carrier_id, Utc::now());

            if self
                .chain_repo
                .commit_transition(&chain, expected_status, expected_index)
                .await?
            {
                self.metrics.record_chain_completed();
                info!(
                    "派单链 {} 已人工指派给承运商 {}",
                    order_id, carrier_id
                );
                return Ok(());
            }
            self.metrics.record_precondition_loss();
        }

        Err(DispatchError::precondition_failed(
            order_id.to_string(),
            "人工指派重试次数用尽".to_string(),
        ))
    }

    /// 超时清扫：推进所有当前轮次已过响应截止时间的链
    ///
    /// 对同一条链，清扫与响应处理的竞争由条件提交裁决：先提交者生效，
    /// 后提交者作废。重复清扫已推进的链是无操作。
    pub async fn sweep_timeouts(&self, now: DateTime<Utc>, batch_size: i64) -> DispatchResult<SweepStats> {
        let expired = self
            .chain_repo
            .find_expired_in_progress(now, batch_size)
            .await?;

        let mut stats = SweepStats {
            examined: expired.len(),
            ..Default::default()
        };

        for chain in expired {
            let order_id = chain.order_id.clone();
            match self.timeout_one(chain, now).await {
                Ok(Some(DispatchOutcome::Escalated)) => {
                    stats.timed_out += 1;
                    stats.escalated += 1;
                }
                Ok(Some(_)) => stats.timed_out += 1,
                Ok(None) => stats.lost_races += 1,
                Err(e) => {
                    error!("清扫派单链 {} 失败: {}", order_id, e);
                }
            }
        }

        if stats.timed_out > 0 || stats.lost_races > 0 {
            info!(
                "超时清扫完成: 检查 {} 条，推进 {} 条，升级 {} 条，竞争失败 {} 条",
                stats.examined, stats.timed_out, stats.escalated, stats.lost_races
            );
        }
        Ok(stats)
    }

    /// 处理单条超时链；返回None表示前置条件复核失败（响应方先一步提交）
    async fn timeout_one(
        &self,
        mut chain: DispatchChain,
        now: DateTime<Utc>,
    ) -> DispatchResult<Option<DispatchOutcome>> {
        // 提交前复核：查询结果可能已经过时
        if chain.status != ChainStatus::InProgress
            || !chain.current_attempt().map(|a| a.is_expired(now)).unwrap_or(false)
        {
            return Ok(None);
        }

        let expected_status = chain.status;
        let expected_index = chain.current_attempt_index;
        let transition = match chain.timeout_current(now) {
            Ok(t) => t,
            Err(DispatchError::PreconditionFailed { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        if !self
            .chain_repo
            .commit_transition(&chain, expected_status, expected_index)
            .await?
        {
            self.metrics.record_precondition_loss();
            debug!(
                "派单链 {} 的超时提交输给了并发响应，跳过",
                chain.order_id
            );
            return Ok(None);
        }

        self.metrics.record_attempt_timed_out();
        let outcome = self.apply_side_effects(chain, transition).await?;
        Ok(Some(outcome))
    }

    async fn load_chain(&self, order_id: &str) -> DispatchResult<DispatchChain> {
        self.chain_repo
            .get_by_order_id(order_id)
            .await?
            .ok_or_else(|| DispatchError::chain_not_found(order_id))
    }

    /// 提交成功后的副作用：通知新的当前承运商或调用升级网关
    async fn apply_side_effects(
        &self,
        mut chain: DispatchChain,
        transition: ChainTransition,
    ) -> DispatchResult<DispatchOutcome> {
        match transition {
            ChainTransition::Assigned { carrier_id } => {
                self.metrics.record_chain_completed();
                info!(
                    "运单 {} 已指派给承运商 {}",
                    chain.order_id, carrier_id
                );
                Ok(DispatchOutcome::Assigned { carrier_id })
            }
            ChainTransition::NotifyAttempt(index) => {
                self.notify_attempt(&mut chain, index).await;
                Ok(DispatchOutcome::AdvancedTo(index))
            }
            ChainTransition::Escalate => {
                self.run_escalation(&mut chain).await;
                self.metrics.record_chain_escalated();
                Ok(DispatchOutcome::Escalated)
            }
            ChainTransition::Exhausted => {
                self.metrics.record_chain_cancelled();
                warn!(
                    "派单链 {} 承运商列表已用尽，自动升级未启用，等待人工处理",
                    chain.order_id
                );
                Ok(DispatchOutcome::Exhausted)
            }
        }
    }

    /// 发送报价通知并记录投递结果
    ///
    /// 投递失败不阻塞响应超时时钟：记录后继续，由承运商门户兜底。
    async fn notify_attempt(&self, chain: &mut DispatchChain, index: usize) {
        let Some(attempt) = chain.attempts.get(index).cloned() else {
            error!("派单链 {} 的通知下标 {} 越界", chain.order_id, index);
            return;
        };

        info!(
            "向承运商 {} 发出运单 {} 的报价，截止时间 {:?}",
            attempt.carrier_id, chain.order_id, attempt.expires_at
        );

        match self
            .notifier
            .send(&chain.order_id, &attempt, &attempt.channels)
            .await
        {
            Ok(deliveries) => {
                chain.record_deliveries(index, deliveries);
                // 投递记录尽力写回，竞争失败不影响链推进
                let _ = self
                    .chain_repo
                    .commit_transition(chain, chain.status, chain.current_attempt_index)
                    .await;
            }
            Err(e) => {
                self.metrics.record_notification_failure();
                warn!(
                    "运单 {} 向承运商 {} 的通知发送失败: {}",
                    chain.order_id, attempt.carrier_id, e
                );
            }
        }
    }

    /// 调用升级网关并记录跟踪号；网关异步处理，引擎不等待撮合结果
    async fn run_escalation(&self, chain: &mut DispatchChain) {
        info!("派单链 {} 已用尽，移交外部市场撮合", chain.order_id);

        match self.escalation_gateway.escalate(&chain.order).await {
            Ok(handle) => {
                chain.record_escalation_submitted(&handle.tracking_id, Utc::now());
                if !self
                    .chain_repo
                    .commit_transition(chain, chain.status, chain.current_attempt_index)
                    .await
                    .unwrap_or(false)
                {
                    warn!(
                        "派单链 {} 的升级跟踪号写回失败: {}",
                        chain.order_id, handle.tracking_id
                    );
                }
            }
            Err(e) => {
                self.metrics.record_escalation_failure();
                error!(
                    "派单链 {} 的升级网关调用失败，等待人工处理: {}",
                    chain.order_id, e
                );
                chain.record_escalation_failed(Utc::now());
                let _ = self
                    .chain_repo
                    .commit_transition(chain, chain.status, chain.current_attempt_index)
                    .await;
            }
        }
    }
}
