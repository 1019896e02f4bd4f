use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;
use crate::DispatchResult;

use super::lane::{Lane, LaneCarrier, NotificationChannel};
use super::order::OrderContext;

/// 派单链状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChainStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "ESCALATED")]
    Escalated,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl ChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainStatus::Pending => "PENDING",
            ChainStatus::InProgress => "IN_PROGRESS",
            ChainStatus::Completed => "COMPLETED",
            ChainStatus::Escalated => "ESCALATED",
            ChainStatus::Cancelled => "CANCELLED",
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for ChainStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for ChainStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ChainStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "PENDING" => Ok(ChainStatus::Pending),
            "IN_PROGRESS" => Ok(ChainStatus::InProgress),
            "COMPLETED" => Ok(ChainStatus::Completed),
            "ESCALATED" => Ok(ChainStatus::Escalated),
            "CANCELLED" => Ok(ChainStatus::Cancelled),
            _ => Err(format!("Invalid chain status: {s}").into()),
        }
    }
}

/// 报价轮次状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttemptStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "SENT")]
    Sent,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "REFUSED")]
    Refused,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "SKIPPED")]
    Skipped,
}

/// 单个渠道的通知投递记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub channel: NotificationChannel,
    pub delivered: bool,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// 升级子记录状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EscalationStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "SUBMITTED")]
    Submitted,
    #[serde(rename = "FAILED")]
    Failed,
}

/// 派单链升级到外部市场的跟踪记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub escalated_at: DateTime<Utc>,
    pub tracking_id: Option<String>,
    pub status: EscalationStatus,
}

/// 一个承运商在派单链中的一轮报价
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub carrier_id: String,
    pub carrier_name: String,
    /// 链创建时从线路快照下来的排名
    pub position: i32,
    pub status: AttemptStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub refusal_reason: Option<String>,
    pub skip_reason: Option<String>,
    pub channels: Vec<NotificationChannel>,
    pub deliveries: Vec<DeliveryRecord>,
    pub proposed_price: Option<f64>,
    pub final_price: Option<f64>,
    pub response_delay_minutes: i64,
}

impl DispatchAttempt {
    /// 标记为已发出并设定响应截止时间
    fn arm(&mut self, now: DateTime<Utc>) {
        self.status = AttemptStatus::Sent;
        self.sent_at = Some(now);
        self.expires_at = Some(now + Duration::minutes(self.response_delay_minutes));
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == AttemptStatus::Sent
            && self.expires_at.map(|t| t <= now).unwrap_or(false)
    }
}

/// 状态转换成功后需要执行的副作用
#[derive(Debug, Clone, PartialEq)]
pub enum ChainTransition {
    /// 通知指定下标的报价轮次
    NotifyAttempt(usize),
    /// 链已指派给承运商
    Assigned { carrier_id: String },
    /// 链已用尽，需调用升级网关
    Escalate,
    /// 链已用尽且自动升级未启用，链已取消
    Exhausted,
}

/// 承运商响应类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Accepted,
    Refused,
}

/// 承运商响应附带信息
#[derive(Debug, Clone, Default)]
pub struct ResponseDetails {
    pub price: Option<f64>,
    pub reason: Option<String>,
}

/// 派单链：一个运单在排名承运商列表上的顺序报价过程
///
/// 所有状态转换都是纯内存操作，由仓储层以条件更新方式提交；
/// 提交失败（乐观前置条件不满足）时整个操作视为无副作用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchChain {
    pub id: i64,
    pub order_id: String,
    /// 链创建时快照的运单上下文，升级网关调用需要
    pub order: OrderContext,
    pub lane_id: Option<i64>,
    pub status: ChainStatus,
    /// 指向attempts的0基指针，仅在InProgress状态下有意义
    pub current_attempt_index: i32,
    pub attempts: Vec<DispatchAttempt>,
    pub max_attempts: i32,
    pub auto_escalate: bool,
    pub assigned_carrier_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub escalation: Option<EscalationRecord>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DispatchChain {
    /// 根据线路的可用承运商为运单创建派单链，承运商按排名快照为Pending轮次
    pub fn from_lane(order: &OrderContext, lane: &Lane, eligible: &[&LaneCarrier]) -> Self {
        let now = Utc::now();
        let max_attempts = lane.dispatch_config.max_attempts;

        let mut attempts: Vec<DispatchAttempt> = eligible
            .iter()
            .enumerate()
            .map(|(rank, carrier)| DispatchAttempt {
                carrier_id: carrier.carrier_id.clone(),
                carrier_name: carrier.carrier_name.clone(),
                position: rank as i32,
                status: AttemptStatus::Pending,
                sent_at: None,
                expires_at: None,
                responded_at: None,
                refusal_reason: None,
                skip_reason: None,
                channels: lane.dispatch_config.channels.clone(),
                deliveries: Vec::new(),
                proposed_price: None,
                final_price: None,
                response_delay_minutes: lane.response_delay_for(carrier),
            })
            .collect();

        if max_attempts > 0 && attempts.len() > max_attempts as usize {
            attempts.truncate(max_attempts as usize);
        }

        Self {
            id: 0,
            order_id: order.order_id.clone(),
            order: order.clone(),
            lane_id: Some(lane.id),
            status: ChainStatus::Pending,
            current_attempt_index: 0,
            attempts,
            max_attempts,
            auto_escalate: lane.dispatch_config.auto_escalate,
            assigned_carrier_id: None,
            assigned_at: None,
            escalation: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ChainStatus::Completed | ChainStatus::Escalated | ChainStatus::Cancelled
        )
    }

    pub fn current_attempt(&self) -> Option<&DispatchAttempt> {
        self.attempts.get(self.current_attempt_index as usize)
    }

    fn current_attempt_mut(&mut self) -> Option<&mut DispatchAttempt> {
        self.attempts.get_mut(self.current_attempt_index as usize)
    }

    /// 当前轮次的响应截止时间，用于仓储层的冗余扫描列
    pub fn current_expires_at(&self) -> Option<DateTime<Utc>> {
        if self.status != ChainStatus::InProgress {
            return None;
        }
        self.current_attempt().and_then(|a| a.expires_at)
    }

    /// 处于Sent状态的轮次数，不变式要求InProgress时恰好为1
    pub fn sent_attempt_count(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.status == AttemptStatus::Sent)
            .count()
    }

    /// 启动派单链：向排名第一的承运商发出报价
    pub fn start_at(&mut self, now: DateTime<Utc>) -> DispatchResult<ChainTransition> {
        if self.attempts.is_empty() {
            return Err(DispatchError::empty_chain(self.order_id.clone()));
        }
        if self.status != ChainStatus::Pending {
            return Err(DispatchError::precondition_failed(
                self.order_id.clone(),
                format!("启动要求Pending状态，当前为 {:?}", self.status),
            ));
        }

        self.current_attempt_index = 0;
        self.attempts[0].arm(now);
        self.status = ChainStatus::InProgress;
        self.updated_at = now;

        Ok(ChainTransition::NotifyAttempt(0))
    }

    /// 当前承运商的响应必须针对处于Sent状态的当前轮次，否则视为过期响应
    fn guard_current_response(&self, carrier_id: &str) -> DispatchResult<()> {
        if self.status != ChainStatus::InProgress {
            return Err(DispatchError::precondition_failed(
                self.order_id.clone(),
                format!("链不在InProgress状态: {:?}", self.status),
            ));
        }

        let attempt = self.current_attempt().ok_or_else(|| {
            DispatchError::Internal(format!(
                "链 {} 的当前轮次下标 {} 越界",
                self.order_id, self.current_attempt_index
            ))
        })?;

        if attempt.carrier_id != carrier_id {
            return Err(DispatchError::stale_response(
                self.order_id.clone(),
                carrier_id.to_string(),
                format!("当前轮次属于承运商 {}", attempt.carrier_id),
            ));
        }
        if attempt.status != AttemptStatus::Sent {
            return Err(DispatchError::stale_response(
                self.order_id.clone(),
                carrier_id.to_string(),
                format!("当前轮次状态为 {:?}，不再等待响应", attempt.status),
            ));
        }

        Ok(())
    }

    /// 承运商接受报价：链进入Completed并记录指派信息
    pub fn accept_current(
        &mut self,
        carrier_id: &str,
        price: Option<f64>,
        now: DateTime<Utc>,
    ) -> DispatchResult<ChainTransition> {
        self.guard_current_response(carrier_id)?;

        let attempt = self.current_attempt_mut().expect("guard验证过下标");
        attempt.status = AttemptStatus::Accepted;
        attempt.responded_at = Some(now);
        attempt.final_price = price;

        self.assigned_carrier_id = Some(carrier_id.to_string());
        self.assigned_at = Some(now);
        self.status = ChainStatus::Completed;
        self.updated_at = now;

        Ok(ChainTransition::Assigned {
            carrier_id: carrier_id.to_string(),
        })
    }

    /// 承运商拒绝报价：立即推进到下一轮次，不等待剩余响应窗口
    pub fn refuse_current(
        &mut self,
        carrier_id: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> DispatchResult<ChainTransition> {
        self.guard_current_response(carrier_id)?;

        let attempt = self.current_attempt_mut().expect("guard验证过下标");
        attempt.status = AttemptStatus::Refused;
        attempt.responded_at = Some(now);
        attempt.refusal_reason = reason;

        Ok(self.advance(now))
    }

    /// 当前轮次超时：由清扫器调用，要求轮次仍为Sent且已过期
    pub fn timeout_current(&mut self, now: DateTime<Utc>) -> DispatchResult<ChainTransition> {
        if self.status != ChainStatus::InProgress {
            return Err(DispatchError::precondition_failed(
                self.order_id.clone(),
                format!("链不在InProgress状态: {:?}", self.status),
            ));
        }

        let order_id = self.order_id.clone();
        let attempt = self.current_attempt_mut().ok_or_else(|| {
            DispatchError::Internal(format!("链 {order_id} 的当前轮次下标越界"))
        })?;

        if attempt.status != AttemptStatus::Sent {
            return Err(DispatchError::precondition_failed(
                order_id,
                format!("当前轮次状态为 {:?}，无需超时处理", attempt.status),
            ));
        }
        if !attempt.expires_at.map(|t| t <= now).unwrap_or(false) {
            return Err(DispatchError::precondition_failed(
                order_id,
                "当前轮次尚未到达响应截止时间".to_string(),
            ));
        }

        attempt.status = AttemptStatus::Timeout;
        attempt.responded_at = Some(now);

        Ok(self.advance(now))
    }

    /// 运营人员跳过当前承运商（如承运商临时停用）
    pub fn skip_current(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DispatchResult<ChainTransition> {
        if self.status != ChainStatus::InProgress {
            return Err(DispatchError::precondition_failed(
                self.order_id.clone(),
                format!("链不在InProgress状态: {:?}", self.status),
            ));
        }

        let order_id = self.order_id.clone();
        let attempt = self.current_attempt_mut().ok_or_else(|| {
            DispatchError::Internal(format!("链 {order_id} 的当前轮次下标越界"))
        })?;
        if attempt.status != AttemptStatus::Sent {
            return Err(DispatchError::precondition_failed(
                order_id,
                format!("当前轮次状态为 {:?}，无法跳过", attempt.status),
            ));
        }

        attempt.status = AttemptStatus::Skipped;
        attempt.responded_at = Some(now);
        attempt.skip_reason = Some(reason.to_string());

        Ok(self.advance(now))
    }

    /// 推进到下一轮次；列表用尽时按配置升级或取消。下标单调递增。
    fn advance(&mut self, now: DateTime<Utc>) -> ChainTransition {
        let next = self.current_attempt_index + 1;
        self.updated_at = now;

        if (next as usize) < self.attempts.len() {
            self.current_attempt_index = next;
            self.attempts[next as usize].arm(now);
            return ChainTransition::NotifyAttempt(next as usize);
        }

        if self.auto_escalate {
            self.status = ChainStatus::Escalated;
            self.escalation = Some(EscalationRecord {
                escalated_at: now,
                tracking_id: None,
                status: EscalationStatus::Pending,
            });
            ChainTransition::Escalate
        } else {
            self.status = ChainStatus::Cancelled;
            self.cancel_reason = Some("承运商列表已用尽，自动升级未启用".to_string());
            ChainTransition::Exhausted
        }
    }

    /// 取消派单链，终态下为无操作。返回是否发生了状态变更。
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = ChainStatus::Cancelled;
        self.cancel_reason = Some(reason.to_string());
        self.updated_at = now;
        true
    }

    /// 人工直接指派承运商，任何链状态下都允许（运营兜底通道）
    pub fn assign_manually(&mut self, carrier_id: &str, now: DateTime<Utc>) {
        if let Some(attempt) = self.current_attempt_mut() {
            if attempt.status == AttemptStatus::Sent {
                attempt.status = AttemptStatus::Skipped;
                attempt.responded_at = Some(now);
                attempt.skip_reason = Some("人工指派接管".to_string());
            }
        }
        self.assigned_carrier_id = Some(carrier_id.to_string());
        self.assigned_at = Some(now);
        self.status = ChainStatus::Completed;
        self.updated_at = now;
    }

    /// 记录升级网关返回的跟踪号
    pub fn record_escalation_submitted(&mut self, tracking_id: &str, now: DateTime<Utc>) {
        if let Some(escalation) = &mut self.escalation {
            escalation.tracking_id = Some(tracking_id.to_string());
            escalation.status = EscalationStatus::Submitted;
        }
        self.updated_at = now;
    }

    /// 升级网关调用失败时标记，等待人工处理
    pub fn record_escalation_failed(&mut self, now: DateTime<Utc>) {
        if let Some(escalation) = &mut self.escalation {
            escalation.status = EscalationStatus::Failed;
        }
        self.updated_at = now;
    }

    /// 记录当前轮次的通知投递结果
    pub fn record_deliveries(&mut self, index: usize, deliveries: Vec<DeliveryRecord>) {
        if let Some(attempt) = self.attempts.get_mut(index) {
            attempt.deliveries = deliveries;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lane::{CarrierContact, DispatchConfig, LaneEndpoint};

    fn test_lane(carrier_count: usize, auto_escalate: bool) -> Lane {
        let carriers = (0..carrier_count)
            .map(|i| LaneCarrier {
                carrier_id: format!("carrier-{i}"),
                carrier_name: format!("Carrier {i}"),
                contact: CarrierContact::default(),
                price_grid: serde_json::json!({}),
                min_score: 0.0,
                response_delay_minutes: Some(120),
                is_active: true,
                position: i as i32,
            })
            .collect();

        Lane {
            id: 7,
            name: "test-lane".to_string(),
            origin: LaneEndpoint {
                city: "Lyon".to_string(),
                postal_prefix: "69".to_string(),
                region: None,
                country: "FR".to_string(),
                geo: None,
            },
            destination: LaneEndpoint {
                city: "Milan".to_string(),
                postal_prefix: "20".to_string(),
                region: None,
                country: "IT".to_string(),
                geo: None,
            },
            carriers,
            dispatch_config: DispatchConfig {
                auto_escalate,
                max_attempts: 0,
                default_response_delay_minutes: 120,
                channels: vec![NotificationChannel::Email],
            },
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_order(order_id: &str) -> OrderContext {
        OrderContext::new(
            order_id,
            crate::models::Address::new("Lyon", "69007", "FR"),
            crate::models::Address::new("Milan", "20121", "IT"),
        )
    }

    fn chain_with(carrier_count: usize, auto_escalate: bool) -> DispatchChain {
        let lane = test_lane(carrier_count, auto_escalate);
        let eligible = lane.active_carriers();
        DispatchChain::from_lane(&test_order("ORD-1"), &lane, &eligible)
    }

    #[test]
    fn test_start_empty_chain_fails() {
        let mut chain = chain_with(0, true);
        assert!(matches!(
            chain.start_at(Utc::now()),
            Err(DispatchError::EmptyChain { .. })
        ));
        assert_eq!(chain.status, ChainStatus::Pending);
    }

    #[test]
    fn test_start_arms_first_attempt() {
        let now = Utc::now();
        let mut chain = chain_with(3, true);

        let transition = chain.start_at(now).unwrap();
        assert_eq!(transition, ChainTransition::NotifyAttempt(0));
        assert_eq!(chain.status, ChainStatus::InProgress);
        assert_eq!(chain.sent_attempt_count(), 1);

        let attempt = chain.current_attempt().unwrap();
        assert_eq!(attempt.sent_at, Some(now));
        assert_eq!(attempt.expires_at, Some(now + Duration::minutes(120)));
    }

    #[test]
    fn test_accept_completes_chain() {
        let now = Utc::now();
        let mut chain = chain_with(1, true);
        chain.start_at(now).unwrap();

        let transition = chain
            .accept_current("carrier-0", Some(840.0), now + Duration::minutes(5))
            .unwrap();

        assert_eq!(
            transition,
            ChainTransition::Assigned {
                carrier_id: "carrier-0".to_string()
            }
        );
        assert_eq!(chain.status, ChainStatus::Completed);
        assert_eq!(chain.assigned_carrier_id.as_deref(), Some("carrier-0"));
        assert!(chain.escalation.is_none());
        assert_eq!(chain.attempts[0].final_price, Some(840.0));
    }

    #[test]
    fn test_refuse_advances_immediately() {
        let t0 = Utc::now();
        let mut chain = chain_with(3, true);
        chain.start_at(t0).unwrap();

        let t1 = t0 + Duration::minutes(10);
        let transition = chain
            .refuse_current("carrier-0", Some("no truck available".to_string()), t1)
            .unwrap();

        assert_eq!(transition, ChainTransition::NotifyAttempt(1));
        assert_eq!(chain.current_attempt_index, 1);
        assert_eq!(chain.attempts[0].status, AttemptStatus::Refused);
        // 下一轮立即发出，截止时间从拒绝时刻起算
        assert_eq!(chain.attempts[1].sent_at, Some(t1));
        assert_eq!(chain.attempts[1].expires_at, Some(t1 + Duration::minutes(120)));
        assert_eq!(chain.sent_attempt_count(), 1);
    }

    #[test]
    fn test_timeout_advances_and_rearms() {
        let t0 = Utc::now();
        let mut chain = chain_with(3, true);
        chain.start_at(t0).unwrap();

        let expiry = t0 + Duration::minutes(120);
        let transition = chain.timeout_current(expiry).unwrap();

        assert_eq!(transition, ChainTransition::NotifyAttempt(1));
        assert_eq!(chain.attempts[0].status, AttemptStatus::Timeout);
        assert_eq!(chain.attempts[1].sent_at, Some(expiry));
    }

    #[test]
    fn test_timeout_before_expiry_is_rejected() {
        let t0 = Utc::now();
        let mut chain = chain_with(2, true);
        chain.start_at(t0).unwrap();

        let result = chain.timeout_current(t0 + Duration::minutes(30));
        assert!(matches!(
            result,
            Err(DispatchError::PreconditionFailed { .. })
        ));
        assert_eq!(chain.current_attempt_index, 0);
    }

    #[test]
    fn test_exhaustion_escalates() {
        let t0 = Utc::now();
        let mut chain = chain_with(2, true);
        chain.start_at(t0).unwrap();

        chain.refuse_current("carrier-0", None, t0).unwrap();
        let transition = chain.refuse_current("carrier-1", None, t0).unwrap();

        assert_eq!(transition, ChainTransition::Escalate);
        assert_eq!(chain.status, ChainStatus::Escalated);
        let escalation = chain.escalation.as_ref().unwrap();
        assert_eq!(escalation.status, EscalationStatus::Pending);
        assert!(escalation.tracking_id.is_none());
    }

    #[test]
    fn test_exhaustion_without_auto_escalate_cancels() {
        let t0 = Utc::now();
        let mut chain = chain_with(1, false);
        chain.start_at(t0).unwrap();

        let transition = chain.refuse_current("carrier-0", None, t0).unwrap();

        assert_eq!(transition, ChainTransition::Exhausted);
        assert_eq!(chain.status, ChainStatus::Cancelled);
        assert!(chain.cancel_reason.is_some());
        assert!(chain.escalation.is_none());
    }

    #[test]
    fn test_response_from_wrong_carrier_is_stale() {
        let t0 = Utc::now();
        let mut chain = chain_with(2, true);
        chain.start_at(t0).unwrap();

        let result = chain.accept_current("carrier-1", None, t0);
        assert!(matches!(result, Err(DispatchError::StaleResponse { .. })));
        // 链状态未被破坏
        assert_eq!(chain.status, ChainStatus::InProgress);
        assert_eq!(chain.current_attempt_index, 0);
    }

    #[test]
    fn test_index_is_monotonic() {
        let t0 = Utc::now();
        let mut chain = chain_with(3, true);
        chain.start_at(t0).unwrap();

        let mut last = chain.current_attempt_index;
        chain.refuse_current("carrier-0", None, t0).unwrap();
        assert!(chain.current_attempt_index > last);
        last = chain.current_attempt_index;
        chain.refuse_current("carrier-1", None, t0).unwrap();
        assert!(chain.current_attempt_index > last);
    }

    #[test]
    fn test_cancel_is_noop_on_terminal_chain() {
        let t0 = Utc::now();
        let mut chain = chain_with(1, true);
        chain.start_at(t0).unwrap();
        chain.accept_current("carrier-0", None, t0).unwrap();

        assert!(!chain.cancel("order cancelled", t0));
        assert_eq!(chain.status, ChainStatus::Completed);
    }

    #[test]
    fn test_cancel_in_progress_chain() {
        let t0 = Utc::now();
        let mut chain = chain_with(2, true);
        chain.start_at(t0).unwrap();

        assert!(chain.cancel("order cancelled by customer", t0));
        assert_eq!(chain.status, ChainStatus::Cancelled);

        // 终态后的响应被拒绝
        let result = chain.accept_current("carrier-0", None, t0);
        assert!(matches!(
            result,
            Err(DispatchError::PreconditionFailed { .. })
        ));
    }

    #[test]
    fn test_skip_current_advances() {
        let t0 = Utc::now();
        let mut chain = chain_with(2, true);
        chain.start_at(t0).unwrap();

        let transition = chain.skip_current("carrier suspended", t0).unwrap();
        assert_eq!(transition, ChainTransition::NotifyAttempt(1));
        assert_eq!(chain.attempts[0].status, AttemptStatus::Skipped);
        assert_eq!(
            chain.attempts[0].skip_reason.as_deref(),
            Some("carrier suspended")
        );
    }

    #[test]
    fn test_manual_assignment_overrides_any_status() {
        let t0 = Utc::now();
        let mut chain = chain_with(2, true);
        chain.start_at(t0).unwrap();
        chain.cancel("cancelled", t0);

        chain.assign_manually("external-carrier", t0);
        assert_eq!(chain.status, ChainStatus::Completed);
        assert_eq!(
            chain.assigned_carrier_id.as_deref(),
            Some("external-carrier")
        );
    }

    #[test]
    fn test_max_attempts_truncates_snapshot() {
        let mut lane = test_lane(5, true);
        lane.dispatch_config.max_attempts = 2;
        let eligible = lane.active_carriers();
        let chain = DispatchChain::from_lane(&test_order("ORD-2"), &lane, &eligible);

        assert_eq!(chain.attempts.len(), 2);
        assert_eq!(chain.attempts[0].carrier_id, "carrier-0");
        assert_eq!(chain.attempts[1].carrier_id, "carrier-1");
    }

    #[test]
    fn test_current_expires_at_tracks_current_attempt() {
        let t0 = Utc::now();
        let mut chain = chain_with(2, true);
        assert!(chain.current_expires_at().is_none());

        chain.start_at(t0).unwrap();
        assert_eq!(chain.current_expires_at(), Some(t0 + Duration::minutes(120)));

        chain.accept_current("carrier-0", None, t0).unwrap();
        assert!(chain.current_expires_at().is_none());
    }
}
