//! 内存mock实现
//!
//! 覆盖引擎依赖的全部窄接口。派单链mock用 `(status, current_attempt_index)`
//! 做与生产仓储相同的条件提交判定，可以在测试里直接构造提交竞争。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use symphonia_core::{
    models::{
        ChainStatus, DeliveryRecord, DispatchAttempt, DispatchChain, Lane, NotificationChannel,
        OrderContext,
    },
    traits::{
        CarrierScoringService, DispatchChainRepository, EscalationGateway, EscalationHandle,
        LaneRepository, NotificationDispatcher,
    },
    DispatchError, DispatchResult,
};

/// 派单链仓储mock
#[derive(Default)]
pub struct MockDispatchChainRepository {
    chains: Mutex<HashMap<String, DispatchChain>>,
    next_id: AtomicI64,
}

impl MockDispatchChainRepository {
    pub fn new() -> Self {
        Self {
            chains: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// 直接读取存储的链快照，用于断言
    pub fn stored(&self, order_id: &str) -> Option<DispatchChain> {
        self.chains.lock().unwrap().get(order_id).cloned()
    }

    /// 直接覆盖存储的链，用于构造竞争场景
    pub fn overwrite(&self, chain: DispatchChain) {
        self.chains
            .lock()
            .unwrap()
            .insert(chain.order_id.clone(), chain);
    }
}

#[async_trait]
impl DispatchChainRepository for MockDispatchChainRepository {
    async fn create(&self, chain: &DispatchChain) -> DispatchResult<DispatchChain> {
        let mut chains = self.chains.lock().unwrap();
        if chains.contains_key(&chain.order_id) {
            return Err(DispatchError::ChainAlreadyExists {
                order_id: chain.order_id.clone(),
            });
        }

        let mut stored = chain.clone();
        stored.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        chains.insert(stored.order_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> DispatchResult<Option<DispatchChain>> {
        let chains = self.chains.lock().unwrap();
        Ok(chains.values().find(|c| c.id == id).cloned())
    }

    async fn get_by_order_id(&self, order_id: &str) -> DispatchResult<Option<DispatchChain>> {
        Ok(self.chains.lock().unwrap().get(order_id).cloned())
    }

    async fn find_expired_in_progress(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> DispatchResult<Vec<DispatchChain>> {
        let chains = self.chains.lock().unwrap();
        let mut expired: Vec<DispatchChain> = chains
            .values()
            .filter(|c| {
                c.status == ChainStatus::InProgress
                    && c.current_expires_at().map(|t| t <= now).unwrap_or(false)
            })
            .cloned()
            .collect();
        expired.sort_by_key(|c| c.current_expires_at());
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn commit_transition(
        &self,
        chain: &DispatchChain,
        expected_status: ChainStatus,
        expected_index: i32,
    ) -> DispatchResult<bool> {
        let mut chains = self.chains.lock().unwrap();
        let Some(stored) = chains.get(&chain.order_id) else {
            return Ok(false);
        };
        if stored.status != expected_status || stored.current_attempt_index != expected_index {
            return Ok(false);
        }

        let mut committed = chain.clone();
        committed.id = stored.id;
        chains.insert(committed.order_id.clone(), committed);
        Ok(true)
    }
}

/// 线路仓储mock
#[derive(Default)]
pub struct MockLaneRepository {
    lanes: Mutex<HashMap<i64, Lane>>,
    next_id: AtomicI64,
}

impl MockLaneRepository {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn with_lanes(lanes: Vec<Lane>) -> Self {
        let repo = Self::new();
        for lane in lanes {
            let mut stored = lane;
            if stored.id == 0 {
                stored.id = repo.next_id.fetch_add(1, Ordering::SeqCst);
            }
            repo.lanes.lock().unwrap().insert(stored.id, stored);
        }
        repo
    }
}

#[async_trait]
impl LaneRepository for MockLaneRepository {
    async fn create(&self, lane: &Lane) -> DispatchResult<Lane> {
        lane.validate()?;
        let mut stored = lane.clone();
        stored.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lanes.lock().unwrap().insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> DispatchResult<Option<Lane>> {
        Ok(self.lanes.lock().unwrap().get(&id).cloned())
    }

    async fn find_active(&self) -> DispatchResult<Vec<Lane>> {
        let lanes = self.lanes.lock().unwrap();
        let mut active: Vec<Lane> = lanes.values().filter(|l| l.is_active).cloned().collect();
        active.sort_by_key(|l| l.id);
        Ok(active)
    }
}

/// 测试中记录的一次通知发送
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub order_id: String,
    pub carrier_id: String,
    pub channels: Vec<NotificationChannel>,
}

/// 通知网关mock，可注入投递失败
#[derive(Default)]
pub struct MockNotificationDispatcher {
    sent: Mutex<Vec<SentNotification>>,
    fail_delivery: AtomicBool,
}

impl MockNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的send调用全部返回错误
    pub fn fail_deliveries(&self) {
        self.fail_delivery.store(true, Ordering::SeqCst);
    }

    pub fn sent_notifications(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationDispatcher for MockNotificationDispatcher {
    async fn send(
        &self,
        order_id: &str,
        attempt: &DispatchAttempt,
        channels: &[NotificationChannel],
    ) -> DispatchResult<Vec<DeliveryRecord>> {
        if self.fail_delivery.load(Ordering::SeqCst) {
            return Err(DispatchError::Notification(format!(
                "simulated delivery failure for {order_id}"
            )));
        }

        self.sent.lock().unwrap().push(SentNotification {
            order_id: order_id.to_string(),
            carrier_id: attempt.carrier_id.clone(),
            channels: channels.to_vec(),
        });

        Ok(channels
            .iter()
            .map(|channel| DeliveryRecord {
                channel: *channel,
                delivered: true,
                detail: None,
                recorded_at: Utc::now(),
            })
            .collect())
    }
}

/// 升级网关mock，按调用顺序发放跟踪号
#[derive(Default)]
pub struct MockEscalationGateway {
    escalated: Mutex<Vec<OrderContext>>,
    counter: AtomicUsize,
    fail_calls: AtomicBool,
}

impl MockEscalationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的escalate调用全部返回错误
    pub fn fail_calls(&self) {
        self.fail_calls.store(true, Ordering::SeqCst);
    }

    pub fn escalated_orders(&self) -> Vec<OrderContext> {
        self.escalated.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EscalationGateway for MockEscalationGateway {
    async fn escalate(&self, context: &OrderContext) -> DispatchResult<EscalationHandle> {
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(DispatchError::Escalation(format!(
                "simulated marketplace outage for {}",
                context.order_id
            )));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.escalated.lock().unwrap().push(context.clone());
        Ok(EscalationHandle {
            tracking_id: format!("MKT-{n:04}"),
        })
    }
}

/// 承运商评分mock
pub struct MockCarrierScoringService {
    scores: Mutex<HashMap<String, f64>>,
    failing: Mutex<HashSet<String>>,
    default_score: f64,
}

impl MockCarrierScoringService {
    /// 未显式设置评分的承运商返回default_score
    pub fn new(default_score: f64) -> Self {
        Self {
            scores: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            default_score,
        }
    }

    pub fn set_score(&self, carrier_id: &str, score: f64) {
        self.scores
            .lock()
            .unwrap()
            .insert(carrier_id.to_string(), score);
    }

    /// 指定承运商的评分查询返回错误
    pub fn fail_for(&self, carrier_id: &str) {
        self.failing.lock().unwrap().insert(carrier_id.to_string());
    }
}

impl Default for MockCarrierScoringService {
    fn default() -> Self {
        Self::new(5.0)
    }
}

#[async_trait]
impl CarrierScoringService for MockCarrierScoringService {
    async fn get_global_score(&self, carrier_id: &str) -> DispatchResult<f64> {
        if self.failing.lock().unwrap().contains(carrier_id) {
            return Err(DispatchError::Internal(format!(
                "simulated scoring outage for {carrier_id}"
            )));
        }
        Ok(self
            .scores
            .lock()
            .unwrap()
            .get(carrier_id)
            .copied()
            .unwrap_or(self.default_score))
    }
}
