use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument, warn};

use symphonia_core::{
    models::{ChainStatus, DispatchChain},
    traits::DispatchChainRepository,
    DispatchError, DispatchResult,
};

use crate::observability::DispatchMetrics;

/// 派单链的PostgreSQL仓储
///
/// 链文档整体存储：报价轮次和升级记录为JSONB列，当前轮次的响应截止时间
/// 冗余到 `current_expires_at` 列，配合 `(status, current_expires_at)`
/// 索引支撑超时清扫查询。每次数据库操作的耗时记入指标直方图。
pub struct PostgresDispatchChainRepository {
    pool: PgPool,
    metrics: Arc<DispatchMetrics>,
}

const CHAIN_COLUMNS: &str = "id, order_id, order_context, lane_id, status, current_attempt_index, \
     attempts, max_attempts, auto_escalate, assigned_carrier_id, assigned_at, escalation, \
     cancel_reason, created_at, updated_at";

impl PostgresDispatchChainRepository {
    pub fn new(pool: PgPool, metrics: Arc<DispatchMetrics>) -> Self {
        Self { pool, metrics }
    }

    fn row_to_chain(row: &sqlx::postgres::PgRow) -> DispatchResult<DispatchChain> {
        let attempts: serde_json::Value = row.try_get("attempts")?;
        let order_context: serde_json::Value = row.try_get("order_context")?;
        let escalation: Option<serde_json::Value> = row.try_get("escalation")?;

        Ok(DispatchChain {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            order: serde_json::from_value(order_context)?,
            lane_id: row.try_get("lane_id")?,
            status: row.try_get("status")?,
            current_attempt_index: row.try_get("current_attempt_index")?,
            attempts: serde_json::from_value(attempts)?,
            max_attempts: row.try_get("max_attempts")?,
            auto_escalate: row.try_get("auto_escalate")?,
            assigned_carrier_id: row.try_get("assigned_carrier_id")?,
            assigned_at: row.try_get("assigned_at")?,
            escalation: escalation.map(serde_json::from_value).transpose()?,
            cancel_reason: row.try_get("cancel_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl DispatchChainRepository for PostgresDispatchChainRepository {
    #[instrument(skip(self, chain), fields(order_id = %chain.order_id, attempts = chain.attempts.len()))]
    async fn create(&self, chain: &DispatchChain) -> DispatchResult<DispatchChain> {
        let attempts = serde_json::to_value(&chain.attempts)?;
        let order_context = serde_json::to_value(&chain.order)?;
        let escalation = chain
            .escalation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let started = Instant::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO dispatch_chains
                (order_id, order_context, lane_id, status, current_attempt_index, attempts,
                 max_attempts, auto_escalate, assigned_carrier_id, assigned_at, escalation,
                 cancel_reason, current_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {CHAIN_COLUMNS}
            "#
        ))
        .bind(&chain.order_id)
        .bind(&order_context)
        .bind(chain.lane_id)
        .bind(chain.status)
        .bind(chain.current_attempt_index)
        .bind(&attempts)
        .bind(chain.max_attempts)
        .bind(chain.auto_escalate)
        .bind(&chain.assigned_carrier_id)
        .bind(chain.assigned_at)
        .bind(&escalation)
        .bind(&chain.cancel_reason)
        .bind(chain.current_expires_at())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DispatchError::ChainAlreadyExists {
                    order_id: chain.order_id.clone(),
                }
            }
            _ => DispatchError::from(e),
        })?;
        self.metrics
            .record_database_operation(started.elapsed().as_secs_f64());

        let created = Self::row_to_chain(&row)?;
        debug!(
            "创建派单链成功: order_id={}, id={}, {} 个轮次",
            created.order_id,
            created.id,
            created.attempts.len()
        );
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> DispatchResult<Option<DispatchChain>> {
        let started = Instant::now();
        let row = sqlx::query(&format!(
            "SELECT {CHAIN_COLUMNS} FROM dispatch_chains WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.metrics
            .record_database_operation(started.elapsed().as_secs_f64());

        row.as_ref().map(Self::row_to_chain).transpose()
    }

    #[instrument(skip(self))]
    async fn get_by_order_id(&self, order_id: &str) -> DispatchResult<Option<DispatchChain>> {
        let started = Instant::now();
        let row = sqlx::query(&format!(
            "SELECT {CHAIN_COLUMNS} FROM dispatch_chains WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        self.metrics
            .record_database_operation(started.elapsed().as_secs_f64());

        row.as_ref().map(Self::row_to_chain).transpose()
    }

    #[instrument(skip(self), fields(limit = limit))]
    async fn find_expired_in_progress(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> DispatchResult<Vec<DispatchChain>> {
        if limit <= 0 || limit > 10000 {
            return Err(DispatchError::database_error(format!(
                "无效的limit值: {limit}"
            )));
        }

        let started = Instant::now();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CHAIN_COLUMNS} FROM dispatch_chains
            WHERE status = $1 AND current_expires_at IS NOT NULL AND current_expires_at <= $2
            ORDER BY current_expires_at ASC
            LIMIT $3
            "#
        ))
        .bind(ChainStatus::InProgress)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        self.metrics
            .record_database_operation(started.elapsed().as_secs_f64());

        let chains: DispatchResult<Vec<DispatchChain>> =
            rows.iter().map(Self::row_to_chain).collect();

        let result = chains?;
        debug!("查询到 {} 条超时派单链", result.len());
        Ok(result)
    }

    #[instrument(skip(self, chain), fields(
        order_id = %chain.order_id,
        expected_status = ?expected_status,
        expected_index = expected_index,
    ))]
    async fn commit_transition(
        &self,
        chain: &DispatchChain,
        expected_status: ChainStatus,
        expected_index: i32,
    ) -> DispatchResult<bool> {
        let attempts = serde_json::to_value(&chain.attempts)?;
        let escalation = chain
            .escalation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let started = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE dispatch_chains
            SET status = $1, current_attempt_index = $2, attempts = $3,
                assigned_carrier_id = $4, assigned_at = $5, escalation = $6,
                cancel_reason = $7, current_expires_at = $8, updated_at = NOW()
            WHERE order_id = $9 AND status = $10 AND current_attempt_index = $11
            "#,
        )
        .bind(chain.status)
        .bind(chain.current_attempt_index)
        .bind(&attempts)
        .bind(&chain.assigned_carrier_id)
        .bind(chain.assigned_at)
        .bind(&escalation)
        .bind(&chain.cancel_reason)
        .bind(chain.current_expires_at())
        .bind(&chain.order_id)
        .bind(expected_status)
        .bind(expected_index)
        .execute(&self.pool)
        .await?;
        self.metrics
            .record_database_operation(started.elapsed().as_secs_f64());

        let committed = result.rows_affected() > 0;
        if !committed {
            warn!(
                "派单链 {} 的条件提交失败: 期望 ({:?}, {})，文档已被并发修改",
                chain.order_id, expected_status, expected_index
            );
        }
        Ok(committed)
    }
}
