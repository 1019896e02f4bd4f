use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use symphonia_core::{models::Lane, traits::LaneRepository, DispatchResult};

use crate::observability::DispatchMetrics;

/// 线路配置的PostgreSQL仓储，端点/承运商/派单配置以JSONB存储
pub struct PostgresLaneRepository {
    pool: PgPool,
    metrics: Arc<DispatchMetrics>,
}

const LANE_COLUMNS: &str =
    "id, name, origin, destination, carriers, dispatch_config, is_active, created_at, updated_at";

impl PostgresLaneRepository {
    pub fn new(pool: PgPool, metrics: Arc<DispatchMetrics>) -> Self {
        Self { pool, metrics }
    }

    fn row_to_lane(row: &sqlx::postgres::PgRow) -> DispatchResult<Lane> {
        let origin: serde_json::Value = row.try_get("origin")?;
        let destination: serde_json::Value = row.try_get("destination")?;
        let carriers: serde_json::Value = row.try_get("carriers")?;
        let dispatch_config: serde_json::Value = row.try_get("dispatch_config")?;

        Ok(Lane {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            origin: serde_json::from_value(origin)?,
            destination: serde_json::from_value(destination)?,
            carriers: serde_json::from_value(carriers)?,
            dispatch_config: serde_json::from_value(dispatch_config)?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl LaneRepository for PostgresLaneRepository {
    #[instrument(skip(self, lane), fields(lane_name = %lane.name))]
    async fn create(&self, lane: &Lane) -> DispatchResult<Lane> {
        lane.validate()?;

        let started = Instant::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO lanes (name, origin, destination, carriers, dispatch_config, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {LANE_COLUMNS}
            "#
        ))
        .bind(&lane.name)
        .bind(serde_json::to_value(&lane.origin)?)
        .bind(serde_json::to_value(&lane.destination)?)
        .bind(serde_json::to_value(&lane.carriers)?)
        .bind(serde_json::to_value(&lane.dispatch_config)?)
        .bind(lane.is_active)
        .fetch_one(&self.pool)
        .await?;
        self.metrics
            .record_database_operation(started.elapsed().as_secs_f64());

        let created = Self::row_to_lane(&row)?;
        debug!("创建线路成功: {} (id={})", created.name, created.id);
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> DispatchResult<Option<Lane>> {
        let started = Instant::now();
        let row = sqlx::query(&format!("SELECT {LANE_COLUMNS} FROM lanes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        self.metrics
            .record_database_operation(started.elapsed().as_secs_f64());

        row.as_ref().map(Self::row_to_lane).transpose()
    }

    #[instrument(skip(self))]
    async fn find_active(&self) -> DispatchResult<Vec<Lane>> {
        let started = Instant::now();
        let rows = sqlx::query(&format!(
            "SELECT {LANE_COLUMNS} FROM lanes WHERE is_active = TRUE ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        self.metrics
            .record_database_operation(started.elapsed().as_secs_f64());

        let lanes: DispatchResult<Vec<Lane>> = rows.iter().map(Self::row_to_lane).collect();
        let result = lanes?;
        debug!("查询到 {} 条启用线路", result.len());
        Ok(result)
    }
}
