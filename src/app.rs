use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::info;

use symphonia_core::config::AppConfig;
use symphonia_dispatcher::{ChainEngine, TimeoutSweeper};
use symphonia_infrastructure::{
    database::postgres::PostgresDispatchChainRepository,
    gateways::{LoggingNotificationDispatcher, ManualReviewEscalationGateway},
    DispatchMetrics,
};

/// 应用运行模式
#[derive(Debug, Clone)]
pub enum AppMode {
    /// 运行周期超时清扫器
    Sweeper,
    /// 执行一轮清扫后退出
    Once,
}

/// 主应用程序：装配仓储、引擎与清扫器
pub struct Application {
    mode: AppMode,
    sweeper: Arc<TimeoutSweeper>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化派单服务，模式: {:?}", mode);

        let db_pool = create_database_pool(&config).await?;

        // 指标句柄在构造时绑定当时的全局记录器，记录器必须先安装
        if config.observability.metrics_enabled {
            let _handle = DispatchMetrics::install_prometheus_recorder()
                .context("安装Prometheus记录器失败")?;
            info!("Prometheus指标记录器已安装");
        }
        let metrics = Arc::new(DispatchMetrics::new());

        let chain_repo = Arc::new(PostgresDispatchChainRepository::new(
            db_pool.clone(),
            metrics.clone(),
        ));
        let notifier = Arc::new(LoggingNotificationDispatcher::new());
        let escalation_gateway = Arc::new(ManualReviewEscalationGateway::new());

        let engine = Arc::new(ChainEngine::new(
            chain_repo,
            notifier,
            escalation_gateway,
            metrics.clone(),
        ));

        let sweeper = Arc::new(TimeoutSweeper::new(
            engine,
            config.sweeper.clone(),
            metrics,
        ));

        Ok(Self { mode, sweeper })
    }

    /// 运行应用程序直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        match self.mode {
            AppMode::Sweeper => {
                self.sweeper.run(shutdown_rx).await;
            }
            AppMode::Once => {
                let stats = self.sweeper.run_once().await?;
                info!(
                    "单轮清扫完成: 检查 {} 条，推进 {} 条，升级 {} 条",
                    stats.examined, stats.timed_out, stats.escalated
                );
            }
        }

        info!("派单服务已停止");
        Ok(())
    }
}

/// 创建数据库连接池
async fn create_database_pool(config: &AppConfig) -> Result<PgPool> {
    info!(
        "连接数据库，连接池大小 {}-{}",
        config.database.min_connections, config.database.max_connections
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(
            config.database.connection_timeout_seconds,
        ))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_seconds))
        .connect(&config.database.url)
        .await
        .context("数据库连接失败")?;

    Ok(pool)
}
