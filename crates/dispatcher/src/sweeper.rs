use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info};

use symphonia_core::config::SweeperConfig;
use symphonia_core::DispatchResult;
use symphonia_infrastructure::DispatchMetrics;

use crate::engine::{ChainEngine, SweepStats};

/// 超时清扫器
///
/// 周期性扫描当前轮次已过响应截止时间的派单链并推进。假定单实例部署；
/// 多实例并发时由引擎的条件提交保证不会重复推进，重复清扫是无操作。
pub struct TimeoutSweeper {
    engine: Arc<ChainEngine>,
    config: SweeperConfig,
    metrics: Arc<DispatchMetrics>,
}

impl TimeoutSweeper {
    pub fn new(
        engine: Arc<ChainEngine>,
        config: SweeperConfig,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        Self {
            engine,
            config,
            metrics,
        }
    }

    /// 执行一轮清扫
    pub async fn run_once(&self) -> DispatchResult<SweepStats> {
        let start = std::time::Instant::now();
        let stats = self
            .engine
            .sweep_timeouts(Utc::now(), self.config.batch_size)
            .await?;
        self.metrics.record_sweep_duration(start.elapsed().as_secs_f64());
        Ok(stats)
    }

    /// 周期清扫循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        if !self.config.enabled {
            info!("超时清扫器未启用");
            return;
        }

        info!(
            "超时清扫器启动，间隔 {} 秒，单轮上限 {} 条",
            self.config.sweep_interval_seconds, self.config.batch_size
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("超时清扫器收到关闭信号，退出");
                    break;
                }
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(stats) if stats.examined > 0 => {
                            info!(
                                "清扫轮次结束: 检查 {} 条，推进 {} 条",
                                stats.examined, stats.timed_out
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("清扫轮次失败: {}", e);
                        }
                    }
                }
            }
        }
    }
}
