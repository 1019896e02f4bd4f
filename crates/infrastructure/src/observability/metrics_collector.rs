//! 派单服务指标收集
//!
//! 基于 metrics crate 的计数器/直方图，Prometheus 导出器由组合根按配置安装。

use anyhow::Result;
use metrics::{counter, histogram, Counter, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct DispatchMetrics {
    chains_created_total: Counter,
    chains_started_total: Counter,
    chains_completed_total: Counter,
    chains_escalated_total: Counter,
    chains_cancelled_total: Counter,
    attempts_refused_total: Counter,
    attempts_timed_out_total: Counter,
    attempts_skipped_total: Counter,
    notification_failures_total: Counter,
    escalation_failures_total: Counter,
    precondition_losses_total: Counter,
    sweep_duration: Histogram,
    database_operation_duration: Histogram,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self {
            chains_created_total: counter!("symphonia_dispatch_chains_created_total"),
            chains_started_total: counter!("symphonia_dispatch_chains_started_total"),
            chains_completed_total: counter!("symphonia_dispatch_chains_completed_total"),
            chains_escalated_total: counter!("symphonia_dispatch_chains_escalated_total"),
            chains_cancelled_total: counter!("symphonia_dispatch_chains_cancelled_total"),
            attempts_refused_total: counter!("symphonia_dispatch_attempts_refused_total"),
            attempts_timed_out_total: counter!("symphonia_dispatch_attempts_timed_out_total"),
            attempts_skipped_total: counter!("symphonia_dispatch_attempts_skipped_total"),
            notification_failures_total: counter!("symphonia_dispatch_notification_failures_total"),
            escalation_failures_total: counter!("symphonia_dispatch_escalation_failures_total"),
            precondition_losses_total: counter!("symphonia_dispatch_precondition_losses_total"),
            sweep_duration: histogram!("symphonia_dispatch_sweep_duration_seconds"),
            database_operation_duration: histogram!(
                "symphonia_dispatch_database_operation_duration_seconds"
            ),
        }
    }

    /// 安装全局Prometheus记录器，返回可供抓取端点使用的句柄
    pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(handle)
    }

    pub fn record_chain_created(&self) {
        self.chains_created_total.increment(1);
    }

    pub fn record_chain_started(&self) {
        self.chains_started_total.increment(1);
    }

    pub fn record_chain_completed(&self) {
        self.chains_completed_total.increment(1);
    }

    pub fn record_chain_escalated(&self) {
        self.chains_escalated_total.increment(1);
    }

    pub fn record_chain_cancelled(&self) {
        self.chains_cancelled_total.increment(1);
    }

    pub fn record_attempt_refused(&self) {
        self.attempts_refused_total.increment(1);
    }

    pub fn record_attempt_timed_out(&self) {
        self.attempts_timed_out_total.increment(1);
    }

    pub fn record_attempt_skipped(&self) {
        self.attempts_skipped_total.increment(1);
    }

    pub fn record_notification_failure(&self) {
        self.notification_failures_total.increment(1);
    }

    pub fn record_escalation_failure(&self) {
        self.escalation_failures_total.increment(1);
    }

    pub fn record_precondition_loss(&self) {
        self.precondition_losses_total.increment(1);
    }

    pub fn record_sweep_duration(&self, seconds: f64) {
        self.sweep_duration.record(seconds);
    }

    pub fn record_database_operation(&self, seconds: f64) {
        self.database_operation_duration.record(seconds);
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
