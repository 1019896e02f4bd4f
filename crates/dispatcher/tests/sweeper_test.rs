//! Integration tests for timeout sweeping

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use symphonia_core::{
    config::SweeperConfig,
    models::lane::EndpointMatch,
    models::{AttemptStatus, ChainStatus, EscalationStatus},
};
use symphonia_dispatcher::{ChainEngine, ResolvedLane, TimeoutSweeper};
use symphonia_infrastructure::DispatchMetrics;
use symphonia_testing_utils::{
    LaneBuilder, LaneCarrierBuilder, MockDispatchChainRepository, MockEscalationGateway,
    MockNotificationDispatcher, OrderContextBuilder, TestEnv,
};

struct TestHarness {
    engine: Arc<ChainEngine>,
    chain_repo: Arc<MockDispatchChainRepository>,
    notifier: Arc<MockNotificationDispatcher>,
    gateway: Arc<MockEscalationGateway>,
}

fn harness() -> TestHarness {
    let chain_repo = Arc::new(MockDispatchChainRepository::new());
    let notifier = Arc::new(MockNotificationDispatcher::new());
    let gateway = Arc::new(MockEscalationGateway::new());
    let engine = Arc::new(ChainEngine::new(
        chain_repo.clone(),
        notifier.clone(),
        gateway.clone(),
        Arc::new(DispatchMetrics::new()),
    ));
    TestHarness {
        engine,
        chain_repo,
        notifier,
        gateway,
    }
}

fn sweeper_config(enabled: bool) -> SweeperConfig {
    SweeperConfig {
        enabled,
        sweep_interval_seconds: 1,
        batch_size: 100,
    }
}

/// Start a chain whose carriers all share `delay_minutes` response windows
async fn started_chain(h: &TestHarness, order_id: &str, carrier_count: usize, delay_minutes: i64) {
    let mut builder = LaneBuilder::new("lyon-milan").with_id(1);
    for i in 0..carrier_count {
        builder = builder.with_carrier(
            LaneCarrierBuilder::new(&format!("carrier-{i}"))
                .with_response_delay(delay_minutes)
                .build(),
        );
    }
    let lane = builder.build();
    let resolved = ResolvedLane {
        carriers: lane.active_carriers().into_iter().cloned().collect(),
        lane,
        match_quality: EndpointMatch::PostalPrefix,
    };
    let order = OrderContextBuilder::new(order_id).build();

    h.engine.create_chain(&order, &resolved).await.unwrap();
    h.engine.start(order_id).await.unwrap();
}

#[tokio::test]
async fn test_sweep_advances_expired_quote() {
    let h = harness();
    started_chain(&h, "ORD-1", 3, 120).await;

    let stats = h
        .engine
        .sweep_timeouts(TestEnv::timestamp_with_offset(121 * 60), 100)
        .await
        .unwrap();

    assert_eq!(stats.examined, 1);
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.lost_races, 0);

    let stored = h.chain_repo.stored("ORD-1").unwrap();
    assert_eq!(stored.current_attempt_index, 1);
    assert_eq!(stored.attempts[0].status, AttemptStatus::Timeout);
    assert_eq!(stored.attempts[1].status, AttemptStatus::Sent);
    assert_eq!(h.notifier.sent_count(), 2);
}

#[tokio::test]
async fn test_sweep_ignores_live_quotes() {
    let h = harness();
    started_chain(&h, "ORD-2", 2, 120).await;

    let stats = h
        .engine
        .sweep_timeouts(TestEnv::timestamp_with_offset(30 * 60), 100)
        .await
        .unwrap();

    assert_eq!(stats.examined, 0);
    let stored = h.chain_repo.stored("ORD-2").unwrap();
    assert_eq!(stored.current_attempt_index, 0);
    assert_eq!(h.notifier.sent_count(), 1);
}

#[tokio::test]
async fn test_repeated_sweep_is_noop() {
    let h = harness();
    started_chain(&h, "ORD-3", 3, 120).await;

    let sweep_time = TestEnv::timestamp_with_offset(121 * 60);
    h.engine.sweep_timeouts(sweep_time, 100).await.unwrap();

    // The new current attempt got a fresh window starting at the sweep time
    let stats = h.engine.sweep_timeouts(sweep_time, 100).await.unwrap();
    assert_eq!(stats.examined, 0);

    let stored = h.chain_repo.stored("ORD-3").unwrap();
    assert_eq!(stored.current_attempt_index, 1);
}

#[tokio::test]
async fn test_sweep_escalates_exhausted_chain() {
    let h = harness();
    started_chain(&h, "ORD-4", 1, 120).await;

    let stats = h
        .engine
        .sweep_timeouts(TestEnv::timestamp_with_offset(121 * 60), 100)
        .await
        .unwrap();

    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.escalated, 1);
    assert_eq!(h.gateway.call_count(), 1);

    let stored = h.chain_repo.stored("ORD-4").unwrap();
    assert_eq!(stored.status, ChainStatus::Escalated);
    assert_eq!(
        stored.escalation.unwrap().status,
        EscalationStatus::Submitted
    );
}

#[tokio::test]
async fn test_sweep_respects_batch_size() {
    let h = harness();
    started_chain(&h, "ORD-5", 2, 120).await;
    started_chain(&h, "ORD-6", 2, 120).await;
    started_chain(&h, "ORD-7", 2, 120).await;

    let stats = h
        .engine
        .sweep_timeouts(TestEnv::timestamp_with_offset(121 * 60), 2)
        .await
        .unwrap();

    assert_eq!(stats.examined, 2);
    assert_eq!(stats.timed_out, 2);
}

#[tokio::test]
async fn test_run_once_advances_immediately_expiring_quotes() {
    let h = harness();
    // Zero-minute response window expires the moment it is armed
    started_chain(&h, "ORD-8", 2, 0).await;

    let sweeper = TimeoutSweeper::new(
        h.engine.clone(),
        sweeper_config(true),
        Arc::new(DispatchMetrics::new()),
    );
    let stats = sweeper.run_once().await.unwrap();

    assert_eq!(stats.timed_out, 1);
    let stored = h.chain_repo.stored("ORD-8").unwrap();
    assert_eq!(stored.attempts[0].status, AttemptStatus::Timeout);
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown_signal() {
    let h = harness();
    let sweeper = Arc::new(TimeoutSweeper::new(
        h.engine.clone(),
        sweeper_config(true),
        Arc::new(DispatchMetrics::new()),
    ));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn({
        let sweeper = sweeper.clone();
        async move { sweeper.run(shutdown_rx).await }
    });

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("sweeper did not stop after shutdown signal")
        .unwrap();
}

#[tokio::test]
async fn test_disabled_sweeper_returns_immediately() {
    let h = harness();
    let sweeper = TimeoutSweeper::new(
        h.engine.clone(),
        sweeper_config(false),
        Arc::new(DispatchMetrics::new()),
    );

    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::time::timeout(Duration::from_secs(1), sweeper.run(shutdown_rx))
        .await
        .expect("disabled sweeper should return without ticking");
}
