//! Integration tests for the PostgreSQL repositories
//!
//! These run against a disposable Postgres container and are ignored by
//! default; run with `cargo test -- --ignored` on a machine with Docker.

use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics_exporter_prometheus::PrometheusBuilder;

use symphonia_core::{
    models::ChainStatus,
    traits::{DispatchChainRepository, LaneRepository},
    DispatchError,
};
use symphonia_infrastructure::database::postgres::{
    PostgresDispatchChainRepository, PostgresLaneRepository,
};
use symphonia_infrastructure::DispatchMetrics;
use symphonia_testing_utils::{pending_chain, DatabaseTestContainer, LaneBuilder, TestEnv};

async fn setup() -> DatabaseTestContainer {
    let container = DatabaseTestContainer::new()
        .await
        .expect("Failed to start Postgres container");
    container
        .run_migrations()
        .await
        .expect("Failed to run migrations");
    container
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn test_chain_roundtrip_and_unique_order_id() {
    let container = setup().await;
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let metrics = Arc::new(metrics::with_local_recorder(&recorder, DispatchMetrics::new));
    let repo = PostgresDispatchChainRepository::new(container.pool.clone(), metrics);

    let order_id = TestEnv::unique_name("ORD");
    let chain = pending_chain(&order_id, 3, true);
    let created = repo.create(&chain).await.unwrap();
    assert!(created.id > 0);

    let loaded = repo.get_by_order_id(&order_id).await.unwrap().unwrap();
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.status, ChainStatus::Pending);
    assert_eq!(loaded.attempts.len(), 3);
    assert_eq!(loaded.order.order_id, order_id);
    assert_eq!(loaded.attempts[1].carrier_id, "carrier-1");

    // One chain per order
    let result = repo.create(&chain).await;
    assert!(matches!(
        result,
        Err(DispatchError::ChainAlreadyExists { .. })
    ));

    // Every repository call lands in the database-operation histogram
    assert!(handle
        .render()
        .contains("symphonia_dispatch_database_operation_duration_seconds"));
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn test_commit_transition_enforces_preconditions() {
    let container = setup().await;
    let repo = PostgresDispatchChainRepository::new(
        container.pool.clone(),
        Arc::new(DispatchMetrics::new()),
    );

    let mut chain = repo
        .create(&pending_chain("ORD-101", 2, true))
        .await
        .unwrap();
    chain.start_at(Utc::now()).unwrap();

    // First commit against the stored (Pending, 0) succeeds
    assert!(repo
        .commit_transition(&chain, ChainStatus::Pending, 0)
        .await
        .unwrap());

    // Replaying the same expected state loses
    assert!(!repo
        .commit_transition(&chain, ChainStatus::Pending, 0)
        .await
        .unwrap());

    let stored = repo.get_by_order_id("ORD-101").await.unwrap().unwrap();
    assert_eq!(stored.status, ChainStatus::InProgress);
    assert!(stored.current_expires_at().is_some());
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn test_find_expired_in_progress_orders_by_deadline() {
    let container = setup().await;
    let repo = PostgresDispatchChainRepository::new(
        container.pool.clone(),
        Arc::new(DispatchMetrics::new()),
    );

    let t0 = Utc::now();
    // Later deadline inserted first to verify ordering
    for (order_id, started_at) in [("ORD-102", t0), ("ORD-103", t0 - Duration::minutes(30))] {
        let mut chain = repo
            .create(&pending_chain(order_id, 2, true))
            .await
            .unwrap();
        chain.start_at(started_at).unwrap();
        assert!(repo
            .commit_transition(&chain, ChainStatus::Pending, 0)
            .await
            .unwrap());
    }

    let expired = repo
        .find_expired_in_progress(t0 + Duration::minutes(121), 10)
        .await
        .unwrap();
    assert_eq!(expired.len(), 2);
    assert_eq!(expired[0].order_id, "ORD-103");
    assert_eq!(expired[1].order_id, "ORD-102");

    // Only the earlier deadline has passed at t0 + 100
    let expired = repo
        .find_expired_in_progress(t0 + Duration::minutes(100), 10)
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].order_id, "ORD-103");

    // Completed chains never show up in the sweep query
    let mut chain = repo.get_by_order_id("ORD-103").await.unwrap().unwrap();
    let expected_index = chain.current_attempt_index;
    chain
        .accept_current("carrier-0", None, t0 + Duration::minutes(5))
        .unwrap();
    assert!(repo
        .commit_transition(&chain, ChainStatus::InProgress, expected_index)
        .await
        .unwrap());

    let expired = repo
        .find_expired_in_progress(t0 + Duration::minutes(121), 10)
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].order_id, "ORD-102");
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn test_lane_roundtrip_and_active_filter() {
    let container = setup().await;
    let repo =
        PostgresLaneRepository::new(container.pool.clone(), Arc::new(DispatchMetrics::new()));

    let lane_name = TestEnv::unique_name("lyon-milan");
    let active = repo
        .create(&LaneBuilder::new(&lane_name).with_default_carriers(2).build())
        .await
        .unwrap();
    repo.create(
        &LaneBuilder::new("paused-lane")
            .with_default_carriers(1)
            .inactive()
            .build(),
    )
    .await
    .unwrap();

    let loaded = repo.get_by_id(active.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, lane_name);
    assert_eq!(loaded.carriers.len(), 2);

    let lanes = repo.find_active().await.unwrap();
    assert_eq!(lanes.len(), 1);
    assert_eq!(lanes[0].name, lane_name);
}
