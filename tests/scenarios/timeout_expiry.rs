//! Test: dispatched work that never answers expires deterministically

use crate::helpers::*;
use flowstate::store::ExecutionStore;
use chrono::{Duration, Utc};
use flowstate::core::{FailureType, Status};
use flowstate::dispatch::TaskResponse;
use flowstate::execution::StepParameters;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_sweep_expires_overdue_dispatch() {
    let h = harness(vec![Arc::new(RemoteFetchStep::new(1))]);
    let ctx = context("remote_fetch");

    let params = StepParameters {
        timeout_secs: Some(30),
        ..Default::default()
    };
    h.driver
        .start_node(ctx.clone(), params, &actor())
        .await
        .unwrap();

    // Before the deadline nothing expires
    let settled = h.driver.sweep(Utc::now(), &actor()).await.unwrap();
    assert!(settled.is_empty());
    assert_eq!(
        h.store.get_node(ctx.runtime_id).await.unwrap().status,
        Status::TaskWaiting
    );

    let settled = h
        .driver
        .sweep(Utc::now() + Duration::seconds(60), &actor())
        .await
        .unwrap();
    assert_eq!(settled, vec![Status::Expired]);

    let record = h.store.get_node(ctx.runtime_id).await.unwrap();
    assert_eq!(record.status, Status::Expired);
    assert_eq!(
        record.failure.unwrap().primary().failure_type,
        FailureType::Timeout
    );
}

#[tokio::test]
async fn test_response_after_expiry_is_discarded() {
    let h = harness(vec![Arc::new(RemoteFetchStep::new(1))]);
    let ctx = context("remote_fetch");

    let params = StepParameters {
        timeout_secs: Some(30),
        ..Default::default()
    };
    h.driver
        .start_node(ctx.clone(), params, &actor())
        .await
        .unwrap();
    let id = h.remote.issued_ids().await[0];

    h.driver
        .sweep(Utc::now() + Duration::seconds(60), &actor())
        .await
        .unwrap();

    // The late answer finds no correlation entry and changes nothing
    let settled = h
        .driver
        .deliver_response(id, TaskResponse::success(json!(1)), &actor())
        .await
        .unwrap();
    assert_eq!(settled, None);
    assert_eq!(
        h.store.get_node(ctx.runtime_id).await.unwrap().status,
        Status::Expired
    );
}

#[tokio::test]
async fn test_one_overdue_shard_expires_whole_dispatch() {
    let h = harness(vec![Arc::new(RemoteFetchStep::new(2))]);
    let ctx = context("remote_fetch");

    let params = StepParameters {
        timeout_secs: Some(30),
        ..Default::default()
    };
    h.driver
        .start_node(ctx.clone(), params, &actor())
        .await
        .unwrap();
    let ids = h.remote.issued_ids().await;

    // One shard answers, the other never does
    h.driver
        .deliver_response(ids[0], TaskResponse::success(json!(1)), &actor())
        .await
        .unwrap();

    let settled = h
        .driver
        .sweep(Utc::now() + Duration::seconds(60), &actor())
        .await
        .unwrap();
    assert_eq!(settled, vec![Status::Expired]);
}
