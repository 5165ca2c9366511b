//! Test: aborting a waiting node and discarding what arrives afterwards

use crate::helpers::*;
use flowstate::store::ExecutionStore;
use flowstate::core::Status;
use flowstate::dispatch::TaskResponse;
use flowstate::execution::{StepExecutable, StepParameters};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn test_abort_waiting_node() {
    let step = Arc::new(RemoteFetchStep::new(1));
    let aborted = step.aborted.clone();
    let h = harness(vec![step as Arc<dyn StepExecutable>]);
    let ctx = context("remote_fetch");

    h.driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();

    let status = h.driver.abort_node(ctx.runtime_id).await.unwrap();
    assert_eq!(status, Status::Aborted);

    // The step got its chance to release resources
    assert!(aborted.load(Ordering::SeqCst));

    let record = h.store.get_node(ctx.runtime_id).await.unwrap();
    assert_eq!(record.status, Status::Aborted);
    // Aborted is neutral; no failure judgment is recorded
    assert!(record.failure.is_none());
}

#[tokio::test]
async fn test_response_after_abort_is_discarded() {
    let h = harness(vec![Arc::new(RemoteFetchStep::new(1))]);
    let ctx = context("remote_fetch");

    h.driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();
    let id = h.remote.issued_ids().await[0];

    h.driver.abort_node(ctx.runtime_id).await.unwrap();

    let settled = h
        .driver
        .deliver_response(id, TaskResponse::success(json!(1)), &actor())
        .await
        .unwrap();
    assert_eq!(settled, None);
    assert_eq!(
        h.store.get_node(ctx.runtime_id).await.unwrap().status,
        Status::Aborted
    );
}

#[tokio::test]
async fn test_abort_final_node_is_illegal() {
    let h = harness(vec![Arc::new(EchoStep)]);
    let ctx = context("echo");

    let status = h
        .driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::Succeeded);

    // A settled node cannot start discontinuing
    assert!(h.driver.abort_node(ctx.runtime_id).await.is_err());
}
