//! Test: remote dispatch, fan-out barrier and response handling

use crate::helpers::*;
use flowstate::store::ExecutionStore;
use flowstate::core::Status;
use flowstate::dispatch::TaskResponse;
use flowstate::execution::StepParameters;
use flowstate::policy::FREEZE_OUTCOME_NAME;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_dispatch_then_success_response() {
    let h = harness(vec![Arc::new(RemoteFetchStep::new(1))]);
    let ctx = context("remote_fetch");

    let status = h
        .driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::TaskWaiting);
    assert_eq!(h.remote.submitted_payloads().await.len(), 1);

    let id = h.remote.issued_ids().await[0];
    let settled = h
        .driver
        .deliver_response(id, TaskResponse::success(json!({"bytes": 42})), &actor())
        .await
        .unwrap();
    assert_eq!(settled, Some(Status::Succeeded));

    let record = h.store.get_node(ctx.runtime_id).await.unwrap();
    assert_eq!(record.status, Status::Succeeded);
    assert!(record.failure.is_none());

    // The outcome published by handle_response is resolvable downstream
    let outcome = h
        .outcomes
        .resolve(ctx.execution_id, None, "fetched")
        .await
        .unwrap();
    assert_eq!(outcome.value["responses"], 1);
}

#[tokio::test]
async fn test_barrier_waits_for_every_shard() {
    let h = harness(vec![Arc::new(RemoteFetchStep::new(3))]);
    let ctx = context("remote_fetch");

    h.driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();
    let ids = h.remote.issued_ids().await;
    assert_eq!(ids.len(), 3);

    for &id in &ids[..2] {
        let settled = h
            .driver
            .deliver_response(id, TaskResponse::success(json!(null)), &actor())
            .await
            .unwrap();
        assert_eq!(settled, None);
        // The node stays suspended until the barrier completes
        assert_eq!(
            h.store.get_node(ctx.runtime_id).await.unwrap().status,
            Status::TaskWaiting
        );
    }

    let settled = h
        .driver
        .deliver_response(ids[2], TaskResponse::success(json!(null)), &actor())
        .await
        .unwrap();
    assert_eq!(settled, Some(Status::Succeeded));
}

#[tokio::test]
async fn test_remote_failure_response_breaks_node() {
    let h = harness(vec![Arc::new(RemoteFetchStep::new(1))]);
    let ctx = context("remote_fetch");

    h.driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();
    let id = h.remote.issued_ids().await[0];

    let settled = h
        .driver
        .deliver_response(id, TaskResponse::failure("OOM", "container killed"), &actor())
        .await
        .unwrap();
    assert_eq!(settled, Some(Status::Failed));

    let record = h.store.get_node(ctx.runtime_id).await.unwrap();
    let failure = record.failure.expect("broken status carries failure info");
    assert_eq!(failure.primary().code, "OOM");
}

#[tokio::test]
async fn test_duplicate_response_is_discarded() {
    let h = harness(vec![Arc::new(RemoteFetchStep::new(1))]);
    let ctx = context("remote_fetch");

    h.driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();
    let id = h.remote.issued_ids().await[0];

    h.driver
        .deliver_response(id, TaskResponse::success(json!(1)), &actor())
        .await
        .unwrap();

    // Second delivery of the same correlation id is a no-op
    let settled = h
        .driver
        .deliver_response(id, TaskResponse::failure("X", "late duplicate"), &actor())
        .await
        .unwrap();
    assert_eq!(settled, None);
    assert_eq!(
        h.store.get_node(ctx.runtime_id).await.unwrap().status,
        Status::Succeeded
    );
}

#[tokio::test]
async fn test_no_freeze_outcome_on_clear_path() {
    let h = harness(vec![Arc::new(EchoStep)]);
    let ctx = context("echo");

    let status = h
        .driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::Succeeded);
    assert!(h
        .outcomes
        .resolve_optional(ctx.execution_id, None, FREEZE_OUTCOME_NAME)
        .await
        .is_none());
}
