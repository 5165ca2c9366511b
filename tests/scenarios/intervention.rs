//! Test: manual intervention parking and operator resolutions

use crate::helpers::*;
use flowstate::store::ExecutionStore;
use flowstate::core::Status;
use flowstate::execution::{FailureStrategy, InterventionAction, StepParameters};
use std::sync::Arc;

fn intervention_params() -> StepParameters {
    StepParameters {
        failure_strategy: FailureStrategy::ManualIntervention,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_broken_node_parks_for_intervention() {
    let h = harness(vec![Arc::new(FlakyStep::new(1))]);
    let ctx = context("flaky");

    let status = h
        .driver
        .start_node(ctx.clone(), intervention_params(), &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::InterventionWaiting);

    // The failure that caused the parking stays visible to the operator
    let record = h.store.get_node(ctx.runtime_id).await.unwrap();
    assert!(record.failure.is_some());
}

#[tokio::test]
async fn test_retry_reruns_the_step() {
    let h = harness(vec![Arc::new(FlakyStep::new(1))]);
    let ctx = context("flaky");

    h.driver
        .start_node(ctx.clone(), intervention_params(), &actor())
        .await
        .unwrap();

    let status = h
        .driver
        .resolve_intervention(ctx.runtime_id, InterventionAction::Retry, &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::Succeeded);
}

#[tokio::test]
async fn test_persistent_failure_parks_again_after_retry() {
    let h = harness(vec![Arc::new(FlakyStep::new(5))]);
    let ctx = context("flaky");

    h.driver
        .start_node(ctx.clone(), intervention_params(), &actor())
        .await
        .unwrap();

    let status = h
        .driver
        .resolve_intervention(ctx.runtime_id, InterventionAction::Retry, &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::InterventionWaiting);
}

#[tokio::test]
async fn test_abort_resolution() {
    let h = harness(vec![Arc::new(FlakyStep::new(1))]);
    let ctx = context("flaky");

    h.driver
        .start_node(ctx.clone(), intervention_params(), &actor())
        .await
        .unwrap();

    let status = h
        .driver
        .resolve_intervention(ctx.runtime_id, InterventionAction::Abort, &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::Aborted);
}

#[tokio::test]
async fn test_ignore_resolution_suspends() {
    let h = harness(vec![Arc::new(FlakyStep::new(1))]);
    let ctx = context("flaky");

    h.driver
        .start_node(ctx.clone(), intervention_params(), &actor())
        .await
        .unwrap();

    let status = h
        .driver
        .resolve_intervention(ctx.runtime_id, InterventionAction::Ignore, &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::Suspended);
}

#[tokio::test]
async fn test_resolution_requires_parked_node() {
    let h = harness(vec![Arc::new(EchoStep)]);
    let ctx = context("echo");

    h.driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();

    let err = h
        .driver
        .resolve_intervention(ctx.runtime_id, InterventionAction::Retry, &actor())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not awaiting intervention"));
}

#[tokio::test]
async fn test_default_strategy_commits_the_failure() {
    let h = harness(vec![Arc::new(FlakyStep::new(1))]);
    let ctx = context("flaky");

    let status = h
        .driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::Failed);
}
