//! Test: missing access is a terminal status, not an escaping error

use crate::helpers::*;
use flowstate::store::ExecutionStore;
use flowstate::access::DenyAll;
use flowstate::core::{FailureType, Status};
use flowstate::execution::StepParameters;
use flowstate::policy::FreezeConfig;
use std::sync::Arc;

#[tokio::test]
async fn test_denied_access_commits_failed_authorization() {
    let h = harness_with(
        vec![Arc::new(GuardedStep)],
        FreezeConfig::default(),
        Arc::new(DenyAll),
    );
    let ctx = context("guarded");

    let status = h
        .driver
        .start_node(ctx.clone(), StepParameters::default(), &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::Failed);

    let record = h.store.get_node(ctx.runtime_id).await.unwrap();
    let failure = record.failure.expect("denied access carries failure info");
    assert_eq!(failure.primary().failure_type, FailureType::Authorization);
    assert_eq!(failure.primary().code, "ACCESS_DENIED");
}

#[tokio::test]
async fn test_granted_access_runs_the_step() {
    let h = harness(vec![Arc::new(GuardedStep)]);
    let ctx = context("guarded");

    let status = h
        .driver
        .start_node(ctx, StepParameters::default(), &actor())
        .await
        .unwrap();
    assert_eq!(status, Status::Succeeded);
}

#[tokio::test]
async fn test_unknown_step_type_is_an_engine_error() {
    let h = harness(vec![]);
    let err = h
        .driver
        .start_node(context("missing"), StepParameters::default(), &actor())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing"));
}
