//! Node driver - orchestrates one node attempt through its status lifecycle
//!
//! The driver owns every status write a node goes through: it creates the
//! record, runs the access check, invokes the step, routes dispatched work
//! through the correlator, applies the freeze gate before committing success,
//! and translates expected failures into terminal statuses. Step errors never
//! escape; the errors this module returns are engine faults (unknown step
//! type, storage failure), not step failures.

use crate::access::{AccessChecker, Principal};
use crate::core::{
    FailureInfo, FailureType, NodeContext, OutcomeError, OutcomeStore, Status,
};
use crate::dispatch::{
    DispatchError, ResolveOutcome, TaskCorrelator, TaskResolution, TaskResponse,
};
use crate::execution::registry::StepRegistry;
use crate::execution::step::{
    FailureStrategy, StepExecutable, StepExecution, StepParameters, StepResult,
};
use crate::execution::translate::{response_failure_entry, timeout_failure, translate_error};
use crate::policy::{FreezeDecision, FreezeEvaluator, FreezeScope, FREEZE_OUTCOME_NAME};
use crate::store::{ExecutionStore, NodeRecord, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Engine faults; step failures are translated into statuses instead
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no step executable registered for type '{0}'")]
    UnknownStepType(String),

    #[error("node {runtime_id} is {status}, not awaiting intervention")]
    NotAwaitingIntervention { runtime_id: Uuid, status: Status },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Outcome(#[from] OutcomeError),
}

/// Operator decision for a node parked in intervention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionAction {
    /// Re-run the step in place
    Retry,
    /// Give up on the node
    Abort,
    /// Set the failure aside without a judgment
    Ignore,
}

/// Drives node attempts through execution, response handling and finalization
pub struct NodeDriver {
    store: Arc<dyn ExecutionStore>,
    registry: Arc<StepRegistry>,
    correlator: Arc<TaskCorrelator>,
    freeze: Arc<FreezeEvaluator>,
    access: Arc<dyn AccessChecker>,
    outcomes: Arc<OutcomeStore>,
}

impl NodeDriver {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        registry: Arc<StepRegistry>,
        correlator: Arc<TaskCorrelator>,
        freeze: Arc<FreezeEvaluator>,
        access: Arc<dyn AccessChecker>,
        outcomes: Arc<OutcomeStore>,
    ) -> Self {
        Self {
            store,
            registry,
            correlator,
            freeze,
            access,
            outcomes,
        }
    }

    /// Shared outcome store, for hosts resolving published outcomes
    pub fn outcome_store(&self) -> &OutcomeStore {
        &self.outcomes
    }

    /// Create and run a node attempt; returns the status it settled in
    /// (terminal, or a waiting status when work was dispatched).
    pub async fn start_node(
        &self,
        ctx: NodeContext,
        params: StepParameters,
        actor: &Principal,
    ) -> Result<Status, EngineError> {
        let step = self
            .registry
            .get(&ctx.step_type)
            .ok_or_else(|| EngineError::UnknownStepType(ctx.step_type.clone()))?;

        self.store
            .create_node(NodeRecord::new(ctx.clone(), params.clone()))
            .await?;
        info!(runtime_id = %ctx.runtime_id, step = %ctx.identifier, "node queued");

        if let Err(err) = step.validate_resources(&ctx, &params, self.access.as_ref()).await {
            // Denied before any side effect; committed as a terminal status
            let (status, failure) = translate_error(&err);
            warn!(runtime_id = %ctx.runtime_id, %status, "resource validation failed");
            self.store
                .transition(ctx.runtime_id, status, Some(failure))
                .await?;
            return Ok(status);
        }

        self.store
            .transition(ctx.runtime_id, Status::Running, None)
            .await?;
        self.run_step(&ctx, &params, step.as_ref(), actor).await
    }

    /// Deliver one remote response. Returns the node's new status when this
    /// delivery completed its barrier, `None` while the barrier is still
    /// open or the delivery was a duplicate.
    pub async fn deliver_response(
        &self,
        correlation_id: Uuid,
        response: TaskResponse,
        actor: &Principal,
    ) -> Result<Option<Status>, EngineError> {
        let outcome = self
            .correlator
            .resolve(correlation_id, TaskResolution::Response(response))
            .await?;
        self.settle_barrier(outcome, actor).await
    }

    /// Expire every dispatch past its deadline; returns the statuses of the
    /// nodes that settled.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        actor: &Principal,
    ) -> Result<Vec<Status>, EngineError> {
        let completed = self.correlator.expire_overdue(now).await?;
        let mut settled = Vec::new();
        for outcome in completed {
            if let Some(status) = self.settle_barrier(outcome, actor).await? {
                settled.push(status);
            }
        }
        Ok(settled)
    }

    /// Abort a node: wind down, discard pending correlation entries, give the
    /// step a chance to release resources, then commit the abort.
    pub async fn abort_node(&self, runtime_id: Uuid) -> Result<Status, EngineError> {
        let record = self.store.get_node(runtime_id).await?;
        self.store
            .transition(runtime_id, Status::Discontinuing, None)
            .await?;

        self.correlator.abandon(runtime_id).await?;

        if let Some(step) = self.registry.get(&record.context.step_type) {
            step.handle_abort(&record.context, &record.parameters).await;
        }

        self.store
            .transition(runtime_id, Status::Aborted, None)
            .await?;
        info!(%runtime_id, step = %record.context.identifier, "node aborted");
        Ok(Status::Aborted)
    }

    /// Apply an operator decision to a node parked in intervention.
    pub async fn resolve_intervention(
        &self,
        runtime_id: Uuid,
        action: InterventionAction,
        actor: &Principal,
    ) -> Result<Status, EngineError> {
        let record = self.store.get_node(runtime_id).await?;
        if record.status != Status::InterventionWaiting {
            return Err(EngineError::NotAwaitingIntervention {
                runtime_id,
                status: record.status,
            });
        }

        info!(%runtime_id, ?action, actor = %actor.id, "intervention resolved");
        match action {
            InterventionAction::Retry => {
                let step = self
                    .registry
                    .get(&record.context.step_type)
                    .ok_or_else(|| {
                        EngineError::UnknownStepType(record.context.step_type.clone())
                    })?;
                self.store
                    .transition(runtime_id, Status::Running, None)
                    .await?;
                self.run_step(&record.context, &record.parameters, step.as_ref(), actor)
                    .await
            }
            InterventionAction::Abort => {
                self.store
                    .transition(runtime_id, Status::Aborted, None)
                    .await?;
                Ok(Status::Aborted)
            }
            InterventionAction::Ignore => {
                self.store
                    .transition(runtime_id, Status::Suspended, None)
                    .await?;
                Ok(Status::Suspended)
            }
        }
    }

    /// Execute a node that is already Running.
    async fn run_step(
        &self,
        ctx: &NodeContext,
        params: &StepParameters,
        step: &dyn StepExecutable,
        actor: &Principal,
    ) -> Result<Status, EngineError> {
        match step.execute(ctx, params, &self.outcomes).await {
            Ok(StepExecution::Sync(result)) => self.finalize(ctx, params, result, actor).await,
            Ok(StepExecution::Dispatch {
                payloads,
                timeout,
                wait_status,
            }) => {
                self.correlator
                    .dispatch(ctx, params, payloads, timeout, wait_status)
                    .await?;
                Ok(wait_status)
            }
            Err(err) => {
                let (status, failure) = translate_error(&err);
                self.commit_broken(ctx, params, status, failure).await
            }
        }
    }

    /// Settle a completed response barrier into a terminal status.
    async fn settle_barrier(
        &self,
        outcome: ResolveOutcome,
        actor: &Principal,
    ) -> Result<Option<Status>, EngineError> {
        let (ctx, params, resolutions) = match outcome {
            ResolveOutcome::Duplicate => return Ok(None),
            ResolveOutcome::Pending { .. } => return Ok(None),
            ResolveOutcome::Complete {
                context,
                parameters,
                resolutions,
            } => (context, parameters, resolutions),
        };

        // An abort resolution means the abort path is already committing the
        // node; nothing to settle here.
        if resolutions
            .values()
            .any(|r| matches!(r, TaskResolution::Aborted))
        {
            return Ok(None);
        }

        if resolutions
            .values()
            .any(|r| matches!(r, TaskResolution::TimedOut))
        {
            let record = self.store.get_node(ctx.runtime_id).await?;
            let timeout = params.timeout(crate::execution::DEFAULT_TASK_TIMEOUT);
            let deadline_failure = timeout_failure(timeout);
            warn!(
                runtime_id = %ctx.runtime_id,
                step = %ctx.identifier,
                from = %record.status,
                "dispatch expired without a full response set"
            );
            self.store
                .transition(ctx.runtime_id, Status::Expired, Some(deadline_failure))
                .await?;
            return Ok(Some(Status::Expired));
        }

        let responses: HashMap<Uuid, TaskResponse> = resolutions
            .into_iter()
            .filter_map(|(id, r)| match r {
                TaskResolution::Response(response) => Some((id, response)),
                _ => None,
            })
            .collect();

        let step = self
            .registry
            .get(&ctx.step_type)
            .ok_or_else(|| EngineError::UnknownStepType(ctx.step_type.clone()))?;

        // The node leaves its waiting status before the step sees the
        // responses; handle_response fires exactly once per dispatch.
        self.store
            .transition(ctx.runtime_id, Status::Running, None)
            .await?;

        let status = match step.handle_response(&ctx, &params, responses).await {
            Ok(result) => self.finalize(&ctx, &params, result, actor).await?,
            Err(err) => {
                let (status, failure) = translate_error(&err);
                self.commit_broken(&ctx, &params, status, failure).await?
            }
        };
        Ok(Some(status))
    }

    /// Commit a step result: enforce the status/failure pairing, gate success
    /// through the freeze evaluator, publish outcomes, apply the failure
    /// strategy to broken results.
    async fn finalize(
        &self,
        ctx: &NodeContext,
        params: &StepParameters,
        result: StepResult,
        actor: &Principal,
    ) -> Result<Status, EngineError> {
        if let Err(err) = result.validate() {
            error!(runtime_id = %ctx.runtime_id, %err, "step returned an inconsistent result");
            let (status, failure) = translate_error(&err);
            return self.commit_broken(ctx, params, status, failure).await;
        }

        if result.status == Status::Succeeded {
            let scope = FreezeScope::for_node(ctx);
            if let FreezeDecision::Blocked(freeze) =
                self.freeze.evaluate(Utc::now(), &scope, actor).await
            {
                let windows: Vec<&str> = freeze
                    .active_windows
                    .iter()
                    .map(|w| w.name.as_str())
                    .collect();
                let failure = FailureInfo::single(
                    FailureType::PolicyBlocked,
                    "FREEZE_ACTIVE",
                    format!("deployment freeze active: {}", windows.join(", ")),
                );

                match serde_json::to_value(&freeze) {
                    Ok(value) => {
                        self.publish_outcome(
                            ctx,
                            crate::core::Outcome::new(FREEZE_OUTCOME_NAME, value),
                        )
                        .await;
                    }
                    Err(err) => {
                        error!(runtime_id = %ctx.runtime_id, %err, "failed to encode freeze outcome")
                    }
                }

                self.store
                    .transition(ctx.runtime_id, Status::FreezeFailed, Some(failure))
                    .await?;
                return Ok(Status::FreezeFailed);
            }

            self.store
                .transition(ctx.runtime_id, Status::Succeeded, None)
                .await?;
            for outcome in result.outcomes {
                self.publish_outcome(ctx, outcome).await;
            }
            info!(runtime_id = %ctx.runtime_id, step = %ctx.identifier, "node succeeded");
            return Ok(Status::Succeeded);
        }

        match result.failure {
            Some(failure) => self.commit_broken(ctx, params, result.status, failure).await,
            // validate() guarantees a non-broken status here (Aborted from
            // handle_response, for example); commit it as-is
            None => {
                self.store
                    .transition(ctx.runtime_id, result.status, None)
                    .await?;
                Ok(result.status)
            }
        }
    }

    /// Commit a broken status, parking for intervention when the strategy
    /// asks for it and the status is eligible.
    async fn commit_broken(
        &self,
        ctx: &NodeContext,
        params: &StepParameters,
        status: Status,
        failure: FailureInfo,
    ) -> Result<Status, EngineError> {
        let intervene = params.failure_strategy == FailureStrategy::ManualIntervention
            && matches!(status, Status::Failed | Status::Errored);

        self.store
            .transition(ctx.runtime_id, status, Some(failure.clone()))
            .await?;
        warn!(
            runtime_id = %ctx.runtime_id,
            step = %ctx.identifier,
            %status,
            failure = %failure.message(),
            "node broke"
        );

        if intervene {
            self.store
                .transition(ctx.runtime_id, Status::InterventionWaiting, Some(failure))
                .await?;
            info!(runtime_id = %ctx.runtime_id, "node parked for manual intervention");
            return Ok(Status::InterventionWaiting);
        }
        Ok(status)
    }

    /// Publish one outcome; a key conflict is logged, not fatal, since the
    /// node's status has already been committed.
    async fn publish_outcome(&self, ctx: &NodeContext, outcome: crate::core::Outcome) {
        let name = outcome.name.clone();
        if let Err(err) = self
            .outcomes
            .publish(ctx.execution_id, ctx.group.as_deref(), outcome)
            .await
        {
            warn!(runtime_id = %ctx.runtime_id, %name, %err, "outcome not published");
        }
    }
}

/// Fold a set of remote responses into a single result the default way:
/// every response successful means success, otherwise the node fails with
/// every shard failure collected into one record, ordered by correlation id
/// so the primary entry does not depend on map iteration order.
pub fn fold_responses(responses: &HashMap<Uuid, TaskResponse>) -> StepResult {
    let mut failed: Vec<(&Uuid, &TaskResponse)> = responses
        .iter()
        .filter(|(_, r)| r.status == crate::dispatch::RemoteStatus::Failure)
        .collect();
    failed.sort_by_key(|(id, _)| *id);

    let entries = failed
        .into_iter()
        .map(|(_, response)| response_failure_entry(response))
        .collect();
    match FailureInfo::from_entries(entries) {
        Some(failure) => StepResult::broken(Status::Failed, failure),
        None => StepResult::succeeded(Vec::new()),
    }
}
