//! Task dispatcher and response correlator
//!
//! Issues units of remote work keyed by correlation id and reconciles the
//! responses that come back late, never, or out of order. The store's
//! check-and-remove primitive guarantees that exactly one of
//! {response, timeout, abort} wins per correlation id; everything else here
//! is bookkeeping around that.

use crate::core::Status;
use crate::dispatch::task::{
    CorrelationEntry, RemoteExecutor, TaskPayload, TaskResolution,
};
use crate::execution::step::StepParameters;
use crate::core::NodeContext;
use crate::store::{ExecutionStore, StoreError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors from dispatching remote work
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("remote executor rejected submission: {0}")]
    Submit(#[source] anyhow::Error),

    #[error("{0} is not a waiting status")]
    InvalidWaitStatus(Status),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Correlation ids issued by one dispatch; the node waits on all of them
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub correlation_ids: Vec<Uuid>,
}

/// Result of attempting to resolve one correlation id
#[derive(Debug)]
pub enum ResolveOutcome {
    /// Unknown or already-resolved id: logged no-op, never an error, since
    /// the remote side delivers at-least-once
    Duplicate,

    /// The node's barrier still has outstanding correlation ids
    Pending { runtime_id: Uuid, outstanding: usize },

    /// The barrier is complete: every id resolved (or the barrier was
    /// short-circuited by a timeout or abort)
    Complete {
        context: NodeContext,
        parameters: StepParameters,
        resolutions: HashMap<Uuid, TaskResolution>,
    },
}

/// Dispatches remote work and correlates responses back to waiting nodes
pub struct TaskCorrelator {
    store: Arc<dyn ExecutionStore>,
    remote: Arc<dyn RemoteExecutor>,
    /// Responses already received for barriers that are not yet complete.
    /// Entries themselves are durable in the store; this buffer only holds
    /// partial fan-out results between arrivals.
    partial: Mutex<HashMap<Uuid, HashMap<Uuid, TaskResolution>>>,
}

impl TaskCorrelator {
    pub fn new(store: Arc<dyn ExecutionStore>, remote: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            store,
            remote,
            partial: Mutex::new(HashMap::new()),
        }
    }

    /// Submit the payloads and record the correlation entries atomically with
    /// the node's waiting-status write.
    ///
    /// The entries land in one store write with the status change, so no
    /// correlation ever exists for a node that is not waiting. The converse
    /// window is real though: a response that races back between `submit`
    /// and that write finds no entry and is discarded as a duplicate. The
    /// node then waits until the expiry sweep settles it at its deadline.
    pub async fn dispatch(
        &self,
        ctx: &NodeContext,
        params: &StepParameters,
        payloads: Vec<TaskPayload>,
        timeout: Duration,
        wait_status: Status,
    ) -> Result<TaskHandle, DispatchError> {
        if !matches!(
            wait_status,
            Status::AsyncWaiting | Status::TaskWaiting | Status::TimedWaiting
        ) {
            return Err(DispatchError::InvalidWaitStatus(wait_status));
        }

        let now = Utc::now();
        let deadline =
            now + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::days(365));

        let mut entries = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            let correlation_id = self
                .remote
                .submit(payload)
                .await
                .map_err(DispatchError::Submit)?;
            entries.push(CorrelationEntry {
                correlation_id,
                context: ctx.clone(),
                parameters: params.clone(),
                dispatched_at: now,
                deadline,
            });
        }

        let ids: Vec<Uuid> = entries.iter().map(|e| e.correlation_id).collect();
        self.store
            .insert_correlations(ctx.runtime_id, entries, wait_status)
            .await?;

        info!(
            runtime_id = %ctx.runtime_id,
            step = %ctx.identifier,
            tasks = ids.len(),
            status = %wait_status,
            "dispatched remote work"
        );
        Ok(TaskHandle { correlation_ids: ids })
    }

    /// Resolve one correlation id with at-most-once semantics.
    ///
    /// A timeout or abort short-circuits the node's whole barrier: the
    /// remaining entries are drained so late responses find nothing.
    pub async fn resolve(
        &self,
        correlation_id: Uuid,
        resolution: TaskResolution,
    ) -> Result<ResolveOutcome, StoreError> {
        // The buffer lock serializes resolutions, so the take/count pair
        // below cannot interleave with another delivery for the same node.
        let mut partial = self.partial.lock().await;

        let Some(entry) = self.store.take_correlation(correlation_id).await? else {
            warn!(%correlation_id, "response for unknown or already-resolved correlation id, discarding");
            return Ok(ResolveOutcome::Duplicate);
        };

        let runtime_id = entry.context.runtime_id;

        match resolution {
            TaskResolution::Response(_) => {
                let outstanding = self.store.outstanding_for_node(runtime_id).await?;
                let buffered = partial.entry(runtime_id).or_default();
                buffered.insert(correlation_id, resolution);

                if outstanding == 0 {
                    let resolutions = partial.remove(&runtime_id).unwrap_or_default();
                    debug!(%runtime_id, "response barrier complete");
                    Ok(ResolveOutcome::Complete {
                        context: entry.context,
                        parameters: entry.parameters,
                        resolutions,
                    })
                } else {
                    debug!(%runtime_id, outstanding, "response buffered, barrier still open");
                    Ok(ResolveOutcome::Pending { runtime_id, outstanding })
                }
            }
            TaskResolution::TimedOut | TaskResolution::Aborted => {
                // Short-circuit: drain the rest of the barrier now
                let drained = self.store.take_correlations_for_node(runtime_id).await?;
                let mut resolutions = partial.remove(&runtime_id).unwrap_or_default();
                let synth = match resolution {
                    TaskResolution::TimedOut => TaskResolution::TimedOut,
                    _ => TaskResolution::Aborted,
                };
                for e in drained {
                    resolutions.insert(e.correlation_id, synth.clone());
                }
                resolutions.insert(correlation_id, resolution);

                Ok(ResolveOutcome::Complete {
                    context: entry.context,
                    parameters: entry.parameters,
                    resolutions,
                })
            }
        }
    }

    /// Synthesize timeout resolutions for every entry past its deadline.
    ///
    /// Invoked by a background sweep; guarantees every dispatched task
    /// eventually reaches a terminal outcome even if the remote side never
    /// answers.
    pub async fn expire_overdue(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ResolveOutcome>, StoreError> {
        let overdue = self.store.overdue(now).await?;
        let mut completed = Vec::new();
        for correlation_id in overdue {
            info!(%correlation_id, "correlation entry overdue, synthesizing timeout");
            match self.resolve(correlation_id, TaskResolution::TimedOut).await? {
                ResolveOutcome::Duplicate => {}
                outcome => completed.push(outcome),
            }
        }
        Ok(completed)
    }

    /// Abort path: remove every entry for the node through the same
    /// check-and-remove primitive as `resolve`, so a late response after the
    /// abort is safely discarded.
    pub async fn abandon(&self, runtime_id: Uuid) -> Result<Vec<CorrelationEntry>, StoreError> {
        let drained = self.store.take_correlations_for_node(runtime_id).await?;
        self.partial.lock().await.remove(&runtime_id);
        if !drained.is_empty() {
            info!(%runtime_id, entries = drained.len(), "abandoned pending correlation entries");
        }
        Ok(drained)
    }
}
