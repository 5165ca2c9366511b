//! Step executable contract - the capability every step type implements

use crate::access::AccessChecker;
use crate::core::{FailureInfo, NodeContext, Outcome, OutcomeStore, Status};
use crate::dispatch::TaskPayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::dispatch::TaskResponse;

/// Expected failures a step can report
///
/// These are values, not panics: the driver translates every variant into a
/// terminal status with failure info and none of them escapes the engine.
#[derive(Debug, Error)]
pub enum StepError {
    /// A required permission was missing; raised before any side effect
    #[error("access denied: {permission} on {resource}")]
    AccessDenied { resource: String, permission: String },

    /// A policy gate vetoed the step
    #[error("blocked by policy: {reason}")]
    PolicyBlocked { reason: String },

    /// The remote side reported failure
    #[error("remote task failed: {message}")]
    RemoteTask { code: String, message: String },

    /// No response within the configured bound
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// What to do with a node once its result is broken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Commit the broken status as-is
    #[default]
    Fail,
    /// Park the node for an operator decision (retry / abort / ignore)
    ManualIntervention,
}

/// Step configuration passed by the graph driver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepParameters {
    /// Free-form, step-type specific configuration
    #[serde(default)]
    pub values: serde_json::Value,

    /// How a broken result is committed
    #[serde(default)]
    pub failure_strategy: FailureStrategy,

    /// Remote task timeout in seconds (dispatching steps only)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl StepParameters {
    /// Deserialize `values` into a step-specific config type
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, StepError> {
        serde_json::from_value(self.values.clone())
            .map_err(|e| StepError::Internal(format!("invalid step parameters: {}", e)))
    }

    /// Effective remote task timeout
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }
}

/// Terminal result of a step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub status: Status,
    pub failure: Option<FailureInfo>,
    pub outcomes: Vec<Outcome>,
}

impl StepResult {
    /// A successful result with outcomes to publish
    pub fn succeeded(outcomes: Vec<Outcome>) -> Self {
        Self {
            status: Status::Succeeded,
            failure: None,
            outcomes,
        }
    }

    /// A broken result carrying its failure description
    pub fn broken(status: Status, failure: FailureInfo) -> Self {
        Self {
            status,
            failure: Some(failure),
            outcomes: Vec::new(),
        }
    }

    /// Enforce the status/failure pairing: failure info present iff the
    /// status is broken.
    pub fn validate(&self) -> Result<(), StepError> {
        match (self.status.is_broken(), &self.failure) {
            (true, None) => Err(StepError::Internal(format!(
                "broken status {} without failure info",
                self.status
            ))),
            (false, Some(_)) => Err(StepError::Internal(format!(
                "failure info on non-broken status {}",
                self.status
            ))),
            _ => Ok(()),
        }
    }
}

/// What `execute` decided to do
#[derive(Debug)]
pub enum StepExecution {
    /// The step finished synchronously
    Sync(StepResult),

    /// The step hands work to the remote executor and suspends. A response
    /// (or its absence, on expiry) is expected for every payload before
    /// `handle_response` fires once.
    Dispatch {
        payloads: Vec<TaskPayload>,
        timeout: Duration,
        /// One of the waiting statuses; the correlator commits it atomically
        /// with the correlation entries.
        wait_status: Status,
    },
}

/// The polymorphic capability every step type implements
///
/// Implementations are registered in a [`StepRegistry`](crate::execution::registry::StepRegistry)
/// at startup; the driver resolves them by `step_type`.
#[async_trait]
pub trait StepExecutable: Send + Sync {
    /// The step-type key this executable is registered under
    fn step_type(&self) -> &str;

    /// Check required access before any side effect. Must be idempotent and
    /// side-effect free; the only expected error is `AccessDenied`.
    async fn validate_resources(
        &self,
        ctx: &NodeContext,
        params: &StepParameters,
        access: &dyn AccessChecker,
    ) -> Result<(), StepError>;

    /// Run the step: either complete synchronously or dispatch remote work
    async fn execute(
        &self,
        ctx: &NodeContext,
        params: &StepParameters,
        outcomes: &OutcomeStore,
    ) -> Result<StepExecution, StepError>;

    /// Translate the aggregated responses for this node's dispatched tasks
    /// into a terminal result. Invoked exactly once per dispatch.
    async fn handle_response(
        &self,
        ctx: &NodeContext,
        params: &StepParameters,
        responses: HashMap<Uuid, TaskResponse>,
    ) -> Result<StepResult, StepError>;

    /// Release any step-held resources when the node is aborted while
    /// waiting. Must not apply a success or failure outcome; the driver
    /// commits the abort itself.
    async fn handle_abort(&self, ctx: &NodeContext, params: &StepParameters);
}
