//! Remote task payloads, responses and the remote-execution contract

use crate::core::NodeContext;
use crate::execution::step::StepParameters;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of remote work handed to the executor collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Remote task kind (interpreted by the executor, opaque here)
    pub task_type: String,

    /// Task-specific data
    pub data: serde_json::Value,

    /// Target selectors for the remote side (e.g. worker pool labels)
    #[serde(default)]
    pub selectors: Vec<String>,
}

impl TaskPayload {
    pub fn new(task_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            task_type: task_type.into(),
            data,
            selectors: Vec::new(),
        }
    }

    pub fn with_selectors(mut self, selectors: Vec<String>) -> Self {
        self.selectors = selectors;
        self
    }
}

/// Success/failure indicator carried by a remote response
///
/// This field is authoritative; receipt of a response alone never implies
/// success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Success,
    Failure,
}

/// A response delivered for one correlation id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub status: RemoteStatus,

    /// Result data on success
    #[serde(default)]
    pub data: serde_json::Value,

    /// Remote-supplied error code on failure
    #[serde(default)]
    pub error_code: Option<String>,

    /// Remote-supplied error message on failure
    #[serde(default)]
    pub error_message: Option<String>,
}

impl TaskResponse {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            status: RemoteStatus::Success,
            data,
            error_code: None,
            error_message: None,
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Failure,
            data: serde_json::Value::Null,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }
}

/// The three ways a correlation entry can be resolved
///
/// Exactly one of these wins per correlation id.
#[derive(Debug, Clone)]
pub enum TaskResolution {
    /// The remote side answered
    Response(TaskResponse),
    /// No response arrived within the bound; synthesized by the sweep
    TimedOut,
    /// An external actor aborted the waiting node
    Aborted,
}

/// Mapping from a dispatched correlation id to the node awaiting its response
///
/// Created at dispatch, consulted exactly once on resolution, then removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub correlation_id: Uuid,
    pub context: NodeContext,
    pub parameters: StepParameters,
    pub dispatched_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Trait for the remote-execution collaborator
///
/// The engine submits payloads and receives `(correlation id, response)`
/// pairs back through [`TaskCorrelator::resolve`](crate::dispatch::TaskCorrelator::resolve),
/// at-least-once and unordered.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Submit a task for remote execution; returns the correlation id the
    /// eventual response will carry.
    async fn submit(&self, payload: &TaskPayload) -> anyhow::Result<Uuid>;
}
