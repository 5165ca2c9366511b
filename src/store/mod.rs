//! Execution state persistence
//!
//! The store owns two facts: the current status of every node and the set of
//! outstanding correlation entries. Both the legality check on status writes
//! and the check-and-remove on correlation entries happen inside the store's
//! own synchronization, so concurrent callers race on a single authority.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::core::{FailureInfo, NodeContext, Status, TransitionError};
use crate::dispatch::CorrelationEntry;
use crate::execution::step::StepParameters;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Persisted state of one node attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub context: NodeContext,
    pub parameters: StepParameters,
    pub status: Status,
    pub failure: Option<FailureInfo>,
    pub updated_at: DateTime<Utc>,
}

impl NodeRecord {
    /// A fresh record, queued and unjudged
    pub fn new(context: NodeContext, parameters: StepParameters) -> Self {
        Self {
            context,
            parameters,
            status: Status::Queued,
            failure: None,
            updated_at: Utc::now(),
        }
    }
}

/// Errors from the execution store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("node {0} not found")]
    NodeNotFound(Uuid),

    #[error("node {0} already exists")]
    NodeExists(Uuid),

    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    #[error("storage backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Persistence contract for node status and correlation entries
///
/// `transition` validates legality against the node's current status and
/// applies the write atomically; `take_correlation` is the check-and-remove
/// primitive that gives response resolution its at-most-once guarantee;
/// `insert_correlations` commits the entries and the waiting status as one
/// write.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_node(&self, record: NodeRecord) -> Result<(), StoreError>;

    async fn get_node(&self, runtime_id: Uuid) -> Result<NodeRecord, StoreError>;

    /// Validate and apply a status write; returns the previous status.
    async fn transition(
        &self,
        runtime_id: Uuid,
        to: Status,
        failure: Option<FailureInfo>,
    ) -> Result<Status, StoreError>;

    /// Record the correlation entries and move the node to `wait_status` as
    /// one atomic write.
    async fn insert_correlations(
        &self,
        runtime_id: Uuid,
        entries: Vec<CorrelationEntry>,
        wait_status: Status,
    ) -> Result<(), StoreError>;

    /// Remove and return the entry for `correlation_id` if it is still
    /// outstanding. Exactly one caller per id observes `Some`.
    async fn take_correlation(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<CorrelationEntry>, StoreError>;

    /// Remove and return every outstanding entry for a node.
    async fn take_correlations_for_node(
        &self,
        runtime_id: Uuid,
    ) -> Result<Vec<CorrelationEntry>, StoreError>;

    /// Outstanding entry count for a node's current dispatch.
    async fn outstanding_for_node(&self, runtime_id: Uuid) -> Result<usize, StoreError>;

    /// Correlation ids whose deadline is at or before `now`.
    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;
}
