//! In-memory execution store
//!
//! A single mutex over all state makes every trait method atomic, including
//! the paired correlation-insert/status-write and the check-and-remove.

use super::{ExecutionStore, NodeRecord, StoreError};
use crate::core::{FailureInfo, Status};
use crate::dispatch::CorrelationEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    nodes: HashMap<Uuid, NodeRecord>,
    correlations: HashMap<Uuid, CorrelationEntry>,
    by_node: HashMap<Uuid, HashSet<Uuid>>,
}

/// Execution store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn apply_transition(
        &mut self,
        runtime_id: Uuid,
        to: Status,
        failure: Option<FailureInfo>,
    ) -> Result<Status, StoreError> {
        let record = self
            .nodes
            .get_mut(&runtime_id)
            .ok_or(StoreError::NodeNotFound(runtime_id))?;

        Status::validate_transition(record.status, to)?;
        let from = record.status;
        record.status = to;
        record.failure = failure;
        record.updated_at = Utc::now();
        debug!(%runtime_id, %from, %to, "status transition");
        Ok(from)
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create_node(&self, record: NodeRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let runtime_id = record.context.runtime_id;
        if inner.nodes.contains_key(&runtime_id) {
            return Err(StoreError::NodeExists(runtime_id));
        }
        inner.nodes.insert(runtime_id, record);
        Ok(())
    }

    async fn get_node(&self, runtime_id: Uuid) -> Result<NodeRecord, StoreError> {
        self.inner
            .lock()
            .await
            .nodes
            .get(&runtime_id)
            .cloned()
            .ok_or(StoreError::NodeNotFound(runtime_id))
    }

    async fn transition(
        &self,
        runtime_id: Uuid,
        to: Status,
        failure: Option<FailureInfo>,
    ) -> Result<Status, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.apply_transition(runtime_id, to, failure)
    }

    async fn insert_correlations(
        &self,
        runtime_id: Uuid,
        entries: Vec<CorrelationEntry>,
        wait_status: Status,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        // Legality first; nothing is inserted if the status write would fail
        inner.apply_transition(runtime_id, wait_status, None)?;
        for entry in entries {
            inner
                .by_node
                .entry(runtime_id)
                .or_default()
                .insert(entry.correlation_id);
            inner.correlations.insert(entry.correlation_id, entry);
        }
        Ok(())
    }

    async fn take_correlation(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<CorrelationEntry>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.correlations.remove(&correlation_id) else {
            return Ok(None);
        };
        let runtime_id = entry.context.runtime_id;
        if let Some(ids) = inner.by_node.get_mut(&runtime_id) {
            ids.remove(&correlation_id);
            if ids.is_empty() {
                inner.by_node.remove(&runtime_id);
            }
        }
        Ok(Some(entry))
    }

    async fn take_correlations_for_node(
        &self,
        runtime_id: Uuid,
    ) -> Result<Vec<CorrelationEntry>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(ids) = inner.by_node.remove(&runtime_id) else {
            return Ok(Vec::new());
        };
        let mut drained = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = inner.correlations.remove(&id) {
                drained.push(entry);
            }
        }
        Ok(drained)
    }

    async fn outstanding_for_node(&self, runtime_id: Uuid) -> Result<usize, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .by_node
            .get(&runtime_id)
            .map(|ids| ids.len())
            .unwrap_or(0))
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .correlations
            .values()
            .filter(|e| e.deadline <= now)
            .map(|e| e.correlation_id)
            .collect())
    }
}
