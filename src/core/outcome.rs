//! Step outcomes - named results published for downstream nodes
//!
//! A step that succeeds can publish one or more named, typed payloads to a
//! shared store keyed by `(execution id, name, optional group)`. Outcomes are
//! write-once: they belong to the step that produced them and are read-only
//! for the rest of the execution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A named, typed payload produced by a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub value: serde_json::Value,
}

impl Outcome {
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Deserialize the payload into a concrete type
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, OutcomeError> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| OutcomeError::Decode(self.name.clone(), e.to_string()))
    }
}

/// Errors from the outcome store
#[derive(Debug, Error)]
pub enum OutcomeError {
    #[error("outcome '{0}' already published in this scope")]
    AlreadyPublished(String),

    #[error("outcome '{0}' not found")]
    NotFound(String),

    #[error("outcome '{0}' could not be decoded: {1}")]
    Decode(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OutcomeKey {
    execution_id: Uuid,
    name: String,
    group: Option<String>,
}

/// Shared, execution-scoped outcome store
///
/// The only consumers are downstream nodes in the same execution, so the
/// store lives for the lifetime of the execution graph.
#[derive(Debug, Default)]
pub struct OutcomeStore {
    entries: RwLock<HashMap<OutcomeKey, Outcome>>,
}

impl OutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an outcome; fails if the `(execution, name, group)` key is
    /// already taken.
    pub async fn publish(
        &self,
        execution_id: Uuid,
        group: Option<&str>,
        outcome: Outcome,
    ) -> Result<(), OutcomeError> {
        let key = OutcomeKey {
            execution_id,
            name: outcome.name.clone(),
            group: group.map(|g| g.to_string()),
        };

        let mut entries = self.entries.write().await;
        if entries.contains_key(&key) {
            return Err(OutcomeError::AlreadyPublished(outcome.name));
        }
        entries.insert(key, outcome);
        Ok(())
    }

    /// Resolve a published outcome or fail
    pub async fn resolve(
        &self,
        execution_id: Uuid,
        group: Option<&str>,
        name: &str,
    ) -> Result<Outcome, OutcomeError> {
        self.resolve_optional(execution_id, group, name)
            .await
            .ok_or_else(|| OutcomeError::NotFound(name.to_string()))
    }

    /// Resolve a published outcome if present
    pub async fn resolve_optional(
        &self,
        execution_id: Uuid,
        group: Option<&str>,
        name: &str,
    ) -> Option<Outcome> {
        let key = OutcomeKey {
            execution_id,
            name: name.to_string(),
            group: group.map(|g| g.to_string()),
        };
        self.entries.read().await.get(&key).cloned()
    }
}
