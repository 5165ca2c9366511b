//! Node runtime context - identity and addressing for one executing unit

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a single executing node
///
/// Created when a node begins executing and immutable for the lifetime of
/// that attempt. `setup_id` is the definition-time identity, stable across
/// retries; `runtime_id` is unique per attempt and is the correlation key
/// asynchronous responses are matched against. All scope identifiers are
/// carried explicitly; nothing here is ambient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeContext {
    /// Definition-time identity, stable across retries
    pub setup_id: String,

    /// Unique per execution attempt
    pub runtime_id: Uuid,

    /// Human-readable label
    pub identifier: String,

    /// Step type, used to look up the executable in the registry
    pub step_type: String,

    /// Optional stage/step grouping for output scoping
    pub group: Option<String>,

    /// The enclosing graph execution
    pub execution_id: Uuid,

    /// Organization scope
    pub org_id: String,

    /// Project scope
    pub project_id: String,
}

impl NodeContext {
    /// Create a context for a fresh execution attempt
    pub fn new(
        setup_id: impl Into<String>,
        identifier: impl Into<String>,
        step_type: impl Into<String>,
        execution_id: Uuid,
        org_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            setup_id: setup_id.into(),
            runtime_id: Uuid::new_v4(),
            identifier: identifier.into(),
            step_type: step_type.into(),
            group: None,
            execution_id,
            org_id: org_id.into(),
            project_id: project_id.into(),
        }
    }

    /// Attach a stage/step group for output scoping
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Context for a retry of the same setup node: same setup identity,
    /// fresh runtime id.
    pub fn retry(&self) -> Self {
        Self {
            runtime_id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}
