//! Step type registry

use crate::execution::step::StepExecutable;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Registry mapping step-type keys to their executables
///
/// Populated at startup before the driver starts taking work; lookups are
/// read-only afterwards.
#[derive(Default)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn StepExecutable>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executable under its own step-type key
    pub fn register(&mut self, step: Arc<dyn StepExecutable>) {
        let key = step.step_type().to_string();
        if self.steps.insert(key.clone(), step).is_some() {
            warn!(step_type = %key, "replacing previously registered step executable");
        }
    }

    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepExecutable>> {
        self.steps.get(step_type).cloned()
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.steps.contains_key(step_type)
    }
}
