//! Step execution: the executable contract, registry, driver and failure
//! translation

pub mod driver;
pub mod registry;
pub mod step;
pub mod translate;

pub use driver::{fold_responses, EngineError, InterventionAction, NodeDriver};
pub use registry::StepRegistry;
pub use step::{
    FailureStrategy, StepError, StepExecutable, StepExecution, StepParameters, StepResult,
};
pub use translate::{response_failure, response_failure_entry, timeout_failure, translate_error};

use std::time::Duration;

/// Default bound on remote task responses when parameters do not set one
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10 * 60);
