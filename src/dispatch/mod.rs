//! Remote task dispatch and response correlation

pub mod correlator;
pub mod task;

pub use correlator::{DispatchError, ResolveOutcome, TaskCorrelator, TaskHandle};
pub use task::{
    CorrelationEntry, RemoteExecutor, RemoteStatus, TaskPayload, TaskResolution, TaskResponse,
};
