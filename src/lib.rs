//! Execution status engine for pipeline graph nodes
//!
//! `flowstate` tracks the lifecycle of executing nodes in a deployment
//! pipeline: a closed status taxonomy with a transition legality table,
//! a polymorphic step contract, remote task dispatch with at-most-once
//! response correlation, a deployment-freeze policy gate, and translation
//! of expected failures into terminal statuses with structured failure
//! info.
//!
//! The [`NodeDriver`](execution::NodeDriver) is the entry point: it runs a
//! node attempt end to end against an [`ExecutionStore`](store::ExecutionStore),
//! a [`StepRegistry`](execution::StepRegistry), a
//! [`RemoteExecutor`](dispatch::RemoteExecutor) and a
//! [`FreezeEvaluator`](policy::FreezeEvaluator).

pub mod access;
pub mod core;
pub mod dispatch;
pub mod execution;
pub mod policy;
pub mod store;

pub use crate::access::{AccessChecker, Principal};
pub use crate::core::{
    FailureData, FailureInfo, FailureType, NodeContext, Outcome, OutcomeStore, Status,
};
pub use crate::dispatch::{RemoteExecutor, TaskCorrelator, TaskPayload, TaskResponse};
pub use crate::execution::{NodeDriver, StepExecutable, StepRegistry};
pub use crate::policy::{FreezeConfig, FreezeEvaluator};
pub use crate::store::{ExecutionStore, MemoryStore};
