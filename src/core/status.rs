//! Execution status taxonomy and transition legality
//!
//! Every node in an execution graph moves through the statuses defined here.
//! Group membership is fixed at compile time; the tables below are the only
//! authority on which transitions are legal. Callers must go through
//! [`Status::validate_transition`] before committing a status write.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Execution status of a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Node is waiting to be picked up
    Queued,
    /// Node is actively executing
    Running,
    /// Node was paused by an external actor
    Paused,
    /// Node is suspended awaiting an async callback
    AsyncWaiting,
    /// Node is suspended awaiting a remote task response
    TaskWaiting,
    /// Node is suspended on a timer
    TimedWaiting,
    /// Node failed and is parked awaiting operator action
    InterventionWaiting,
    /// Node is winding down after an abort request
    Discontinuing,
    /// Node finished successfully
    Succeeded,
    /// Node was skipped before it ran
    Skipped,
    /// Node was set aside without a success/failure judgment
    Suspended,
    /// Node failed with a known failure
    Failed,
    /// Node hit an unexpected internal error
    Errored,
    /// Node timed out waiting for a response
    Expired,
    /// Node was aborted by an external actor
    Aborted,
    /// Node was vetoed by an active freeze window
    FreezeFailed,
}

use Status::*;

/// Statuses a terminal status may be entered from
const FINALIZABLE: &[Status] = &[
    Queued,
    Running,
    Paused,
    AsyncWaiting,
    InterventionWaiting,
    TaskWaiting,
    TimedWaiting,
    Discontinuing,
];

/// Statuses a node may pause or suspend from
const SUSPENDABLE: &[Status] = &[Queued, Running];

const RUNNING_PREDECESSORS: &[Status] = &[
    Queued,
    AsyncWaiting,
    TaskWaiting,
    TimedWaiting,
    InterventionWaiting,
    Paused,
];

const INTERVENTION_PREDECESSORS: &[Status] = &[Failed, Errored];

const DISCONTINUING_PREDECESSORS: &[Status] = &[
    Queued,
    Running,
    AsyncWaiting,
    TaskWaiting,
    TimedWaiting,
    InterventionWaiting,
    Paused,
];

impl Status {
    /// Statuses that a transition *into* `self` is legal from.
    pub fn allowed_predecessors(self) -> &'static [Status] {
        match self {
            Running => RUNNING_PREDECESSORS,
            InterventionWaiting => INTERVENTION_PREDECESSORS,
            TimedWaiting | AsyncWaiting | TaskWaiting | Paused => SUSPENDABLE,
            Discontinuing => DISCONTINUING_PREDECESSORS,
            Skipped => &[Queued],
            Queued => &[Paused],
            Aborted | Succeeded | Errored | Suspended | Failed | Expired | FreezeFailed => {
                FINALIZABLE
            }
        }
    }

    /// Check that entering `to` from `from` is legal.
    ///
    /// Fails loudly; there is no silent clamping anywhere in the engine.
    pub fn validate_transition(from: Status, to: Status) -> Result<(), TransitionError> {
        if to.allowed_predecessors().contains(&from) {
            Ok(())
        } else {
            Err(TransitionError { from, to })
        }
    }

    /// True once the node has reached a terminal judgment. The record is
    /// immutable from here on, with one exception: a broken final status may
    /// still be parked in [`Status::InterventionWaiting`] for an operator.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Succeeded | Skipped | Suspended | Failed | Errored | Expired | Aborted | FreezeFailed
        )
    }

    /// Terminal with a positive judgment.
    pub fn is_positive(self) -> bool {
        matches!(self, Succeeded)
    }

    /// Terminal with a failure judgment. Broken statuses always carry
    /// [`FailureInfo`](crate::core::failure::FailureInfo).
    pub fn is_broken(self) -> bool {
        matches!(self, Failed | Errored | Expired | FreezeFailed)
    }

    /// Still making progress (actively running or suspended on work).
    pub fn is_flowing(self) -> bool {
        matches!(
            self,
            Running | AsyncWaiting | TaskWaiting | TimedWaiting | Discontinuing
        )
    }

    /// Suspended in a state that a future delivery or operator action resumes.
    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            Paused | AsyncWaiting | TaskWaiting | TimedWaiting | InterventionWaiting
        )
    }

    /// Eligible for retry policy.
    pub fn is_retryable(self) -> bool {
        matches!(self, InterventionWaiting | Failed | Errored | Expired)
    }

    /// May still be driven to a terminal status.
    pub fn is_finalizable(self) -> bool {
        FINALIZABLE.contains(&self)
    }

    /// All statuses, for exhaustive property checks.
    pub fn all() -> &'static [Status] {
        &[
            Queued,
            Running,
            Paused,
            AsyncWaiting,
            TaskWaiting,
            TimedWaiting,
            InterventionWaiting,
            Discontinuing,
            Succeeded,
            Skipped,
            Suspended,
            Failed,
            Errored,
            Expired,
            Aborted,
            FreezeFailed,
        ]
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An illegal status transition was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: Status,
    pub to: Status,
}
