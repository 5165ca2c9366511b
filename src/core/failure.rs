//! Structured failure descriptions for broken statuses

use serde::{Deserialize, Serialize};

/// Machine-checkable failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    /// The step's own work failed
    Application,
    /// A required permission was missing
    Authorization,
    /// No response arrived within the bound
    Timeout,
    /// A policy gate (freeze window) vetoed the step
    PolicyBlocked,
    /// The remote side could not be reached
    Connectivity,
    /// Unexpected internal error
    Unknown,
}

/// Severity of one failure entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureLevel {
    Warning,
    Error,
}

/// One structured failure entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureData {
    pub failure_type: FailureType,

    /// Short machine-readable code (e.g. remote-supplied error code)
    pub code: String,

    /// Human-readable message
    pub message: String,

    pub level: FailureLevel,
}

/// Failure description attached to a node in a broken status
///
/// Always non-empty: a broken status without at least one failure entry is a
/// bug, and so is failure info on a positive or in-progress status. The
/// pairing is enforced by [`StepResult::validate`](crate::execution::step::StepResult::validate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    failures: Vec<FailureData>,
}

impl FailureInfo {
    /// Build failure info with a single entry
    pub fn single(
        failure_type: FailureType,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            failures: vec![FailureData {
                failure_type,
                code: code.into(),
                message: message.into(),
                level: FailureLevel::Error,
            }],
        }
    }

    /// Build failure info from entries; returns `None` when `failures` is
    /// empty rather than allowing an empty record to exist.
    pub fn from_entries(failures: Vec<FailureData>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    /// All failure entries, never empty
    pub fn entries(&self) -> &[FailureData] {
        &self.failures
    }

    /// The first (primary) failure entry
    pub fn primary(&self) -> &FailureData {
        &self.failures[0]
    }

    /// Combined human-readable message
    pub fn message(&self) -> String {
        self.failures
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
