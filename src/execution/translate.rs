//! Translation of expected failures into terminal statuses
//!
//! Step errors and remote failure responses are values, not exceptions: each
//! maps to exactly one broken status carrying structured failure info, and
//! none of them propagates out of the engine.

use crate::core::{FailureData, FailureInfo, FailureLevel, FailureType, Status};
use crate::dispatch::TaskResponse;
use crate::execution::step::StepError;
use std::time::Duration;

/// Map a step error to the terminal status and failure info it commits as
pub fn translate_error(err: &StepError) -> (Status, FailureInfo) {
    match err {
        StepError::AccessDenied { resource, permission } => (
            Status::Failed,
            FailureInfo::single(
                FailureType::Authorization,
                "ACCESS_DENIED",
                format!("access denied: {permission} on {resource}"),
            ),
        ),
        StepError::PolicyBlocked { reason } => (
            Status::FreezeFailed,
            FailureInfo::single(FailureType::PolicyBlocked, "FREEZE_ACTIVE", reason.clone()),
        ),
        StepError::RemoteTask { code, message } => (
            Status::Failed,
            FailureInfo::single(FailureType::Application, code.clone(), message.clone()),
        ),
        StepError::Timeout(duration) => (Status::Expired, timeout_failure(*duration)),
        StepError::Internal(message) => (
            Status::Errored,
            FailureInfo::single(FailureType::Unknown, "GENERAL_ERROR", message.clone()),
        ),
    }
}

/// Failure info for a dispatch that produced no response within the bound
pub fn timeout_failure(timeout: Duration) -> FailureInfo {
    FailureInfo::single(
        FailureType::Timeout,
        "TIMEOUT_ERROR",
        format!("no response within {timeout:?}"),
    )
}

/// Failure info from a remote response that reported failure
///
/// The response's status field is authoritative; remote error details are
/// carried through when present.
pub fn response_failure(response: &TaskResponse) -> FailureInfo {
    let entry = response_failure_entry(response);
    FailureInfo::single(entry.failure_type, entry.code, entry.message)
}

/// One failure entry from a remote response, for folding several failed
/// responses into a single failure record
pub fn response_failure_entry(response: &TaskResponse) -> FailureData {
    FailureData {
        failure_type: FailureType::Application,
        code: response
            .error_code
            .clone()
            .unwrap_or_else(|| "REMOTE_FAILURE".into()),
        message: response
            .error_message
            .clone()
            .unwrap_or_else(|| "remote task reported failure".into()),
        level: FailureLevel::Error,
    }
}
