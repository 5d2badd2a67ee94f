//! Assertions over stage executions.

use crate::core::{SkipReason, StageExecution, StageStatus};

/// Asserts that the execution has the expected status.
pub fn assert_stage_status(execution: &StageExecution, expected: StageStatus) {
    assert_eq!(
        execution.status, expected,
        "Stage '{}': expected status {:?}, got {:?} (error: {:?})",
        execution.stage_id, expected, execution.status, execution.error
    );
}

/// Asserts that the execution succeeded or was served from the cache.
pub fn assert_stage_succeeded(execution: &StageExecution) {
    assert!(
        execution.status.is_success(),
        "Stage '{}': expected success, got {:?} (error: {:?})",
        execution.stage_id,
        execution.status,
        execution.error
    );
}

/// Asserts that the execution failed with an error of the given kind.
pub fn assert_stage_failed(execution: &StageExecution, kind: &str) {
    assert_eq!(
        execution.status,
        StageStatus::Failed,
        "Stage '{}': expected failure",
        execution.stage_id
    );
    let actual = execution.error.as_ref().map(crate::errors::StageError::kind);
    assert_eq!(
        actual,
        Some(kind),
        "Stage '{}': unexpected error kind",
        execution.stage_id
    );
}

/// Asserts that the execution was skipped for the given reason.
pub fn assert_stage_skipped(execution: &StageExecution, reason: SkipReason) {
    assert_stage_status(execution, StageStatus::Skipped);
    assert_eq!(
        execution.skip_reason,
        Some(reason),
        "Stage '{}': unexpected skip reason",
        execution.stage_id
    );
    assert!(
        execution.started_at.is_none(),
        "Stage '{}': skipped stages never start",
        execution.stage_id
    );
}

/// Asserts that the execution published an artifact with the given value.
pub fn assert_artifact(execution: &StageExecution, name: &str, expected: &serde_json::Value) {
    let actual = execution.artifacts.get(name);
    assert_eq!(
        actual,
        Some(expected),
        "Stage '{}': expected artifact '{}' = {:?}, got {:?}",
        execution.stage_id,
        name,
        expected,
        actual
    );
}
