//! Error types for the buildflow engine.
//!
//! Graph validation errors are fatal for a build and short-circuit before
//! any stage runs. Stage errors are caught by the executor and stored on
//! the stage execution; they never escape a build on their own.

use crate::build::BuildRecord;
use crate::core::ArtifactKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// The main error type for buildflow operations.
#[derive(Debug, Error)]
pub enum BuildflowError {
    /// The stage graph failed validation.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// A required stage failed and the build was aborted.
    #[error("{0}")]
    Aborted(#[from] BuildAbortedError),

    /// An artifact key was written twice.
    #[error("{0}")]
    ArtifactConflict(#[from] ArtifactConflictError),

    /// The runner configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Metadata about a validation error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Errors raised while validating and layering a stage graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The dependency relation contains a cycle.
    #[error("Cyclic dependency among stages: {}", stages.join(", "))]
    CyclicDependency {
        /// Stages that could not be placed in any wave.
        stages: Vec<String>,
    },

    /// A stage depends on an id that is not declared.
    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency {
        /// The declaring stage.
        stage: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// Two stages share the same id.
    #[error("Stage '{stage}' is declared more than once")]
    DuplicateStage {
        /// The duplicated id.
        stage: String,
    },
}

impl GraphError {
    /// Returns the stable diagnostic code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CyclicDependency { .. } => "GRAPH-001-CYCLE",
            Self::UnknownDependency { .. } => "GRAPH-002-UNKNOWN_DEP",
            Self::DuplicateStage { .. } => "GRAPH-003-DUPLICATE",
        }
    }

    /// Returns the stage ids involved in the error.
    #[must_use]
    pub fn stages(&self) -> Vec<String> {
        match self {
            Self::CyclicDependency { stages } => stages.clone(),
            Self::UnknownDependency { stage, dependency } => {
                vec![stage.clone(), dependency.clone()]
            }
            Self::DuplicateStage { stage } => vec![stage.clone()],
        }
    }

    /// Builds diagnostic info for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        let info = ContractErrorInfo::new(self.code(), self.to_string());
        match self {
            Self::CyclicDependency { stages } => info
                .with_fix_hint("Remove one of the dependencies between these stages to break the cycle.")
                .with_context_entry("stages", stages.join(",")),
            Self::UnknownDependency { stage, dependency } => info
                .with_fix_hint("Check the dependency id for typos or declare the missing stage.")
                .with_context_entry("stage", stage.clone())
                .with_context_entry("dependency", dependency.clone()),
            Self::DuplicateStage { stage } => info
                .with_fix_hint("Give every stage a unique id.")
                .with_context_entry("stage", stage.clone()),
        }
    }
}

/// Error recorded on a stage execution that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
    /// The work callable did not finish within the stage timeout.
    #[error("Stage timed out after {timeout_ms} ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The work callable returned an error or panicked.
    #[error("Stage execution error: {message}")]
    Execution {
        /// The error message.
        message: String,
    },

    /// The stage was cancelled while running.
    #[error("Stage cancelled: {reason}")]
    Cancelled {
        /// Why the stage was cancelled.
        reason: String,
    },

    /// The stage produced an artifact key that was already written.
    #[error("Artifact '{key}' was already written")]
    ArtifactConflict {
        /// The conflicting artifact key.
        key: String,
    },
}

impl StageError {
    /// Creates an execution error from any displayable error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Returns the error kind name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "StageTimeout",
            Self::Execution { .. } => "StageExecutionError",
            Self::Cancelled { .. } => "StageCancelled",
            Self::ArtifactConflict { .. } => "ArtifactConflict",
        }
    }

    /// Returns true if the stage timed out.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Error raised when writing an artifact key that already holds a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Artifact conflict: '{key}' was already written")]
pub struct ArtifactConflictError {
    /// The conflicting key.
    pub key: ArtifactKey,
}

impl ArtifactConflictError {
    /// Creates a new artifact conflict error.
    #[must_use]
    pub fn new(key: ArtifactKey) -> Self {
        Self { key }
    }
}

impl From<ArtifactConflictError> for StageError {
    fn from(err: ArtifactConflictError) -> Self {
        Self::ArtifactConflict {
            key: err.key.to_string(),
        }
    }
}

/// Error surfaced by strict runs when a required stage failed.
#[derive(Debug, Error)]
#[error("Build {build_id} aborted: required stage(s) failed: {}", failed_stages.join(", "))]
pub struct BuildAbortedError {
    /// The aborted build.
    pub build_id: Uuid,
    /// Required stages that failed.
    pub failed_stages: Vec<String>,
    /// The finalized record, kept for auditing.
    pub record: Box<BuildRecord>,
}

impl BuildAbortedError {
    /// Creates an abort error from a finalized record.
    #[must_use]
    pub fn new(record: BuildRecord, failed_stages: Vec<String>) -> Self {
        Self {
            build_id: record.id,
            failed_stages,
            record: Box::new(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_dependency_message() {
        let err = GraphError::CyclicDependency {
            stages: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency among stages: a, b");
        assert_eq!(err.code(), "GRAPH-001-CYCLE");
        assert_eq!(err.stages(), vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_dependency_info() {
        let err = GraphError::UnknownDependency {
            stage: "build".to_string(),
            dependency: "chekout".to_string(),
        };
        let info = err.error_info();

        assert_eq!(info.code, "GRAPH-002-UNKNOWN_DEP");
        assert!(info.fix_hint.is_some());
        assert_eq!(info.context.get("dependency"), Some(&"chekout".to_string()));
    }

    #[test]
    fn test_stage_error_kinds() {
        assert_eq!(StageError::Timeout { timeout_ms: 10 }.kind(), "StageTimeout");
        assert_eq!(StageError::execution("boom").kind(), "StageExecutionError");
        assert!(StageError::Timeout { timeout_ms: 10 }.is_timeout());
        assert!(!StageError::execution("boom").is_timeout());
    }

    #[test]
    fn test_stage_error_serialization() {
        let err = StageError::Timeout { timeout_ms: 250 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "timeout", "timeout_ms": 250}));

        let back: StageError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_artifact_conflict_into_stage_error() {
        let key = ArtifactKey::new(Uuid::nil(), "build", "image");
        let err: StageError = ArtifactConflictError::new(key).into();
        assert_eq!(err.kind(), "ArtifactConflict");
    }
}
