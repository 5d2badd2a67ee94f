//! Per-stage execution record.

use super::{ArtifactMap, SkipReason, StageStatus};
use crate::errors::StageError;
use crate::utils::{duration_ms, now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// A timestamped log line captured from a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was logged.
    pub timestamp: Timestamp,
    /// The message.
    pub message: String,
}

impl LogEntry {
    /// Creates a log entry stamped with the current time.
    #[must_use]
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            message: message.into(),
        }
    }
}

/// The outcome of one stage in one build.
///
/// Created as `Pending` when its wave begins and moved through
/// `Running` into a terminal status, or straight to `Skipped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageExecution {
    /// The stage id.
    pub stage_id: String,
    /// Current status.
    pub status: StageStatus,
    /// When the stage started running.
    pub started_at: Option<Timestamp>,
    /// When the stage reached a terminal status.
    pub ended_at: Option<Timestamp>,
    /// Ordered log lines.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Artifacts captured from the stage.
    #[serde(default)]
    pub artifacts: ArtifactMap,
    /// The error, for failed stages.
    pub error: Option<StageError>,
    /// The reason, for skipped stages.
    pub skip_reason: Option<SkipReason>,
}

impl StageExecution {
    /// Creates a pending execution.
    #[must_use]
    pub fn new(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            status: StageStatus::Pending,
            started_at: None,
            ended_at: None,
            logs: Vec::new(),
            artifacts: ArtifactMap::new(),
            error: None,
            skip_reason: None,
        }
    }

    /// Creates an execution that went straight from pending to skipped.
    #[must_use]
    pub fn skipped(stage_id: impl Into<String>, reason: SkipReason) -> Self {
        let mut execution = Self::new(stage_id);
        execution.skip(reason);
        execution
    }

    /// Marks the stage as running.
    pub fn start(&mut self) {
        self.status = StageStatus::Running;
        self.started_at = Some(now_utc());
    }

    /// Marks the stage as successful with its artifacts.
    pub fn succeed(&mut self, artifacts: ArtifactMap) {
        self.status = StageStatus::Success;
        self.artifacts = artifacts;
        self.finish();
    }

    /// Marks the stage as served from the cache.
    pub fn cache_hit(&mut self, artifacts: ArtifactMap) {
        self.status = StageStatus::Cached;
        self.artifacts = artifacts;
        self.finish();
    }

    /// Marks the stage as failed.
    pub fn fail(&mut self, error: StageError) {
        self.status = StageStatus::Failed;
        self.error = Some(error);
        self.finish();
    }

    /// Marks the stage as skipped.
    pub fn skip(&mut self, reason: SkipReason) {
        self.status = StageStatus::Skipped;
        self.skip_reason = Some(reason);
        self.finish();
    }

    /// Appends a log line.
    pub fn push_log(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry::now(message));
    }

    /// Returns true once the stage reached a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock running time, if the stage ran.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(duration_ms(start, end)),
            _ => None,
        }
    }

    fn finish(&mut self) {
        self.ended_at = Some(now_utc());
    }
}
