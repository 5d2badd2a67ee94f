//! The record of one triggered build.

use super::{Trigger, TriggerKind};
use crate::core::{BuildStatus, StageExecution, StageStatus};
use crate::utils::{duration_ms, generate_build_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// The complete outcome of one pipeline trigger.
///
/// `stages` holds one execution per stage, added as `Pending` when its
/// wave begins and updated in place, so the order is wave order. A record
/// is never changed once its status is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// The build id.
    pub id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// What started the build.
    pub trigger: TriggerKind,
    /// The branch being built.
    pub branch: String,
    /// The commit being built.
    pub commit: Option<String>,
    /// The target environment.
    pub environment: String,
    /// The build status.
    pub status: BuildStatus,
    /// When the build started.
    pub started_at: Timestamp,
    /// When the build finished.
    pub ended_at: Option<Timestamp>,
    /// Stage executions in execution order.
    pub stages: Vec<StageExecution>,
    /// Validation error or abort reason.
    pub error: Option<String>,
}

impl BuildRecord {
    /// Starts a new running record for a trigger.
    #[must_use]
    pub fn start(pipeline: impl Into<String>, trigger: &Trigger) -> Self {
        Self {
            id: generate_build_id(),
            pipeline: pipeline.into(),
            trigger: trigger.kind,
            branch: trigger.branch.clone(),
            commit: trigger.commit.clone(),
            environment: trigger.environment.clone(),
            status: BuildStatus::Running,
            started_at: now_utc(),
            ended_at: None,
            stages: Vec::new(),
            error: None,
        }
    }

    /// Looks up a stage execution by stage id.
    #[must_use]
    pub fn stage(&self, stage_id: &str) -> Option<&StageExecution> {
        self.stages.iter().find(|s| s.stage_id == stage_id)
    }

    /// Returns the stage ids with the given status, in execution order.
    #[must_use]
    pub fn stages_with_status(&self, status: StageStatus) -> Vec<String> {
        self.stages
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.stage_id.clone())
            .collect()
    }

    /// Returns true once the build has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Total build time, once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at.map(|end| duration_ms(self.started_at, end))
    }

    /// Appends a stage execution.
    pub(crate) fn record_stage(&mut self, execution: StageExecution) {
        if self.is_terminal() {
            warn!(build_id = %self.id, stage = %execution.stage_id, "Ignoring stage for finished build");
            return;
        }
        self.stages.push(execution);
    }

    /// Replaces the execution of the same stage, or appends it.
    pub(crate) fn update_stage(&mut self, execution: StageExecution) {
        if self.is_terminal() {
            warn!(build_id = %self.id, stage = %execution.stage_id, "Ignoring stage for finished build");
            return;
        }
        match self.stages.iter_mut().find(|s| s.stage_id == execution.stage_id) {
            Some(slot) => *slot = execution,
            None => self.stages.push(execution),
        }
    }

    /// Moves the record into a terminal status.
    pub(crate) fn finalize(&mut self, status: BuildStatus, error: Option<String>) {
        if self.is_terminal() {
            warn!(build_id = %self.id, "Build already finalized");
            return;
        }
        self.status = status;
        self.error = error;
        self.ended_at = Some(now_utc());
    }

    /// Returns a compact summary for history listings.
    #[must_use]
    pub fn summary(&self) -> BuildSummary {
        BuildSummary {
            id: self.id,
            pipeline: self.pipeline.clone(),
            trigger: self.trigger,
            branch: self.branch.clone(),
            commit: self.commit.clone(),
            environment: self.environment.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_ms: self.duration_ms(),
            stage_count: self.stages.len(),
            failed_stages: self.stages_with_status(StageStatus::Failed),
        }
    }

    /// Notification payload describing the build.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "build_id": self.id,
            "pipeline": self.pipeline,
            "trigger": self.trigger,
            "branch": self.branch,
            "commit": self.commit,
            "environment": self.environment,
            "status": self.status,
            "duration_ms": self.duration_ms(),
            "failed_stages": self.stages_with_status(StageStatus::Failed),
            "error": self.error,
        })
    }
}

/// Summary of a build for history listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    /// The build id.
    pub id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// What started the build.
    pub trigger: TriggerKind,
    /// The branch.
    pub branch: String,
    /// The commit.
    pub commit: Option<String>,
    /// The environment.
    pub environment: String,
    /// The build status.
    pub status: BuildStatus,
    /// Start time.
    pub started_at: Timestamp,
    /// End time.
    pub ended_at: Option<Timestamp>,
    /// Total duration.
    pub duration_ms: Option<u64>,
    /// Number of recorded stage executions.
    pub stage_count: usize,
    /// Failed stage ids.
    pub failed_stages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactMap, SkipReason};
    use crate::errors::StageError;

    fn record() -> BuildRecord {
        let trigger = Trigger::new(TriggerKind::Manual, "main").with_commit("abc");
        BuildRecord::start("ci", &trigger)
    }

    #[test]
    fn test_start_copies_trigger() {
        let record = record();
        assert_eq!(record.status, BuildStatus::Running);
        assert_eq!(record.branch, "main");
        assert_eq!(record.commit.as_deref(), Some("abc"));
        assert!(record.stages.is_empty());
        assert!(record.ended_at.is_none());
    }

    #[test]
    fn test_stage_lookup_and_order() {
        let mut record = record();
        record.record_stage(StageExecution::skipped("b", SkipReason::BuildAborted));
        record.record_stage(StageExecution::skipped("a", SkipReason::BuildAborted));

        assert!(record.stage("a").is_some());
        assert!(record.stage("c").is_none());
        assert_eq!(record.stages_with_status(StageStatus::Skipped), vec!["b", "a"]);
    }

    #[test]
    fn test_update_stage_replaces_in_place() {
        let mut record = record();
        record.record_stage(StageExecution::new("lint"));
        record.record_stage(StageExecution::new("test"));

        let mut lint = StageExecution::new("lint");
        lint.start();
        lint.succeed(ArtifactMap::new());
        record.update_stage(lint);
        record.update_stage(StageExecution::skipped("deploy", SkipReason::AwaitingApproval));

        let order: Vec<_> = record.stages.iter().map(|s| s.stage_id.as_str()).collect();
        assert_eq!(order, vec!["lint", "test", "deploy"]);
        assert_eq!(record.stage("lint").unwrap().status, StageStatus::Success);
        assert_eq!(record.stage("test").unwrap().status, StageStatus::Pending);
    }

    #[test]
    fn test_finalized_record_is_frozen() {
        let mut record = record();
        record.finalize(BuildStatus::Success, None);
        record.record_stage(StageExecution::new("late"));
        record.finalize(BuildStatus::Failed, Some("late".to_string()));

        assert_eq!(record.status, BuildStatus::Success);
        assert!(record.stages.is_empty());
        assert!(record.error.is_none());
        assert!(record.duration_ms().is_some());
    }

    #[test]
    fn test_summary_lists_failed_stages() {
        let mut record = record();
        let mut failed = StageExecution::new("test");
        failed.start();
        failed.fail(StageError::execution("assertion failed"));
        record.record_stage(failed);
        record.finalize(BuildStatus::Failed, None);

        let summary = record.summary();
        assert_eq!(summary.failed_stages, vec!["test"]);
        assert_eq!(summary.stage_count, 1);
        assert_eq!(record.to_payload()["status"], "failed");
    }
}
