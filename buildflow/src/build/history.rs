//! Append-only build history and the query surface.

use super::{BuildRecord, BuildSummary};
use crate::core::StageExecution;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Process-wide history of builds.
///
/// Running builds are visible through a snapshot refreshed by the runner;
/// finished builds are appended once and never changed.
#[derive(Debug, Default)]
pub struct BuildHistory {
    active: RwLock<HashMap<Uuid, BuildRecord>>,
    completed: RwLock<Vec<BuildRecord>>,
}

impl BuildHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a snapshot of a running build.
    pub(crate) fn track(&self, record: &BuildRecord) {
        self.active.write().insert(record.id, record.clone());
    }

    /// Takes ownership of a finished build.
    pub(crate) fn archive(&self, record: BuildRecord) {
        let id = record.id;
        self.completed.write().push(record);
        self.active.write().remove(&id);
    }

    /// Replaces one stage in the snapshot of a running build.
    pub(crate) fn update_stage(&self, build_id: Uuid, execution: &StageExecution) {
        if let Some(record) = self.active.write().get_mut(&build_id) {
            record.update_stage(execution.clone());
        }
    }

    /// Returns a snapshot of a running or finished build.
    ///
    /// Finished builds take precedence over a snapshot still being retired.
    #[must_use]
    pub fn get_build_status(&self, build_id: Uuid) -> Option<BuildRecord> {
        if let Some(record) = self.completed.read().iter().rev().find(|r| r.id == build_id) {
            return Some(record.clone());
        }
        self.active.read().get(&build_id).cloned()
    }

    /// Returns up to `limit` finished builds, most recent first.
    #[must_use]
    pub fn get_build_history(&self, limit: usize) -> Vec<BuildSummary> {
        self.completed
            .read()
            .iter()
            .rev()
            .take(limit)
            .map(BuildRecord::summary)
            .collect()
    }

    /// Returns summaries of builds still running.
    #[must_use]
    pub fn running_builds(&self) -> Vec<BuildSummary> {
        let mut running: Vec<_> = self.active.read().values().map(BuildRecord::summary).collect();
        running.sort_by_key(|s| s.started_at);
        running
    }

    /// Returns the number of finished builds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.completed.read().len()
    }

    /// Returns true if no build has finished yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.read().is_empty()
    }
}
