//! The context handed to a stage's work callable.

use super::BuildContext;
use crate::core::{ArtifactKey, ArtifactMap, LogEntry};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Context for one stage execution.
///
/// Cloning is cheap and clones share the same log and artifact buffers.
/// Artifacts emitted here only reach the artifact store if the stage
/// succeeds.
#[derive(Debug, Clone)]
pub struct StageContext {
    build: Arc<BuildContext>,
    stage_id: String,
    logs: Arc<Mutex<Vec<LogEntry>>>,
    emitted: Arc<Mutex<ArtifactMap>>,
}

impl StageContext {
    /// Creates a stage context.
    #[must_use]
    pub fn new(build: Arc<BuildContext>, stage_id: impl Into<String>) -> Self {
        Self {
            build,
            stage_id: stage_id.into(),
            logs: Arc::new(Mutex::new(Vec::new())),
            emitted: Arc::new(Mutex::new(ArtifactMap::new())),
        }
    }

    /// Returns the stage id.
    #[must_use]
    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    /// Returns the build id.
    #[must_use]
    pub fn build_id(&self) -> Uuid {
        self.build.build_id()
    }

    /// Returns the branch being built.
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.build.trigger().branch
    }

    /// Returns the commit being built.
    #[must_use]
    pub fn commit(&self) -> Option<&str> {
        self.build.trigger().commit.as_deref()
    }

    /// Returns the target environment.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.build.trigger().environment
    }

    /// Appends a line to the stage log.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(build_id = %self.build_id(), stage = %self.stage_id, "{}", message);
        self.logs.lock().push(LogEntry::now(message));
    }

    /// Records an artifact produced by this stage.
    ///
    /// A later value for the same name replaces the earlier one.
    pub fn emit_artifact(&self, name: impl Into<String>, value: serde_json::Value) {
        self.emitted.lock().insert(name.into(), value);
    }

    /// Reads an artifact produced by an earlier stage of this build.
    #[must_use]
    pub fn artifact(&self, stage_id: &str, name: &str) -> Option<serde_json::Value> {
        self.build
            .artifacts()
            .get(&ArtifactKey::new(self.build_id(), stage_id, name))
    }

    /// Returns the log lines recorded so far.
    #[must_use]
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().clone()
    }

    /// Takes the artifacts emitted so far.
    pub(crate) fn take_emitted(&self) -> ArtifactMap {
        std::mem::take(&mut *self.emitted.lock())
    }
}
