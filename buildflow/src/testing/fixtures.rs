//! Context fixtures for stage tests.

use std::sync::Arc;
use uuid::Uuid;

use crate::build::{Trigger, TriggerKind};
use crate::context::{BuildContext, StageContext};
use crate::core::ArtifactStore;
use crate::pipeline::{InMemoryStageCache, StageCache};

/// Builder for a build context used outside a runner.
#[derive(Debug)]
pub struct TestBuild {
    /// Pipeline name.
    pub pipeline: String,
    /// Trigger of the build.
    pub trigger: Trigger,
    /// Shared artifact store.
    pub artifacts: Arc<ArtifactStore>,
    /// Shared stage cache.
    pub cache: Arc<dyn StageCache>,
}

impl Default for TestBuild {
    fn default() -> Self {
        Self {
            pipeline: "test-pipeline".to_string(),
            trigger: Trigger::new(TriggerKind::Manual, "main"),
            artifacts: Arc::new(ArtifactStore::new()),
            cache: Arc::new(InMemoryStageCache::new()),
        }
    }
}

impl TestBuild {
    /// Creates a fixture on branch `main`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Approves a manual stage.
    #[must_use]
    pub fn with_approval(mut self, stage_id: impl Into<String>) -> Self {
        self.trigger = self.trigger.approve(stage_id);
        self
    }

    /// Shares an artifact store.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Arc<ArtifactStore>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Shares a stage cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn StageCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Builds a context with a fresh build id.
    #[must_use]
    pub fn build_context(&self) -> Arc<BuildContext> {
        Arc::new(BuildContext::new(
            Uuid::now_v7(),
            &self.pipeline,
            self.trigger.clone(),
            self.artifacts.clone(),
            self.cache.clone(),
        ))
    }
}

/// A build context with default settings.
#[must_use]
pub fn build_context() -> Arc<BuildContext> {
    TestBuild::new().build_context()
}

/// A stage context inside a fresh default build.
#[must_use]
pub fn stage_context(stage_id: &str) -> StageContext {
    StageContext::new(build_context(), stage_id)
}
