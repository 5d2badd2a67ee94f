//! Shared state for one build.

use crate::build::Trigger;
use crate::cancellation::CancellationToken;
use crate::core::ArtifactStore;
use crate::pipeline::StageCache;
use std::sync::Arc;
use uuid::Uuid;

/// State shared by every stage of one build.
///
/// The artifact store and cache are shared with other builds through the
/// runner; the cancellation token is scoped to this build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    build_id: Uuid,
    pipeline: String,
    trigger: Trigger,
    artifacts: Arc<ArtifactStore>,
    cache: Arc<dyn StageCache>,
    cancellation: Arc<CancellationToken>,
}

impl BuildContext {
    /// Creates a build context.
    #[must_use]
    pub fn new(
        build_id: Uuid,
        pipeline: impl Into<String>,
        trigger: Trigger,
        artifacts: Arc<ArtifactStore>,
        cache: Arc<dyn StageCache>,
    ) -> Self {
        Self {
            build_id,
            pipeline: pipeline.into(),
            trigger,
            artifacts,
            cache,
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    /// Returns the build id.
    #[must_use]
    pub const fn build_id(&self) -> Uuid {
        self.build_id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns the trigger of this build.
    #[must_use]
    pub const fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Returns true if the manual stage was approved for this build.
    #[must_use]
    pub fn is_approved(&self, stage_id: &str) -> bool {
        self.trigger.is_approved(stage_id)
    }

    /// Returns the shared artifact store.
    #[must_use]
    pub const fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    /// Returns the shared stage cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<dyn StageCache> {
        &self.cache
    }

    /// Returns the build-scoped cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }
}
