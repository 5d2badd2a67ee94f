//! Stage work callables.
//!
//! The engine treats the work of a stage as an opaque capability: anything
//! implementing [`StageWork`] can be attached to a stage definition.

use crate::context::StageContext;
use crate::core::ArtifactMap;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;

/// The successful result of a stage's work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutcome {
    /// Artifacts produced by the work, by name.
    pub artifacts: ArtifactMap,
}

impl StageOutcome {
    /// An outcome without artifacts.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// An outcome carrying the given artifacts.
    #[must_use]
    pub const fn from_artifacts(artifacts: ArtifactMap) -> Self {
        Self { artifacts }
    }

    /// Adds an artifact.
    #[must_use]
    pub fn with_artifact(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.artifacts.insert(name.into(), value);
        self
    }
}

/// The work performed by a stage.
///
/// Implementations must be safe to run concurrently with other stages'
/// work; the only shared state is what the context exposes.
#[async_trait]
pub trait StageWork: Send + Sync + Debug {
    /// Runs the work.
    ///
    /// Returning an error marks the stage as failed.
    async fn run(&self, ctx: &StageContext) -> anyhow::Result<StageOutcome>;
}

/// Work backed by an async closure.
pub struct FnWork<F> {
    label: String,
    func: F,
}

impl<F, Fut> FnWork<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<StageOutcome>> + Send,
{
    /// Wraps an async closure.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
        }
    }
}

impl<F> Debug for FnWork<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnWork").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F, Fut> StageWork for FnWork<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<StageOutcome>> + Send,
{
    async fn run(&self, ctx: &StageContext) -> anyhow::Result<StageOutcome> {
        (self.func)(ctx.clone()).await
    }
}

/// Work that succeeds immediately without artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpWork;

#[async_trait]
impl StageWork for NoOpWork {
    async fn run(&self, _ctx: &StageContext) -> anyhow::Result<StageOutcome> {
        Ok(StageOutcome::empty())
    }
}
