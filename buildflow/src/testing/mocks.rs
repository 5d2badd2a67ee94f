//! Stage work doubles for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use crate::context::StageContext;
use crate::core::ArtifactMap;
use crate::stages::{StageOutcome, StageWork};

/// Work that always succeeds with fixed artifacts.
#[derive(Debug, Clone, Default)]
pub struct SuccessWork {
    artifacts: ArtifactMap,
}

impl SuccessWork {
    /// Creates work that succeeds without artifacts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artifact to every outcome.
    #[must_use]
    pub fn with_artifact(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.artifacts.insert(name.into(), value);
        self
    }
}

#[async_trait]
impl StageWork for SuccessWork {
    async fn run(&self, _ctx: &StageContext) -> anyhow::Result<StageOutcome> {
        Ok(StageOutcome::from_artifacts(self.artifacts.clone()))
    }
}

/// Work that always fails.
#[derive(Debug, Clone)]
pub struct FailingWork {
    error: String,
}

impl FailingWork {
    /// Creates work failing with the given message.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[async_trait]
impl StageWork for FailingWork {
    async fn run(&self, ctx: &StageContext) -> anyhow::Result<StageOutcome> {
        ctx.log(format!("failing: {}", self.error));
        anyhow::bail!("{}", self.error)
    }
}

/// Work that sleeps before succeeding.
#[derive(Debug, Clone)]
pub struct SlowWork {
    delay: Duration,
}

impl SlowWork {
    /// Creates slow work.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Creates slow work with a delay in milliseconds.
    #[must_use]
    pub const fn with_delay_ms(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

#[async_trait]
impl StageWork for SlowWork {
    async fn run(&self, _ctx: &StageContext) -> anyhow::Result<StageOutcome> {
        tokio::time::sleep(self.delay).await;
        Ok(StageOutcome::empty())
    }
}

/// Work that counts its invocations.
#[derive(Debug, Default)]
pub struct CountingWork {
    artifacts: ArtifactMap,
    call_count: Mutex<usize>,
    stages: Mutex<Vec<String>>,
}

impl CountingWork {
    /// Creates counting work.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artifact to every outcome.
    #[must_use]
    pub fn with_artifact(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.artifacts.insert(name.into(), value);
        self
    }

    /// Returns the number of times the work ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// Returns the stage ids of each call, in call order.
    #[must_use]
    pub fn recorded_stages(&self) -> Vec<String> {
        self.stages.lock().clone()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        *self.call_count.lock() = 0;
        self.stages.lock().clear();
    }
}

#[async_trait]
impl StageWork for CountingWork {
    async fn run(&self, ctx: &StageContext) -> anyhow::Result<StageOutcome> {
        *self.call_count.lock() += 1;
        self.stages.lock().push(ctx.stage_id().to_string());
        Ok(StageOutcome::from_artifacts(self.artifacts.clone()))
    }
}

/// Work that panics.
#[derive(Debug, Clone)]
pub struct PanickingWork {
    message: String,
}

impl PanickingWork {
    /// Creates work panicking with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl StageWork for PanickingWork {
    #[allow(clippy::panic)]
    async fn run(&self, _ctx: &StageContext) -> anyhow::Result<StageOutcome> {
        panic!("{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::stage_context;
    use serde_json::json;

    #[tokio::test]
    async fn test_success_work() {
        let work = SuccessWork::new().with_artifact("digest", json!("sha256:ab"));
        let outcome = work.run(&stage_context("build")).await.unwrap();
        assert_eq!(outcome.artifacts.get("digest"), Some(&json!("sha256:ab")));
    }

    #[tokio::test]
    async fn test_failing_work() {
        let ctx = stage_context("test");
        let err = FailingWork::new("2 tests failed").run(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "2 tests failed");
        assert_eq!(ctx.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_counting_work() {
        let work = CountingWork::new();
        work.run(&stage_context("a")).await.unwrap();
        work.run(&stage_context("b")).await.unwrap();

        assert_eq!(work.call_count(), 2);
        assert_eq!(work.recorded_stages(), vec!["a", "b"]);

        work.reset();
        assert_eq!(work.call_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_work() {
        let start = std::time::Instant::now();
        SlowWork::with_delay_ms(20).run(&stage_context("wait")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
