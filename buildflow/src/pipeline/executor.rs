//! Single-stage execution: approval gate, cache, timeout and artifact capture.

use super::{CachedStageResult, StageDefinition};
use crate::build::BuildHistory;
use crate::context::{BuildContext, StageContext};
use crate::core::{ArtifactMap, SkipReason, StageExecution, StageStatus};
use crate::errors::StageError;
use crate::events::{NotificationEvent, Notifier};
use crate::stages::StageOutcome;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs one stage and produces its execution record.
///
/// Stage errors never escape: a failing, panicking or timed-out work
/// callable yields a `Failed` execution. There are no retries here.
#[derive(Debug, Clone)]
pub struct StageExecutor {
    notifier: Notifier,
    default_timeout: Duration,
    observe_cancellation: bool,
    progress: Option<Arc<BuildHistory>>,
}

impl StageExecutor {
    /// Creates an executor.
    #[must_use]
    pub const fn new(notifier: Notifier, default_timeout: Duration) -> Self {
        Self {
            notifier,
            default_timeout,
            observe_cancellation: false,
            progress: None,
        }
    }

    /// Makes running work race against the build's cancellation token.
    #[must_use]
    pub const fn with_cancellation(mut self, enabled: bool) -> Self {
        self.observe_cancellation = enabled;
        self
    }

    /// Publishes every status change to the live snapshot of the build.
    #[must_use]
    pub fn with_progress(mut self, history: Arc<BuildHistory>) -> Self {
        self.progress = Some(history);
        self
    }

    /// Runs a stage to a terminal status.
    pub async fn run(&self, stage: &StageDefinition, build: &Arc<BuildContext>) -> StageExecution {
        let mut execution = StageExecution::new(&stage.id);

        if stage.manual && !build.is_approved(&stage.id) {
            debug!(stage = %stage.id, "Manual stage not approved for this build, skipping");
            execution.skip(SkipReason::AwaitingApproval);
            self.publish(build, &execution);
            return execution;
        }

        let cache_key = stage.cacheable.then(|| stage.effective_cache_key());
        let cached = match &cache_key {
            Some(key) => build.cache().lookup(key).await.filter(|hit| {
                let usable = hit.status.is_success();
                if !usable {
                    debug!(stage = %stage.id, cache_key = %key, status = %hit.status, "Ignoring unsuccessful cache entry");
                }
                usable
            }),
            None => None,
        };

        execution.start();
        self.publish(build, &execution);
        self.notify(NotificationEvent::StageStarted, stage, build, &execution)
            .await;

        if let (Some(key), Some(hit)) = (&cache_key, cached) {
            debug!(stage = %stage.id, cache_key = %key, "Cache hit");
            execution.push_log(format!("restored from cache entry {key}"));
            match build.artifacts().put_all(build.build_id(), &stage.id, &hit.artifacts) {
                Ok(()) => execution.cache_hit(hit.artifacts),
                Err(conflict) => execution.fail(conflict.into()),
            }
            self.finish(stage, build, &execution).await;
            return execution;
        }

        let ctx = StageContext::new(build.clone(), &stage.id);
        let timeout = stage.effective_timeout(self.default_timeout);
        let result = self.invoke(stage, &ctx, timeout, build).await;
        execution.logs.extend(ctx.logs());

        match result {
            Ok(outcome) => {
                let artifacts = collect_artifacts(stage, &ctx, outcome, &mut execution);
                match build.artifacts().put_all(build.build_id(), &stage.id, &artifacts) {
                    Ok(()) => {
                        if let Some(key) = &cache_key {
                            let entry = CachedStageResult::new(artifacts.clone())
                                .with_source_build(build.build_id());
                            build.cache().store(key, entry).await;
                        }
                        execution.succeed(artifacts);
                    }
                    Err(conflict) => execution.fail(conflict.into()),
                }
            }
            Err(error) => execution.fail(error),
        }

        self.finish(stage, build, &execution).await;
        execution
    }

    async fn invoke(
        &self,
        stage: &StageDefinition,
        ctx: &StageContext,
        timeout: Duration,
        build: &BuildContext,
    ) -> Result<StageOutcome, StageError> {
        // Dropping the work future on timeout or cancellation stops it at its next await point.
        let guarded = tokio::time::timeout(timeout, AssertUnwindSafe(stage.work.run(ctx)).catch_unwind());

        let result = if self.observe_cancellation {
            tokio::select! {
                biased;
                result = guarded => result,
                () = build.cancellation().cancelled() => {
                    return Err(StageError::Cancelled {
                        reason: build.cancellation().reason().unwrap_or_default(),
                    });
                }
            }
        } else {
            guarded.await
        };

        match result {
            Err(_elapsed) => Err(StageError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(panic)) => Err(StageError::execution(format!(
                "stage panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Ok(Ok(Err(error))) => Err(StageError::execution(format!("{error:#}"))),
            Ok(Ok(Ok(outcome))) => Ok(outcome),
        }
    }

    fn publish(&self, build: &BuildContext, execution: &StageExecution) {
        if let Some(history) = &self.progress {
            history.update_stage(build.build_id(), execution);
        }
    }

    async fn finish(&self, stage: &StageDefinition, build: &BuildContext, execution: &StageExecution) {
        self.publish(build, execution);
        let event = if execution.status.is_success() {
            debug!(
                stage = %stage.id,
                status = %execution.status,
                duration_ms = ?execution.duration_ms(),
                "Stage finished"
            );
            NotificationEvent::StageSuccess
        } else {
            warn!(
                stage = %stage.id,
                required = stage.required,
                error = ?execution.error,
                "Stage failed"
            );
            NotificationEvent::StageFailed
        };
        self.notify(event, stage, build, execution).await;
    }

    async fn notify(
        &self,
        event: NotificationEvent,
        stage: &StageDefinition,
        build: &BuildContext,
        execution: &StageExecution,
    ) {
        let payload = serde_json::json!({
            "build_id": build.build_id(),
            "pipeline": build.pipeline(),
            "stage": stage.id,
            "name": stage.name,
            "required": stage.required,
            "status": execution.status,
            "cached": execution.status == StageStatus::Cached,
            "duration_ms": execution.duration_ms(),
            "error": execution.error.as_ref().map(ToString::to_string),
            "artifacts": execution.artifacts.keys().collect::<Vec<_>>(),
        });
        self.notifier.send(event, payload).await;
    }
}

/// Merges emitted and returned artifacts and keeps the published ones.
fn collect_artifacts(
    stage: &StageDefinition,
    ctx: &StageContext,
    outcome: StageOutcome,
    execution: &mut StageExecution,
) -> ArtifactMap {
    let mut produced = ctx.take_emitted();
    produced.extend(outcome.artifacts);

    let (published, dropped): (ArtifactMap, ArtifactMap) =
        produced.into_iter().partition(|(name, _)| stage.publishes(name));

    for name in dropped.keys() {
        debug!(stage = %stage.id, artifact = %name, "Dropping undeclared artifact");
        execution.push_log(format!("dropped undeclared artifact '{name}'"));
    }
    for name in stage.declared_artifacts.iter().filter(|n| !published.contains_key(*n)) {
        warn!(stage = %stage.id, artifact = %name, "Declared artifact was not produced");
        execution.push_log(format!("declared artifact '{name}' was not produced"));
    }

    published
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
