//! Wave-by-wave build orchestration.

use super::{InMemoryStageCache, StageCache, StageDefinition, StageExecutor, StageGraph, Wave};
use crate::build::{BuildHistory, BuildRecord, Trigger};
use crate::config::{AbortPolicy, RunnerConfig};
use crate::context::BuildContext;
use crate::core::{ArtifactStore, BuildStatus, SkipReason, StageExecution};
use crate::errors::{BuildAbortedError, BuildflowError, GraphError, StageError};
use crate::events::{NotificationEvent, NotificationSink, Notifier};
use std::sync::Arc;
use tracing::{debug, debug_span, info, info_span, warn, Instrument};

/// Runs builds of one pipeline.
///
/// The artifact store, cache and history are shared handles, so several
/// runners (or several concurrent builds of one runner) can share them.
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    pipeline: String,
    config: RunnerConfig,
    artifacts: Arc<ArtifactStore>,
    cache: Arc<dyn StageCache>,
    notifier: Notifier,
    history: Arc<BuildHistory>,
}

/// The full result of one build, before it is reduced for callers.
struct BuildRun {
    record: BuildRecord,
    graph_error: Option<GraphError>,
    failed_required: Vec<String>,
}

impl PipelineRunner {
    /// Creates a runner with in-memory state and no notifications.
    #[must_use]
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            config: RunnerConfig::default(),
            artifacts: Arc::new(ArtifactStore::new()),
            cache: Arc::new(InMemoryStageCache::new()),
            notifier: Notifier::default(),
            history: Arc::new(BuildHistory::new()),
        }
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder(pipeline: impl Into<String>) -> PipelineRunnerBuilder {
        PipelineRunnerBuilder::new(pipeline)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns the runner configuration.
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Returns the build history.
    #[must_use]
    pub const fn history(&self) -> &Arc<BuildHistory> {
        &self.history
    }

    /// Returns the artifact store.
    #[must_use]
    pub const fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    /// Returns the stage cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<dyn StageCache> {
        &self.cache
    }

    /// Runs one build to completion.
    ///
    /// Graph errors and stage failures are reported through the returned
    /// record, which is also appended to the history.
    pub async fn run(&self, stages: &[StageDefinition], trigger: Trigger) -> BuildRecord {
        self.execute(stages, trigger).await.record
    }

    /// Runs one build and turns a failed build into an error.
    ///
    /// # Errors
    ///
    /// Returns [`BuildflowError::Graph`] if the stage graph is invalid and
    /// [`BuildflowError::Aborted`] if a required stage failed. The build is
    /// recorded in the history in both cases.
    pub async fn run_strict(
        &self,
        stages: &[StageDefinition],
        trigger: Trigger,
    ) -> Result<BuildRecord, BuildflowError> {
        let run = self.execute(stages, trigger).await;
        if let Some(err) = run.graph_error {
            return Err(err.into());
        }
        if run.record.status == BuildStatus::Failed {
            return Err(BuildAbortedError::new(run.record, run.failed_required).into());
        }
        Ok(run.record)
    }

    async fn execute(&self, stages: &[StageDefinition], trigger: Trigger) -> BuildRun {
        let mut record = BuildRecord::start(&self.pipeline, &trigger);
        let span = info_span!("build", build_id = %record.id, pipeline = %self.pipeline);

        async move {
            info!(branch = %record.branch, trigger = ?record.trigger, "Build started");
            self.history.track(&record);
            self.notifier
                .send(NotificationEvent::BuildStarted, record.to_payload())
                .await;

            let graph = match StageGraph::build(stages) {
                Ok(graph) => graph,
                Err(err) => {
                    warn!(code = err.code(), error = %err, "Stage graph rejected");
                    record.finalize(BuildStatus::Failed, Some(err.to_string()));
                    self.complete(&record, NotificationEvent::BuildFailed).await;
                    return BuildRun {
                        record,
                        graph_error: Some(err),
                        failed_required: Vec::new(),
                    };
                }
            };

            let build = Arc::new(BuildContext::new(
                record.id,
                &self.pipeline,
                trigger,
                self.artifacts.clone(),
                self.cache.clone(),
            ));
            let executor = StageExecutor::new(self.notifier.clone(), self.config.default_stage_timeout)
                .with_cancellation(self.config.abort_policy == AbortPolicy::CancelSiblings)
                .with_progress(self.history.clone());

            let mut failed_required = Vec::new();
            for wave in graph.waves() {
                if !failed_required.is_empty() {
                    for stage in &wave.stages {
                        record.record_stage(StageExecution::skipped(&stage.id, SkipReason::BuildAborted));
                    }
                    self.history.track(&record);
                    continue;
                }

                for stage in &wave.stages {
                    record.record_stage(StageExecution::new(&stage.id));
                }
                self.history.track(&record);

                for (stage, execution) in self.run_wave(wave, &executor, &build).await {
                    if stage.required && execution.status.is_failure() {
                        failed_required.push(stage.id.clone());
                    }
                    record.update_stage(execution);
                }
                self.history.track(&record);

                if !failed_required.is_empty() {
                    info!(
                        wave = wave.index,
                        failed = ?failed_required,
                        "Required stage failed, skipping remaining waves"
                    );
                }
            }

            if failed_required.is_empty() {
                record.finalize(BuildStatus::Success, None);
                info!(duration_ms = ?record.duration_ms(), "Build succeeded");
                self.complete(&record, NotificationEvent::BuildSuccess).await;
            } else {
                let message = format!("required stages failed: {}", failed_required.join(", "));
                record.finalize(BuildStatus::Failed, Some(message));
                warn!(duration_ms = ?record.duration_ms(), failed = ?failed_required, "Build failed");
                self.complete(&record, NotificationEvent::BuildFailed).await;
            }

            BuildRun {
                record,
                graph_error: None,
                failed_required,
            }
        }
        .instrument(span)
        .await
    }

    /// Runs one wave: parallel stages concurrently, then sequential stages in order.
    async fn run_wave(
        &self,
        wave: &Wave,
        executor: &StageExecutor,
        build: &Arc<BuildContext>,
    ) -> Vec<(Arc<StageDefinition>, StageExecution)> {
        let (parallel, sequential) = wave.partition();
        debug!(wave = wave.index, stages = ?wave.ids(), "Starting wave");
        let policy = self.config.abort_policy;
        let mut results = Vec::with_capacity(wave.stages.len());

        let handles: Vec<_> = parallel
            .iter()
            .map(|stage| {
                let stage = stage.clone();
                let executor = executor.clone();
                let build = build.clone();
                let span = debug_span!("stage", stage = %stage.id, wave = wave.index);
                tokio::spawn(
                    async move { run_stage(&executor, &stage, &build, policy).await }.instrument(span),
                )
            })
            .collect();

        let joined = futures::future::join_all(handles).await;
        for (stage, joined) in parallel.into_iter().zip(joined) {
            let execution = joined.unwrap_or_else(|err| {
                warn!(stage = %stage.id, error = %err, "Stage task did not complete");
                let mut execution = StageExecution::new(&stage.id);
                execution.fail(StageError::execution(format!("stage task failed: {err}")));
                execution
            });
            results.push((stage, execution));
        }

        for stage in sequential {
            let execution = if policy == AbortPolicy::CancelSiblings && build.cancellation().is_cancelled() {
                StageExecution::skipped(&stage.id, SkipReason::BuildAborted)
            } else {
                let span = debug_span!("stage", stage = %stage.id, wave = wave.index);
                run_stage(executor, &stage, build, policy).instrument(span).await
            };
            results.push((stage, execution));
        }

        results
    }

    /// Archives a finalized build and releases its artifacts.
    ///
    /// The record keeps every published artifact on its executions, so the
    /// store only holds values while the build runs.
    async fn complete(&self, record: &BuildRecord, event: NotificationEvent) {
        self.artifacts.clear_build(record.id);
        self.history.archive(record.clone());
        self.notifier.send(event, record.to_payload()).await;
    }
}

async fn run_stage(
    executor: &StageExecutor,
    stage: &StageDefinition,
    build: &Arc<BuildContext>,
    policy: AbortPolicy,
) -> StageExecution {
    let execution = executor.run(stage, build).await;
    if policy == AbortPolicy::CancelSiblings && stage.required && execution.status.is_failure() {
        build
            .cancellation()
            .cancel(format!("required stage '{}' failed", stage.id));
    }
    execution
}

/// Builder for [`PipelineRunner`].
#[derive(Debug)]
pub struct PipelineRunnerBuilder {
    runner: PipelineRunner,
}

impl PipelineRunnerBuilder {
    fn new(pipeline: impl Into<String>) -> Self {
        Self {
            runner: PipelineRunner::new(pipeline),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.runner.config = config;
        self
    }

    /// Shares an artifact store.
    #[must_use]
    pub fn artifacts(mut self, artifacts: Arc<ArtifactStore>) -> Self {
        self.runner.artifacts = artifacts;
        self
    }

    /// Shares a stage cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn StageCache>) -> Self {
        self.runner.cache = cache;
        self
    }

    /// Sets the notification sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.runner.notifier = Notifier::new(sink);
        self
    }

    /// Shares a build history.
    #[must_use]
    pub fn history(mut self, history: Arc<BuildHistory>) -> Self {
        self.runner.history = history;
        self
    }

    /// Validates the configuration and builds the runner.
    ///
    /// # Errors
    ///
    /// Returns [`BuildflowError::Config`] for an invalid configuration.
    pub fn build(self) -> Result<PipelineRunner, BuildflowError> {
        self.runner.config.validate()?;
        Ok(self.runner)
    }
}
