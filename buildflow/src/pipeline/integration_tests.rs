//! End-to-end tests for build execution.

#[cfg(test)]
mod tests {
    use crate::build::{BuildHistory, Trigger, TriggerKind};
    use crate::config::{AbortPolicy, RunnerConfig};
    use crate::context::StageContext;
    use crate::core::{BuildStatus, SkipReason, StageStatus};
    use crate::errors::{BuildflowError, GraphError, StageError};
    use crate::events::{CollectingNotificationSink, MockNotificationSink, NotificationEvent};
    use crate::pipeline::{InMemoryStageCache, PipelineRunner, StageDefinition};
    use crate::stages::{FnWork, NoOpWork, StageOutcome};
    use crate::testing::{
        assert_artifact, assert_stage_failed, assert_stage_skipped, assert_stage_status,
        assert_stage_succeeded, CountingWork, FailingWork, PanickingWork, SlowWork, SuccessWork,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn trigger() -> Trigger {
        Trigger::new(TriggerKind::Webhook, "main").with_commit("4be1c0d")
    }

    fn ok(id: &str) -> StageDefinition {
        StageDefinition::new(id, Arc::new(NoOpWork))
    }

    /// checkout -> install -> {lint, test} -> build
    fn ci_pipeline(test: StageDefinition) -> Vec<StageDefinition> {
        vec![
            ok("checkout"),
            ok("install").depends_on(["checkout"]),
            ok("lint").depends_on(["install"]).parallel(),
            test.depends_on(["install"]).parallel(),
            StageDefinition::new(
                "build",
                Arc::new(SuccessWork::new().with_artifact("image", json!("registry/app:4be1c0d"))),
            )
            .depends_on(["lint", "test"]),
        ]
    }

    #[tokio::test]
    async fn test_ci_pipeline_success() {
        let runner = PipelineRunner::new("ci");
        let stages = ci_pipeline(ok("test"));

        let record = runner.run(&stages, trigger()).await;

        assert_eq!(record.status, BuildStatus::Success);
        assert!(record.error.is_none());
        let order: Vec<_> = record.stages.iter().map(|s| s.stage_id.as_str()).collect();
        assert_eq!(order, vec!["checkout", "install", "lint", "test", "build"]);
        for execution in &record.stages {
            assert_stage_succeeded(execution);
        }
        assert_artifact(record.stage("build").unwrap(), "image", &json!("registry/app:4be1c0d"));
    }

    #[tokio::test]
    async fn test_required_failure_skips_later_waves() {
        let runner = PipelineRunner::new("ci");
        let stages = ci_pipeline(StageDefinition::new("test", Arc::new(FailingWork::new("3 tests failed"))));

        let record = runner.run(&stages, trigger()).await;

        assert_eq!(record.status, BuildStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("test"));
        assert_stage_failed(record.stage("test").unwrap(), "StageExecutionError");
        assert_stage_status(record.stage("lint").unwrap(), StageStatus::Success);
        assert_stage_skipped(record.stage("build").unwrap(), SkipReason::BuildAborted);
        assert_eq!(record.stages.len(), 5);
    }

    #[tokio::test]
    async fn test_optional_failure_does_not_abort() {
        let runner = PipelineRunner::new("ci");
        let stages = ci_pipeline(StageDefinition::new("test", Arc::new(FailingWork::new("flaky"))).optional());

        let record = runner.run(&stages, trigger()).await;

        assert_eq!(record.status, BuildStatus::Success);
        assert_stage_status(record.stage("test").unwrap(), StageStatus::Failed);
        assert_stage_status(record.stage("build").unwrap(), StageStatus::Success);
    }

    #[tokio::test]
    async fn test_downstream_reads_upstream_artifacts() {
        let runner = PipelineRunner::new("release");
        let deploy = FnWork::new("deploy", |ctx: StageContext| async move {
            let image = ctx
                .artifact("build", "image")
                .ok_or_else(|| anyhow::anyhow!("no image to deploy"))?;
            ctx.log(format!("deploying {image} to {}", ctx.environment()));
            Ok(StageOutcome::empty().with_artifact("deployed", image))
        });
        let stages = vec![
            StageDefinition::new("build", Arc::new(SuccessWork::new().with_artifact("image", json!("app:7")))),
            StageDefinition::new("deploy", Arc::new(deploy)).depends_on(["build"]),
        ];

        let record = runner.run(&stages, trigger().with_environment("staging")).await;

        assert_eq!(record.status, BuildStatus::Success);
        let deploy = record.stage("deploy").unwrap();
        assert_artifact(deploy, "deployed", &json!("app:7"));
        assert!(deploy.logs[0].message.contains("staging"));
    }

    #[tokio::test]
    async fn test_parallel_stages_overlap() {
        let runner = PipelineRunner::new("ci");
        let stages: Vec<_> = ["unit", "integration", "e2e"]
            .into_iter()
            .map(|id| StageDefinition::new(id, Arc::new(SlowWork::with_delay_ms(100))).parallel())
            .collect();

        let start = Instant::now();
        let record = runner.run(&stages, trigger()).await;

        assert_eq!(record.status, BuildStatus::Success);
        assert!(start.elapsed() < Duration::from_millis(250), "parallel stages ran serially");
    }

    #[tokio::test]
    async fn test_sequential_stages_run_in_declared_order() {
        let runner = PipelineRunner::new("ci");
        let work = Arc::new(CountingWork::new());
        let stages = vec![
            StageDefinition::new("zeta", work.clone()),
            StageDefinition::new("alpha", work.clone()),
            StageDefinition::new("mid", work.clone()),
        ];

        runner.run(&stages, trigger()).await;

        assert_eq!(work.recorded_stages(), vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_cache_serves_second_build() {
        let cache = Arc::new(InMemoryStageCache::new());
        let runner = PipelineRunner::builder("ci").cache(cache.clone()).build().unwrap();
        let install = Arc::new(CountingWork::new().with_artifact("node_modules", json!("sha256:11aa")));
        let stages = vec![
            StageDefinition::new("install", install.clone()).cacheable(),
            ok("test").depends_on(["install"]),
        ];

        let first = runner.run(&stages, trigger()).await;
        let second = runner.run(&stages, trigger()).await;

        assert_stage_status(first.stage("install").unwrap(), StageStatus::Success);
        assert_stage_status(second.stage("install").unwrap(), StageStatus::Cached);
        assert_eq!(install.call_count(), 1);
        assert_eq!(
            first.stage("install").unwrap().artifacts,
            second.stage("install").unwrap().artifacts
        );
        assert_eq!(second.status, BuildStatus::Success);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_stage_requires_approval() {
        let runner = PipelineRunner::new("release");
        let deploy = Arc::new(CountingWork::new());
        let stages = vec![
            ok("build"),
            StageDefinition::new("deploy", deploy.clone()).depends_on(["build"]).manual(),
        ];

        let unapproved = runner.run(&stages, trigger()).await;
        assert_eq!(unapproved.status, BuildStatus::Success);
        assert_stage_skipped(unapproved.stage("deploy").unwrap(), SkipReason::AwaitingApproval);
        assert_eq!(deploy.call_count(), 0);

        let approved = runner.run(&stages, trigger().approve("deploy")).await;
        assert_stage_status(approved.stage("deploy").unwrap(), StageStatus::Success);
        assert_eq!(deploy.call_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_fails_required_stage() {
        let runner = PipelineRunner::new("ci");
        let stages = vec![
            StageDefinition::new("deploy", Arc::new(SlowWork::new(Duration::from_secs(10))))
                .with_timeout(Duration::from_millis(30)),
            ok("smoke").depends_on(["deploy"]),
        ];

        let start = Instant::now();
        let record = runner.run(&stages, trigger()).await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(record.status, BuildStatus::Failed);
        let deploy = record.stage("deploy").unwrap();
        assert_stage_failed(deploy, "StageTimeout");
        assert_eq!(deploy.error, Some(StageError::Timeout { timeout_ms: 30 }));
        assert_stage_skipped(record.stage("smoke").unwrap(), SkipReason::BuildAborted);
    }

    #[tokio::test]
    async fn test_runner_default_timeout_applies() {
        let runner = PipelineRunner::builder("ci")
            .config(RunnerConfig::new().with_default_stage_timeout(Duration::from_millis(30)))
            .build()
            .unwrap();
        let stages = vec![StageDefinition::new("hang", Arc::new(SlowWork::new(Duration::from_secs(10))))];

        let record = runner.run(&stages, trigger()).await;

        assert_stage_failed(record.stage("hang").unwrap(), "StageTimeout");
    }

    #[tokio::test]
    async fn test_panicking_stage_fails_build() {
        let runner = PipelineRunner::new("ci");
        let stages = vec![
            StageDefinition::new("flaky", Arc::new(PanickingWork::new("unexpected state"))).parallel(),
            StageDefinition::new("steady", Arc::new(SlowWork::with_delay_ms(20))).parallel(),
        ];

        let record = runner.run(&stages, trigger()).await;

        assert_eq!(record.status, BuildStatus::Failed);
        assert_stage_failed(record.stage("flaky").unwrap(), "StageExecutionError");
        assert_stage_status(record.stage("steady").unwrap(), StageStatus::Success);
    }

    #[tokio::test]
    async fn test_cycle_runs_nothing() {
        let sink = Arc::new(CollectingNotificationSink::new());
        let runner = PipelineRunner::builder("ci").sink(sink.clone()).build().unwrap();
        let work = Arc::new(CountingWork::new());
        let stages = vec![
            StageDefinition::new("a", work.clone()).depends_on(["b"]),
            StageDefinition::new("b", work.clone()).depends_on(["a"]),
        ];

        let record = runner.run(&stages, trigger()).await;

        assert_eq!(record.status, BuildStatus::Failed);
        assert!(record.stages.is_empty());
        assert!(record.error.is_some());
        assert_eq!(work.call_count(), 0);
        assert_eq!(
            sink.kinds(),
            vec![NotificationEvent::BuildStarted, NotificationEvent::BuildFailed]
        );
    }

    #[tokio::test]
    async fn test_run_strict_errors() {
        let runner = PipelineRunner::new("ci");

        let cyclic = vec![ok("a").depends_on(["a"])];
        let err = runner.run_strict(&cyclic, trigger()).await.unwrap_err();
        assert!(matches!(err, BuildflowError::Graph(GraphError::CyclicDependency { .. })));

        let failing = ci_pipeline(StageDefinition::new("test", Arc::new(FailingWork::new("boom"))));
        match runner.run_strict(&failing, trigger()).await {
            Err(BuildflowError::Aborted(aborted)) => {
                assert_eq!(aborted.failed_stages, vec!["test".to_string()]);
                assert_eq!(aborted.build_id, aborted.record.id);
                assert_eq!(aborted.record.status, BuildStatus::Failed);
            }
            other => panic!("expected aborted build, got {other:?}"),
        }

        let record = runner.run_strict(&ci_pipeline(ok("test")), trigger()).await.unwrap();
        assert_eq!(record.status, BuildStatus::Success);
        assert_eq!(runner.history().len(), 3);
    }

    #[tokio::test]
    async fn test_notification_order() {
        let sink = Arc::new(CollectingNotificationSink::new());
        let runner = PipelineRunner::builder("ci").sink(sink.clone()).build().unwrap();
        let stages = vec![
            ok("checkout"),
            ok("approve").depends_on(["checkout"]).manual(),
            StageDefinition::new("test", Arc::new(FailingWork::new("red"))).depends_on(["checkout"]).optional(),
        ];

        let record = runner.run(&stages, trigger()).await;

        assert_eq!(record.status, BuildStatus::Success);
        assert_eq!(
            sink.kinds(),
            vec![
                NotificationEvent::BuildStarted,
                NotificationEvent::StageStarted,
                NotificationEvent::StageSuccess,
                NotificationEvent::StageStarted,
                NotificationEvent::StageFailed,
                NotificationEvent::BuildSuccess,
            ]
        );
        let build_end = &sink.payloads_of(NotificationEvent::BuildSuccess)[0];
        assert_eq!(build_end["status"], "success");
    }

    #[tokio::test]
    async fn test_cached_stage_notifies_success() {
        let sink = Arc::new(CollectingNotificationSink::new());
        let runner = PipelineRunner::builder("ci").sink(sink.clone()).build().unwrap();
        let stages = vec![ok("install").cacheable()];

        runner.run(&stages, trigger()).await;
        sink.clear();
        runner.run(&stages, trigger()).await;

        let success = sink.payloads_of(NotificationEvent::StageSuccess);
        assert_eq!(success.len(), 1);
        assert_eq!(success[0]["cached"], true);
        assert_eq!(success[0]["status"], "cached");
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_affect_build() {
        let mut sink = MockNotificationSink::new();
        sink.expect_notify()
            .returning(|_, _| Err(anyhow::anyhow!("webhook returned 502")));
        let runner = PipelineRunner::builder("ci").sink(Arc::new(sink)).build().unwrap();

        let record = runner.run(&ci_pipeline(ok("test")), trigger()).await;

        assert_eq!(record.status, BuildStatus::Success);
        assert_eq!(record.stages.len(), 5);
    }

    #[tokio::test]
    async fn test_finish_wave_lets_siblings_complete() {
        let runner = PipelineRunner::new("ci");
        let stages = vec![
            StageDefinition::new("unit", Arc::new(FailingWork::new("assertion failed"))).parallel(),
            StageDefinition::new("e2e", Arc::new(SlowWork::with_delay_ms(50))).parallel(),
            ok("lint"),
            ok("package").depends_on(["unit", "e2e"]),
        ];

        let record = runner.run(&stages, trigger()).await;

        assert_eq!(record.status, BuildStatus::Failed);
        assert_stage_status(record.stage("e2e").unwrap(), StageStatus::Success);
        assert_stage_status(record.stage("lint").unwrap(), StageStatus::Success);
        assert_stage_skipped(record.stage("package").unwrap(), SkipReason::BuildAborted);
    }

    #[tokio::test]
    async fn test_cancel_siblings_stops_running_stages() {
        let runner = PipelineRunner::builder("ci")
            .config(RunnerConfig::new().with_abort_policy(AbortPolicy::CancelSiblings))
            .build()
            .unwrap();
        let stages = vec![
            StageDefinition::new("unit", Arc::new(FailingWork::new("assertion failed"))).parallel(),
            StageDefinition::new("e2e", Arc::new(SlowWork::new(Duration::from_secs(10)))).parallel(),
            ok("lint"),
        ];

        let start = Instant::now();
        let record = runner.run(&stages, trigger()).await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(record.status, BuildStatus::Failed);
        assert_stage_failed(record.stage("e2e").unwrap(), "StageCancelled");
        assert_stage_skipped(record.stage("lint").unwrap(), SkipReason::BuildAborted);
    }

    #[tokio::test]
    async fn test_history_queries() {
        let history = Arc::new(BuildHistory::new());
        let runner = PipelineRunner::builder("ci").history(history.clone()).build().unwrap();

        let mut ids = Vec::new();
        for branch in ["main", "feature/a", "feature/b"] {
            let record = runner
                .run(&[ok("checkout")], Trigger::new(TriggerKind::Webhook, branch))
                .await;
            ids.push(record.id);
        }

        let recent = history.get_build_history(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, ids[2]);
        assert_eq!(recent[1].id, ids[1]);
        assert_eq!(recent[0].branch, "feature/b");
        assert_eq!(history.get_build_history(10).len(), 3);

        let status = history.get_build_status(ids[0]).unwrap();
        assert_eq!(status.status, BuildStatus::Success);
        assert_eq!(status.stages.len(), 1);
        assert!(history.get_build_status(uuid::Uuid::now_v7()).is_none());
        assert!(history.running_builds().is_empty());
    }

    #[tokio::test]
    async fn test_running_build_is_visible() {
        let history = Arc::new(BuildHistory::new());
        let runner = PipelineRunner::builder("ci").history(history.clone()).build().unwrap();

        let probe_history = history.clone();
        let probe = FnWork::new("probe", move |ctx: StageContext| {
            let history = probe_history.clone();
            async move {
                let snapshot = history
                    .get_build_status(ctx.build_id())
                    .ok_or_else(|| anyhow::anyhow!("build not visible"))?;
                let stages: Vec<_> = snapshot
                    .stages
                    .iter()
                    .map(|s| json!([s.stage_id, s.status]))
                    .collect();
                Ok(StageOutcome::empty()
                    .with_artifact("status", json!(snapshot.status))
                    .with_artifact("stages", json!(stages)))
            }
        });
        let stages = vec![
            ok("checkout"),
            StageDefinition::new("probe", Arc::new(probe)).depends_on(["checkout"]),
        ];

        let record = runner.run(&stages, trigger()).await;

        let probe = record.stage("probe").unwrap();
        assert_artifact(probe, "status", &json!("running"));
        assert_artifact(probe, "stages", &json!([["checkout", "success"], ["probe", "running"]]));
        assert_eq!(history.get_build_status(record.id).unwrap().status, BuildStatus::Success);
    }

    #[tokio::test]
    async fn test_artifact_store_released_after_each_build() {
        let runner = PipelineRunner::new("ci");
        let stages = vec![
            StageDefinition::new("build", Arc::new(SuccessWork::new().with_artifact("image", json!("app:1")))),
            StageDefinition::new("fail", Arc::new(FailingWork::new("red"))).depends_on(["build"]),
        ];

        for _ in 0..5 {
            let record = runner.run(&stages[..1], trigger()).await;
            assert_eq!(record.status, BuildStatus::Success);
            assert_artifact(record.stage("build").unwrap(), "image", &json!("app:1"));
            assert!(runner.artifacts().is_empty());
        }

        let failed = runner.run(&stages, trigger()).await;
        assert_eq!(failed.status, BuildStatus::Failed);
        assert!(runner.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_shows_stages_of_current_wave() {
        let runner = PipelineRunner::new("ci");
        let stages = vec![
            ok("checkout"),
            StageDefinition::new("e2e", Arc::new(SlowWork::with_delay_ms(300)))
                .depends_on(["checkout"])
                .parallel(),
            ok("report").depends_on(["checkout"]),
            ok("publish").depends_on(["e2e", "report"]),
        ];

        let handle = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(&stages, trigger()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let running = runner.history().running_builds();
        assert_eq!(running.len(), 1);
        let snapshot = runner.history().get_build_status(running[0].id).unwrap();
        let statuses: Vec<_> = snapshot
            .stages
            .iter()
            .map(|s| (s.stage_id.as_str(), s.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("checkout", StageStatus::Success),
                ("e2e", StageStatus::Running),
                ("report", StageStatus::Pending),
            ]
        );

        let record = handle.await.unwrap();
        assert_eq!(record.status, BuildStatus::Success);
        assert_eq!(record.stages.len(), 4);
        assert_eq!(runner.history().get_build_status(record.id).unwrap(), record);
    }
}
