//! # Buildflow
//!
//! A dependency-aware build pipeline engine.
//!
//! Buildflow runs the stages of a build in waves computed from their
//! dependency graph, with support for:
//!
//! - **Wave scheduling**: parallel stages of a wave run concurrently, sequential ones in declared order
//! - **Failure handling**: required failures abort the remaining waves, optional ones are tolerated
//! - **Manual gates**: stages that only run when the build trigger approves them
//! - **Caching**: successful stage results reused across builds
//! - **Artifacts**: write-once values published by one stage and read by later ones
//! - **Notifications**: build and stage lifecycle events delivered to pluggable sinks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use buildflow::prelude::*;
//!
//! let stages = vec![
//!     StageDefinition::new("checkout", Arc::new(CheckoutWork)),
//!     StageDefinition::new("test", Arc::new(TestWork)).depends_on(["checkout"]).parallel(),
//!     StageDefinition::new("lint", Arc::new(LintWork)).depends_on(["checkout"]).parallel(),
//!     StageDefinition::new("deploy", Arc::new(DeployWork)).depends_on(["test", "lint"]).manual(),
//! ];
//!
//! let runner = PipelineRunner::builder("web-app").build()?;
//! let record = runner.run(&stages, Trigger::new(TriggerKind::Webhook, "main")).await;
//! let recent = runner.history().get_build_history(10);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod build;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::build::{BuildHistory, BuildRecord, BuildSummary, Trigger, TriggerKind};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{AbortPolicy, LogConfig, RunnerConfig};
    pub use crate::context::{BuildContext, StageContext};
    pub use crate::core::{
        ArtifactKey, ArtifactMap, ArtifactStore, BuildStatus, LogEntry, SkipReason,
        StageExecution, StageStatus,
    };
    pub use crate::errors::{
        ArtifactConflictError, BuildAbortedError, BuildflowError, GraphError, StageError,
    };
    pub use crate::events::{
        CollectingNotificationSink, FanoutNotificationSink, LoggingNotificationSink,
        NoOpNotificationSink, NotificationEvent, NotificationSink,
    };
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        CachedStageResult, InMemoryStageCache, PipelineRunner, StageCache, StageDefinition,
        StageGraph,
    };
    pub use crate::stages::{FnWork, StageOutcome, StageWork};
    pub use crate::utils::{iso_timestamp, Timestamp};
    pub use std::sync::Arc;
}
