//! Testing utilities for buildflow pipelines.
//!
//! This module provides:
//! - Stage work doubles with scripted behaviour
//! - Build and stage context fixtures
//! - Assertions over stage executions

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_artifact, assert_stage_failed, assert_stage_skipped, assert_stage_status,
    assert_stage_succeeded,
};
pub use fixtures::{build_context, stage_context, TestBuild};
pub use mocks::{CountingWork, FailingWork, PanickingWork, SlowWork, SuccessWork};
