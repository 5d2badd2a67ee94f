//! Pipeline definition and execution.
//!
//! This module provides:
//! - Stage definitions
//! - Graph validation and wave layering
//! - The stage result cache
//! - Single-stage execution and wave-by-wave build orchestration

mod cache;
mod dag;
mod executor;
mod runner;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use cache::{generate_cache_key, CachedStageResult, InMemoryStageCache, StageCache};
pub use dag::{StageGraph, Wave};
pub use executor::StageExecutor;
pub use runner::{PipelineRunner, PipelineRunnerBuilder};
pub use spec::StageDefinition;
