//! Core types for buildflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage and build status enums
//! - Per-stage execution records
//! - The write-once artifact store

mod artifact;
mod execution;
mod status;

pub use artifact::{ArtifactKey, ArtifactMap, ArtifactStore};
pub use execution::{LogEntry, StageExecution};
pub use status::{BuildStatus, SkipReason, StageStatus};
