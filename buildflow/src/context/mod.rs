//! Execution contexts for builds and stages.
//!
//! This module provides:
//! - The build context shared by every stage of one build
//! - The stage context handed to a stage's work callable

mod build;
mod stage;

pub use build::BuildContext;
pub use stage::StageContext;
