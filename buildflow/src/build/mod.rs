//! Build records, triggers and the build history.
//!
//! This module provides:
//! - Trigger input describing why and where a build runs
//! - The per-build record of stage outcomes
//! - The process-wide history used by the query surface

mod history;
mod record;
mod trigger;

pub use history::BuildHistory;
pub use record::{BuildRecord, BuildSummary};
pub use trigger::{Trigger, TriggerKind};
