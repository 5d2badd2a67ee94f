//! Build trigger input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What started a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Started by a person.
    #[default]
    Manual,
    /// Started by a repository webhook.
    Webhook,
    /// Started by a schedule.
    Schedule,
    /// Started through an API call.
    Api,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Webhook => write!(f, "webhook"),
            Self::Schedule => write!(f, "schedule"),
            Self::Api => write!(f, "api"),
        }
    }
}

/// Input for one build.
///
/// `manual_approvals` pre-authorizes manual-gated stages for this build only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// What started the build.
    pub kind: TriggerKind,
    /// The branch being built.
    pub branch: String,
    /// The commit being built, if known.
    #[serde(default)]
    pub commit: Option<String>,
    /// The target environment.
    pub environment: String,
    /// Manual stages approved for this build.
    #[serde(default)]
    pub manual_approvals: BTreeSet<String>,
}

impl Trigger {
    /// Creates a trigger for a branch in the `development` environment.
    #[must_use]
    pub fn new(kind: TriggerKind, branch: impl Into<String>) -> Self {
        Self {
            kind,
            branch: branch.into(),
            commit: None,
            environment: "development".to_string(),
            manual_approvals: BTreeSet::new(),
        }
    }

    /// Sets the commit.
    #[must_use]
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Approves a manual stage for this build.
    #[must_use]
    pub fn approve(mut self, stage_id: impl Into<String>) -> Self {
        self.manual_approvals.insert(stage_id.into());
        self
    }

    /// Returns true if the stage was approved for this build.
    #[must_use]
    pub fn is_approved(&self, stage_id: &str) -> bool {
        self.manual_approvals.contains(stage_id)
    }
}
