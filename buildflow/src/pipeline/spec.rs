//! Stage definitions.

use super::generate_cache_key;
use crate::stages::StageWork;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Declarative definition of one stage.
///
/// Definitions are authored before a build and never change during it.
/// Stages are required and sequential unless stated otherwise.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    /// Unique stage id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Ids of the stages this stage depends on.
    pub depends_on: BTreeSet<String>,
    /// Whether the stage may run concurrently with its wave.
    pub parallel: bool,
    /// Whether a failure aborts the build.
    pub required: bool,
    /// Whether the stage needs approval for each build.
    pub manual: bool,
    /// Whether successful results may be reused across builds.
    pub cacheable: bool,
    /// Stage timeout; the runner default applies when unset.
    pub timeout: Option<Duration>,
    /// Artifact names this stage publishes.
    pub declared_artifacts: BTreeSet<String>,
    /// Author-supplied cache key.
    pub cache_key: Option<String>,
    /// The work callable.
    pub work: Arc<dyn StageWork>,
}

impl StageDefinition {
    /// Creates a required, sequential stage whose name equals its id.
    #[must_use]
    pub fn new(id: impl Into<String>, work: Arc<dyn StageWork>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            depends_on: BTreeSet::new(),
            parallel: false,
            required: true,
            manual: false,
            cacheable: false,
            timeout: None,
            declared_artifacts: BTreeSet::new(),
            cache_key: None,
            work,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds dependencies.
    #[must_use]
    pub fn depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Lets the stage run concurrently with the rest of its wave.
    #[must_use]
    pub const fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Makes failures of this stage tolerated.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Sets whether failures abort the build.
    #[must_use]
    pub const fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Puts the stage behind a manual approval gate.
    #[must_use]
    pub const fn manual(mut self) -> Self {
        self.manual = true;
        self
    }

    /// Allows successful results to be served from the cache.
    #[must_use]
    pub const fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    /// Sets an explicit cache key.
    #[must_use]
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cacheable = true;
        self.cache_key = Some(key.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declares published artifact names.
    #[must_use]
    pub fn with_artifacts(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.declared_artifacts.extend(names.into_iter().map(Into::into));
        self
    }

    /// The key used for cache lookups.
    ///
    /// Falls back to a hash of the id and declared artifact names.
    #[must_use]
    pub fn effective_cache_key(&self) -> String {
        if let Some(key) = &self.cache_key {
            return key.clone();
        }
        let mut components = vec![self.id.as_str()];
        components.extend(self.declared_artifacts.iter().map(String::as_str));
        generate_cache_key(&components)
    }

    /// The timeout to enforce, given the runner default.
    #[must_use]
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }

    /// Returns true if the artifact name may be published.
    ///
    /// A stage without declared artifacts publishes everything it produces.
    #[must_use]
    pub fn publishes(&self, name: &str) -> bool {
        self.declared_artifacts.is_empty() || self.declared_artifacts.contains(name)
    }
}
