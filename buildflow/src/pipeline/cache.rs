//! Stage result cache shared across builds.
//!
//! Entries are keyed by an opaque cache key and live until they are
//! explicitly invalidated. Freshness is the caller's decision.

use crate::core::{ArtifactMap, StageStatus};
use crate::utils::{now_utc, Timestamp};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use uuid::Uuid;

/// A previously successful stage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedStageResult {
    /// Status of the stage that produced the entry.
    pub status: StageStatus,
    /// Artifacts of that stage.
    pub artifacts: ArtifactMap,
    /// Build that produced the entry.
    pub source_build: Option<Uuid>,
    /// When the entry was stored.
    pub stored_at: Timestamp,
}

impl CachedStageResult {
    /// Creates a successful cache entry.
    #[must_use]
    pub fn new(artifacts: ArtifactMap) -> Self {
        Self {
            status: StageStatus::Success,
            artifacts,
            source_build: None,
            stored_at: now_utc(),
        }
    }

    /// Records the producing build.
    #[must_use]
    pub const fn with_source_build(mut self, build_id: Uuid) -> Self {
        self.source_build = Some(build_id);
        self
    }
}

/// Storage backend for cached stage results.
#[async_trait]
pub trait StageCache: Send + Sync + Debug {
    /// Looks up a cached result.
    async fn lookup(&self, key: &str) -> Option<CachedStageResult>;

    /// Stores a result, replacing any previous entry.
    async fn store(&self, key: &str, result: CachedStageResult);

    /// Removes one entry. Returns true if it existed.
    async fn invalidate(&self, key: &str) -> bool;

    /// Removes every entry.
    async fn clear(&self);
}

/// In-memory stage cache.
#[derive(Debug, Default)]
pub struct InMemoryStageCache {
    entries: DashMap<String, CachedStageResult>,
}

impl InMemoryStageCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StageCache for InMemoryStageCache {
    async fn lookup(&self, key: &str) -> Option<CachedStageResult> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    async fn store(&self, key: &str, result: CachedStageResult) {
        self.entries.insert(key.to_string(), result);
    }

    async fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    async fn clear(&self) {
        self.entries.clear();
    }
}

/// Derives a cache key from components.
///
/// Each component is length-prefixed, so no two component lists hash the
/// same input.
#[must_use]
pub fn generate_cache_key(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for component in components {
        hasher.update((component.len() as u64).to_le_bytes());
        hasher.update(component.as_bytes());
    }
    let result = hasher.finalize();
    format!("cache:{}", hex::encode(&result[..16]))
}
