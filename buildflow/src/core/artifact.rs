//! Artifact store for stage outputs.
//!
//! Artifacts are keyed by `(build, stage, name)` and written once. The
//! store is shared by every stage of a build, including stages running
//! concurrently in the same wave, so all access goes through one mutex.

use crate::errors::ArtifactConflictError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Named artifact values produced by one stage.
pub type ArtifactMap = BTreeMap<String, serde_json::Value>;

/// Key of a single artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// The owning build.
    pub build_id: Uuid,
    /// The producing stage.
    pub stage_id: String,
    /// The artifact name.
    pub name: String,
}

impl ArtifactKey {
    /// Creates a new artifact key.
    #[must_use]
    pub fn new(build_id: Uuid, stage_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            build_id,
            stage_id: stage_id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.build_id, self.stage_id, self.name)
    }
}

/// In-memory, write-once artifact store.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    entries: Mutex<HashMap<ArtifactKey, serde_json::Value>>,
}

impl ArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactConflictError`] if the key already holds a value.
    pub fn put(&self, key: ArtifactKey, value: serde_json::Value) -> Result<(), ArtifactConflictError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            return Err(ArtifactConflictError::new(key));
        }
        entries.insert(key, value);
        Ok(())
    }

    /// Writes all artifacts of one stage atomically.
    ///
    /// Nothing is written if any of the keys already exists.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactConflictError`] naming the first conflicting key.
    pub fn put_all(
        &self,
        build_id: Uuid,
        stage_id: &str,
        artifacts: &ArtifactMap,
    ) -> Result<(), ArtifactConflictError> {
        let mut entries = self.entries.lock();
        for name in artifacts.keys() {
            let key = ArtifactKey::new(build_id, stage_id, name.as_str());
            if entries.contains_key(&key) {
                return Err(ArtifactConflictError::new(key));
            }
        }
        for (name, value) in artifacts {
            entries.insert(ArtifactKey::new(build_id, stage_id, name.as_str()), value.clone());
        }
        Ok(())
    }

    /// Reads one artifact.
    #[must_use]
    pub fn get(&self, key: &ArtifactKey) -> Option<serde_json::Value> {
        self.entries.lock().get(key).cloned()
    }

    /// Returns every artifact a stage produced in a build.
    #[must_use]
    pub fn stage_artifacts(&self, build_id: Uuid, stage_id: &str) -> ArtifactMap {
        self.entries
            .lock()
            .iter()
            .filter(|(key, _)| key.build_id == build_id && key.stage_id == stage_id)
            .map(|(key, value)| (key.name.clone(), value.clone()))
            .collect()
    }

    /// Removes every artifact of a build.
    pub fn clear_build(&self, build_id: Uuid) {
        self.entries.lock().retain(|key, _| key.build_id != build_id);
    }

    /// Returns the number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
