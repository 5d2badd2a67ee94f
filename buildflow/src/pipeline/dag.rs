//! Stage graph validation and wave layering.
//!
//! A wave is the maximal set of stages whose dependencies all lie in
//! earlier waves. Waves run strictly in order, so two stages joined by a
//! dependency edge never share a wave.

use super::StageDefinition;
use crate::errors::GraphError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One layer of mutually independent stages.
#[derive(Debug, Clone)]
pub struct Wave {
    /// Zero-based position of the wave.
    pub index: usize,
    /// Stages of the wave in declaration order.
    pub stages: Vec<Arc<StageDefinition>>,
}

impl Wave {
    /// Returns the stage ids in declaration order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.id.as_str()).collect()
    }

    /// Splits the wave into parallel and sequential stages.
    ///
    /// Both halves keep declaration order.
    #[must_use]
    pub fn partition(&self) -> (Vec<Arc<StageDefinition>>, Vec<Arc<StageDefinition>>) {
        self.stages.iter().cloned().partition(|s| s.parallel)
    }
}

/// A validated stage graph layered into waves.
#[derive(Debug, Clone)]
pub struct StageGraph {
    waves: Vec<Wave>,
    wave_index: HashMap<String, usize>,
}

impl StageGraph {
    /// Validates stage definitions and layers them into waves.
    ///
    /// Duplicate ids and unknown dependencies are reported before any wave
    /// is computed.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateStage`], [`GraphError::UnknownDependency`]
    /// or [`GraphError::CyclicDependency`].
    pub fn build(definitions: &[StageDefinition]) -> Result<Self, GraphError> {
        let mut known: HashSet<&str> = HashSet::with_capacity(definitions.len());
        for def in definitions {
            if !known.insert(def.id.as_str()) {
                return Err(GraphError::DuplicateStage {
                    stage: def.id.clone(),
                });
            }
        }

        for def in definitions {
            if let Some(missing) = def.depends_on.iter().find(|d| !known.contains(d.as_str())) {
                return Err(GraphError::UnknownDependency {
                    stage: def.id.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        // In-degree per stage and the reverse edges used to release dependents.
        let mut in_degree: HashMap<&str, usize> = definitions
            .iter()
            .map(|d| (d.id.as_str(), d.depends_on.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for def in definitions {
            for dep in &def.depends_on {
                dependents.entry(dep.as_str()).or_default().push(def.id.as_str());
            }
        }

        let mut remaining: Vec<&StageDefinition> = definitions.iter().collect();
        let mut waves: Vec<Wave> = Vec::new();
        let mut wave_index = HashMap::with_capacity(definitions.len());

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|d| in_degree.get(d.id.as_str()).copied() == Some(0));

            if ready.is_empty() {
                return Err(GraphError::CyclicDependency {
                    stages: blocked.iter().map(|d| d.id.clone()).collect(),
                });
            }

            for def in &ready {
                for child in dependents.get(def.id.as_str()).into_iter().flatten() {
                    if let Some(count) = in_degree.get_mut(child) {
                        *count = count.saturating_sub(1);
                    }
                }
                wave_index.insert(def.id.clone(), waves.len());
            }

            waves.push(Wave {
                index: waves.len(),
                stages: ready.into_iter().map(|d| Arc::new(d.clone())).collect(),
            });
            remaining = blocked;
        }

        Ok(Self { waves, wave_index })
    }

    /// Returns the waves in execution order.
    #[must_use]
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Returns the wave a stage belongs to.
    #[must_use]
    pub fn wave_of(&self, stage_id: &str) -> Option<usize> {
        self.wave_index.get(stage_id).copied()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.wave_index.len()
    }

    /// Returns all stage ids, wave by wave.
    #[must_use]
    pub fn execution_order(&self) -> Vec<&str> {
        self.waves.iter().flat_map(Wave::ids).collect()
    }

    /// Returns the ids of every wave.
    #[must_use]
    pub fn wave_ids(&self) -> Vec<Vec<&str>> {
        self.waves.iter().map(Wave::ids).collect()
    }
}
