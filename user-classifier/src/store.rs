use std::collections::BTreeMap;

use crate::record::{EntityState, Observation};

/// Latest aggregate per entity, for the lifetime of the process.
///
/// Entries are only ever replaced, never merged or evicted. The map is ordered by
/// identifier so that snapshots of equal contents are always equal sequences.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StateStore {
    entities: BTreeMap<String, EntityState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is known about the observed entity with the observation.
    pub fn upsert(&mut self, observation: Observation) {
        self.entities
            .insert(observation.entity_id.clone(), observation.into());
    }

    /// Copy of every entity currently tracked, ordered by identifier.
    pub fn snapshot(&self) -> Vec<EntityState> {
        self.entities.values().cloned().collect()
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityState> {
        self.entities.get(entity_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
