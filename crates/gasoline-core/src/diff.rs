//! State differ
//!
//! Classifies every resource by comparing the current declaration against
//! the last recorded deploy.

use crate::model::{Resource, ResourceConfig, ResourceId, ResourceMap, normalize_dependencies};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Change status of a resource since the last deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffState {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

impl DiffState {
    pub fn is_change(&self) -> bool {
        !matches!(self, DiffState::Unchanged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiffState::Created => "CREATED",
            DiffState::Updated => "UPDATED",
            DiffState::Deleted => "DELETED",
            DiffState::Unchanged => "UNCHANGED",
        }
    }
}

impl fmt::Display for DiffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the differ needs to know about a previously deployed resource
#[derive(Debug, Clone, Copy)]
pub struct PreviousResource<'a> {
    pub config: &'a ResourceConfig,
    pub dependencies: &'a [ResourceId],
}

/// Source of previously deployed resources
///
/// Implemented by the deploy snapshot; [`ResourceMap`] implements it too so a
/// declaration can be compared against itself.
pub trait PreviousState {
    fn previous_ids(&self) -> Vec<&ResourceId>;

    fn previous(&self, id: &ResourceId) -> Option<PreviousResource<'_>>;
}

impl PreviousState for ResourceMap {
    fn previous_ids(&self) -> Vec<&ResourceId> {
        self.keys().collect()
    }

    fn previous(&self, id: &ResourceId) -> Option<PreviousResource<'_>> {
        self.get(id).map(|resource: &Resource| PreviousResource {
            config: &resource.config,
            dependencies: &resource.dependencies,
        })
    }
}

/// Classify every current and previously deployed resource
pub fn diff(current: &ResourceMap, previous: &impl PreviousState) -> BTreeMap<ResourceId, DiffState> {
    let mut result = BTreeMap::new();

    for id in previous.previous_ids() {
        if !current.contains_key(id) {
            result.insert(id.clone(), DiffState::Deleted);
        }
    }

    for (id, resource) in current {
        let state = match previous.previous(id) {
            None => DiffState::Created,
            Some(prev) => {
                let prev_deps = normalize_dependencies(prev.dependencies.iter().cloned());
                if prev.config != &resource.config || prev_deps != resource.dependencies {
                    DiffState::Updated
                } else {
                    DiffState::Unchanged
                }
            }
        };
        result.insert(id.clone(), state);
    }

    result
}

/// Resource IDs bucketed by diff state
pub fn group_by_state(diff: &BTreeMap<ResourceId, DiffState>) -> BTreeMap<DiffState, Vec<ResourceId>> {
    let mut result: BTreeMap<DiffState, Vec<ResourceId>> = BTreeMap::new();
    for (id, state) in diff {
        result.entry(*state).or_default().push(id.clone());
    }
    result
}

/// Per-state counts of a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    pub fn from_diff(diff: &BTreeMap<ResourceId, DiffState>) -> Self {
        let mut summary = Self::default();
        for state in diff.values() {
            match state {
                DiffState::Created => summary.created += 1,
                DiffState::Updated => summary.updated += 1,
                DiffState::Deleted => summary.deleted += 1,
                DiffState::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }

    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub fn has_changes(&self) -> bool {
        self.changes() > 0
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.created, self.updated, self.deleted, self.unchanged
        )
    }
}

/// IDs whose diff state is a change
pub fn changed_ids(diff: &BTreeMap<ResourceId, DiffState>) -> BTreeSet<ResourceId> {
    diff.iter()
        .filter(|(_, state)| state.is_change())
        .map(|(id, _)| id.clone())
        .collect()
}
