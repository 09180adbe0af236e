//! Deploy plan
//!
//! Everything the orchestrator reads: the current resources, the previous
//! snapshot, the diff between them and the deploy graph.

use crate::action::{Action, HandlerKey};
use crate::backend::ProvisionRequest;
use crate::snapshot::DeploySnapshot;
use gasoline_core::{
    DependencyGraph, DependencyMap, DiffState, DiffSummary, GraphError, ResourceConfig, ResourceId,
    ResourceMap, ResourceType, dependency_map, diff,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Read-only input of one deploy
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub current: ResourceMap,
    pub previous: DeploySnapshot,
    pub diff: BTreeMap<ResourceId, DiffState>,
    /// Current resources plus deleted ones with their recorded dependencies
    pub graph: DependencyGraph<ResourceId>,
}

impl DeployPlan {
    pub fn build(current: ResourceMap, previous: DeploySnapshot) -> Result<Self, GraphError> {
        let diff = diff(&current, &previous);

        // A recorded dependency may already be gone when an earlier deploy
        // deleted it but failed to delete its dependent
        let mut edges: DependencyMap<ResourceId> = dependency_map(&current);
        for (id, entry) in previous.iter() {
            if !current.contains_key(id) {
                let dependencies = entry
                    .dependencies
                    .iter()
                    .filter(|dep| current.contains_key(*dep) || previous.contains(dep))
                    .cloned()
                    .collect();
                edges.insert(id.clone(), dependencies);
            }
        }
        let graph = DependencyGraph::new(edges)?;

        Ok(Self {
            current,
            previous,
            diff,
            graph,
        })
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diff(&self.diff)
    }

    pub fn has_changes(&self) -> bool {
        self.summary().has_changes()
    }

    pub fn diff_state(&self, id: &ResourceId) -> DiffState {
        self.diff.get(id).copied().unwrap_or(DiffState::Unchanged)
    }

    pub fn action(&self, id: &ResourceId) -> Option<Action> {
        Action::from_diff(self.diff_state(id))
    }

    /// IDs that need provisioning
    pub fn changed(&self) -> impl Iterator<Item = (&ResourceId, Action)> {
        self.diff
            .iter()
            .filter_map(|(id, state)| Action::from_diff(*state).map(|action| (id, action)))
    }

    /// Handler keys the plan will dispatch to
    pub fn required_handlers(&self) -> BTreeSet<HandlerKey> {
        self.changed()
            .map(|(id, action)| HandlerKey::new(id.resource_type(), action))
            .collect()
    }

    /// Config to provision with: current, or recorded for deletions
    pub fn config(&self, id: &ResourceId) -> Option<&ResourceConfig> {
        self.current
            .get(id)
            .map(|r| &r.config)
            .or_else(|| self.previous.get(id).map(|e| &e.config))
    }

    /// Build the provisioning call for a changed resource
    pub fn request(&self, id: &ResourceId, action: Action) -> Option<ProvisionRequest> {
        let resource_type: ResourceType = id.resource_type();
        Some(ProvisionRequest {
            id: id.clone(),
            key: HandlerKey::new(resource_type, action),
            config: self.config(id)?.clone(),
            previous_output: self.previous.output(id).cloned(),
        })
    }

    /// Groups containing at least one change
    pub fn changed_groups(&self) -> Vec<usize> {
        self.changed()
            .filter_map(|(id, _)| self.graph.group(id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// `group -> depth -> [(resource, diff state)]`
    pub fn layout(&self) -> BTreeMap<usize, BTreeMap<usize, Vec<(ResourceId, DiffState)>>> {
        self.graph
            .group_to_depth_to_nodes()
            .into_iter()
            .map(|(group, depths)| {
                let depths = depths
                    .into_iter()
                    .map(|(depth, ids)| {
                        let states = ids
                            .into_iter()
                            .map(|id| {
                                let state = self.diff_state(&id);
                                (id, state)
                            })
                            .collect();
                        (depth, states)
                    })
                    .collect();
                (group, depths)
            })
            .collect()
    }

    /// Log the pre-deploy state of every resource
    pub fn log(&self) {
        info!(summary = %self.summary(), "Deploy plan");
        for (group, depths) in self.layout() {
            for (depth, states) in depths {
                for (id, state) in states {
                    info!(group, depth, resource = %id, diff = %state, "Planned");
                }
            }
        }
    }
}
