use super::config::ResourceConfig;
use super::id::{ResourceId, ResourceType};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declared unit of infrastructure
///
/// Immutable for the lifetime of one command invocation. Dependencies are
/// kept sorted and de-duplicated so two declarations of the same edges
/// compare equal regardless of the order they were discovered in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub resource_type: ResourceType,
    pub config: ResourceConfig,
    pub dependencies: Vec<ResourceId>,
}

impl Resource {
    /// Build a resource, checking that the config's `type` agrees with the ID
    pub fn new(
        id: ResourceId,
        config: ResourceConfig,
        dependencies: impl IntoIterator<Item = ResourceId>,
    ) -> Result<Self> {
        let resource_type = id.resource_type();
        if let Some(config_type) = config.resource_type()
            && config_type != resource_type
        {
            return Err(CoreError::TypeMismatch {
                id: id.to_string(),
                id_type: resource_type.to_string(),
                config_type: config_type.to_string(),
            });
        }

        Ok(Self {
            id,
            resource_type,
            config,
            dependencies: normalize_dependencies(dependencies),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.config.name()
    }
}

/// Sort and de-duplicate a dependency list
pub fn normalize_dependencies(dependencies: impl IntoIterator<Item = ResourceId>) -> Vec<ResourceId> {
    let mut deps: Vec<ResourceId> = dependencies.into_iter().collect();
    deps.sort();
    deps.dedup();
    deps
}

/// Current resources keyed by ID
pub type ResourceMap = BTreeMap<ResourceId, Resource>;

/// Dependency map (`ResourceID -> []ResourceID`) of a resource map
pub fn dependency_map(resources: &ResourceMap) -> BTreeMap<ResourceId, Vec<ResourceId>> {
    resources
        .iter()
        .map(|(id, resource)| (id.clone(), resource.dependencies.clone()))
        .collect()
}
