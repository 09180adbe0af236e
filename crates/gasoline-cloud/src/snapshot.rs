//! Deploy snapshot
//!
//! The snapshot file (`gas.up.json` by default) records the last deployed
//! config, dependencies and provisioning output of every resource:
//!
//! ```json
//! {
//!   "core:base:cloudflare-kv:1": {
//!     "config": { "type": "cloudflare-kv", "name": "CORE_BASE_KV" },
//!     "dependencies": [],
//!     "output": { "id": "0f2ac74b498b48028cb68387c421e279" }
//!   }
//! }
//! ```
//!
//! It is read once at the start of a deploy and rewritten wholesale at the
//! end, never in between.

use crate::error::SnapshotError;
use gasoline_core::{
    DependencyMap, PreviousResource, PreviousState, Resource, ResourceConfig, ResourceId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Recorded state of one deployed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub config: ResourceConfig,
    #[serde(default)]
    pub dependencies: Vec<ResourceId>,
    #[serde(default)]
    pub output: serde_json::Value,
}

impl SnapshotEntry {
    /// Entry for a resource that was just provisioned
    pub fn from_resource(resource: &Resource, output: serde_json::Value) -> Self {
        Self {
            config: resource.config.clone(),
            dependencies: resource.dependencies.clone(),
            output,
        }
    }
}

/// Last recorded state of every deployed resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploySnapshot {
    entries: BTreeMap<ResourceId, SnapshotEntry>,
}

impl DeploySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ResourceId) -> Option<&SnapshotEntry> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: ResourceId, entry: SnapshotEntry) -> Option<SnapshotEntry> {
        self.entries.insert(id, entry)
    }

    pub fn remove(&mut self, id: &ResourceId) -> Option<SnapshotEntry> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &SnapshotEntry)> {
        self.entries.iter()
    }

    /// Provisioning output recorded for a resource
    pub fn output(&self, id: &ResourceId) -> Option<&serde_json::Value> {
        self.entries.get(id).map(|e| &e.output)
    }

    /// Recorded `resource -> [dependency]` edges
    pub fn dependency_map(&self) -> DependencyMap<ResourceId> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.dependencies.clone()))
            .collect()
    }
}

impl FromIterator<(ResourceId, SnapshotEntry)> for DeploySnapshot {
    fn from_iter<I: IntoIterator<Item = (ResourceId, SnapshotEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl PreviousState for DeploySnapshot {
    fn previous_ids(&self) -> Vec<&ResourceId> {
        self.entries.keys().collect()
    }

    fn previous(&self, id: &ResourceId) -> Option<PreviousResource<'_>> {
        self.entries.get(id).map(|entry| PreviousResource {
            config: &entry.config,
            dependencies: &entry.dependencies,
        })
    }
}

/// Reads and writes the snapshot file
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previous snapshot, kept next to the snapshot on every save
    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, ".backup")
    }

    fn temp_path(&self) -> PathBuf {
        with_suffix(&self.path, ".tmp")
    }

    /// Load the snapshot; a missing file is an empty snapshot
    pub async fn load(&self) -> Result<DeploySnapshot, SnapshotError> {
        let exists = fs::try_exists(&self.path)
            .await
            .map_err(|source| SnapshotError::Read {
                path: self.path.clone(),
                source,
            })?;
        if !exists {
            tracing::debug!(path = %self.path.display(), "Snapshot not found, starting empty");
            return Ok(DeploySnapshot::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|source| SnapshotError::Read {
                path: self.path.clone(),
                source,
            })?;
        let snapshot: DeploySnapshot =
            serde_json::from_str(&content).map_err(|source| SnapshotError::Parse {
                path: self.path.clone(),
                source,
            })?;

        tracing::debug!(resources = snapshot.len(), "Loaded snapshot");
        Ok(snapshot)
    }

    /// Replace the snapshot file
    ///
    /// Written to a temp file first and renamed over the old one, so readers
    /// see either the old or the new snapshot. The old file is kept as
    /// [`SnapshotStore::backup_path`].
    pub async fn save(&self, snapshot: &DeploySnapshot) -> Result<(), SnapshotError> {
        let write_err = |source| SnapshotError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        let temp = self.temp_path();
        fs::write(&temp, content).await.map_err(write_err)?;

        if fs::try_exists(&self.path).await.map_err(write_err)? {
            fs::copy(&self.path, self.backup_path())
                .await
                .map_err(write_err)?;
            tracing::debug!("Created snapshot backup");
        }

        fs::rename(&temp, &self.path).await.map_err(write_err)?;

        tracing::debug!(resources = snapshot.len(), path = %self.path.display(), "Saved snapshot");
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
