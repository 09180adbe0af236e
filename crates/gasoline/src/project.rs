use anyhow::Context;
use gasoline_cloud::SnapshotStore;
use gasoline_config::LoadedConfig;
use gasoline_core::{ResourceMap, ScriptConfigResolver, discover_resources};
use std::path::Path;

/// The project the CLI operates on
pub struct Project {
    pub loaded: LoadedConfig,
}

impl Project {
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let loaded = LoadedConfig::discover(explicit)?;
        tracing::debug!(config = %loaded.path.display(), "Using project config");
        Ok(Self { loaded })
    }

    pub fn name(&self) -> &str {
        &self.loaded.config.project
    }

    pub fn snapshot_store(&self) -> SnapshotStore {
        SnapshotStore::new(self.loaded.snapshot_path())
    }

    /// Scan the resource container and resolve every resource config
    pub async fn resources(&self) -> anyhow::Result<ResourceMap> {
        let container = self.loaded.container_dir();
        let resolver = ScriptConfigResolver::new(self.loaded.root());

        tokio::task::spawn_blocking(move || discover_resources(&container, &resolver))
            .await
            .context("resource discovery task failed")?
            .map_err(Into::into)
    }
}
