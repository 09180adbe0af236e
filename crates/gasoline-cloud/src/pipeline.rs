//! Deploy pipeline
//!
//! Snapshot load, diff, handler validation, orchestration and the single
//! snapshot write, in that order.

use crate::backend::{ProvisioningBackend, validate_backend};
use crate::error::Result;
use crate::orchestrator::{DeployOptions, DeployOrchestrator, DeployReport};
use crate::plan::DeployPlan;
use crate::snapshot::SnapshotStore;
use gasoline_core::ResourceMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Deploys resource maps against one snapshot file and backend
pub struct Deployer {
    store: SnapshotStore,
    backend: Arc<dyn ProvisioningBackend>,
    options: DeployOptions,
}

impl Deployer {
    pub fn new(
        store: SnapshotStore,
        backend: Arc<dyn ProvisioningBackend>,
        options: DeployOptions,
    ) -> Self {
        Self {
            store,
            backend,
            options,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Diff the resources against the snapshot and check every needed
    /// handler is available
    #[instrument(skip_all, fields(resources = resources.len()))]
    pub async fn plan(&self, resources: ResourceMap) -> Result<DeployPlan> {
        let previous = self.store.load().await?;
        let plan = DeployPlan::build(resources, previous)?;
        validate_backend(self.backend.as_ref(), &plan.required_handlers())?;
        Ok(plan)
    }

    /// Plan and apply
    pub async fn deploy(&self, resources: ResourceMap) -> Result<DeployReport> {
        let plan = self.plan(resources).await?;
        self.apply(plan).await
    }

    /// Run a plan and persist the resulting snapshot
    ///
    /// A plan without changes provisions nothing and leaves the snapshot file
    /// untouched. Otherwise the snapshot is written once, after every group
    /// has finished, even when some of them failed.
    #[instrument(skip_all)]
    pub async fn apply(&self, plan: DeployPlan) -> Result<DeployReport> {
        if !plan.has_changes() {
            info!("No changes to deploy");
            return Ok(DeployReport::unchanged(plan.previous));
        }

        plan.log();
        let report = DeployOrchestrator::new(Arc::clone(&self.backend), self.options.clone())
            .run(&plan)
            .await;

        self.store.save(&report.snapshot).await?;
        report.into_result()
    }
}
