//! Gasoline deploy engine
//!
//! Deploy snapshot persistence, the provisioning backend contract and the
//! concurrent, dependency-gated deploy orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  gas up / deploy                  │
//! └─────────────────┬────────────────────────────────┘
//!                   │ ResourceMap
//! ┌─────────────────▼────────────────────────────────┐
//! │                  gasoline-cloud                   │
//! │  SnapshotStore ─► DeployPlan ─► DeployOrchestrator│
//! │                   (diff, graph)   │ per group     │
//! │                                   ▼               │
//! │              trait ProvisioningBackend            │
//! └───────────────────────────────────┬──────────────┘
//!                                     │
//!                          ┌──────────▼─────────┐
//!                          │     cloudflare     │
//!                          │      handlers      │
//!                          └────────────────────┘
//! ```

pub mod action;
pub mod backend;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod plan;
pub mod snapshot;

// Re-exports
pub use action::{Action, HandlerKey};
pub use backend::{
    BackendRegistry, ProvisionRequest, ProvisioningBackend, ResourceHandler, validate_backend,
};
pub use error::{DeployError, FailedResource, ProvisionError, Result, SnapshotError};
pub use orchestrator::{
    DeployOptions, DeployOrchestrator, DeployReport, DeployState, GroupOutcome, Transition,
    build_snapshot,
};
pub use pipeline::Deployer;
pub use plan::DeployPlan;
pub use snapshot::{DeploySnapshot, SnapshotEntry, SnapshotStore};
