//! Gasoline core
//!
//! Resource model, dependency graph engine and state differ.
//!
//! ```text
//! gas/ (resource container)
//!   │  discovery::scan_container
//!   ▼
//! ResourceSource ──► ConfigResolver ──► ResourceMap
//!                                          │
//!                  graph::DependencyGraph ◄┤
//!                                          ▼
//!                        diff::diff(current, previous)
//! ```

pub mod diff;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod resolver;

// Re-exports
pub use diff::{DiffState, DiffSummary, PreviousResource, PreviousState, diff, group_by_state};
pub use discovery::{PackageJson, ResourceSource, scan_container};
pub use error::{CoreError, GraphError, Result};
pub use graph::{DependencyGraph, DependencyMap};
pub use loader::discover_resources;
pub use model::{
    Resource, ResourceConfig, ResourceId, ResourceMap, ResourceSpec, ResourceType, dependency_map,
    normalize_dependencies,
};
pub use resolver::{ConfigResolver, JsonConfigResolver, ResolvedConfigs, ScriptConfigResolver};
