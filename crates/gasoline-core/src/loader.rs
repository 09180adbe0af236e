//! Resource loading
//!
//! Container scan, config resolution and dependency wiring combined into
//! the current resource map.

use crate::discovery::{ResourceSource, scan_container, source_dependency_map};
use crate::error::{CoreError, Result};
use crate::graph::DependencyGraph;
use crate::model::{Resource, ResourceId, ResourceMap};
use crate::resolver::ConfigResolver;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Discover and resolve every resource of a container
///
/// 1. Scan the container for sources
/// 2. Let the resolver validate them
/// 3. Resolve configs, deepest source first
/// 4. Map internal package dependencies onto resource IDs
#[instrument(skip(container, resolver), fields(container = %container.display()))]
pub fn discover_resources(container: &Path, resolver: &dyn ConfigResolver) -> Result<ResourceMap> {
    let sources = scan_container(container)?;
    resolver.validate(&sources)?;

    let source_graph = DependencyGraph::new(source_dependency_map(&sources))?;
    let by_key: BTreeMap<&str, &ResourceSource> =
        sources.iter().map(|s| (s.key.as_str(), s)).collect();
    let ordered: Vec<ResourceSource> = source_graph
        .depth_order()
        .into_iter()
        .filter_map(|key| by_key.get(key.as_str()).map(|s| (*s).clone()))
        .collect();
    debug!(
        order = ?ordered.iter().map(|s| s.key.as_str()).collect::<Vec<_>>(),
        "Resolving configs"
    );

    let mut configs = resolver.resolve(&ordered)?;

    let mut ids: BTreeMap<&str, ResourceId> = BTreeMap::new();
    let mut declared_by: BTreeMap<ResourceId, &str> = BTreeMap::new();
    for source in &sources {
        let config = configs.get(&source.key).ok_or_else(|| CoreError::Resolve {
            source_key: source.key.clone(),
            message: "resolver returned no config".to_string(),
        })?;
        let raw_id = config.declared_id().ok_or_else(|| CoreError::Resolve {
            source_key: source.key.clone(),
            message: "config has no 'id' field".to_string(),
        })?;
        let id = ResourceId::parse(raw_id)?;

        if let Some(first) = declared_by.insert(id.clone(), &source.key) {
            return Err(CoreError::DuplicateResourceId {
                id: id.to_string(),
                first: first.to_string(),
                second: source.key.clone(),
            });
        }
        ids.insert(&source.key, id);
    }

    let mut resources = ResourceMap::new();
    for source in &sources {
        let id = ids[source.key.as_str()].clone();
        let config = configs.remove(&source.key).ok_or_else(|| CoreError::Resolve {
            source_key: source.key.clone(),
            message: "resolver returned no config".to_string(),
        })?;
        let dependencies = source
            .internal_dependencies
            .iter()
            .filter_map(|dep| ids.get(dep.as_str()).cloned());

        let resource = Resource::new(id.clone(), config, dependencies)?;
        resources.insert(id, resource);
    }

    info!(resources = resources.len(), "Resources discovered");
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::resolver::{JsonConfigResolver, ResolvedConfigs};
    use serde_json::json;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn write_source(container: &Path, dir: &str, package: serde_json::Value, resource: serde_json::Value) {
        let path = container.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("package.json"), package.to_string()).unwrap();
        fs::write(path.join("resource.json"), resource.to_string()).unwrap();
    }

    fn sample_container(container: &Path) {
        write_source(
            container,
            "core-base-api",
            json!({ "name": "core-base-api", "dependencies": { "core-base-kv": "*" } }),
            json!({ "id": "core:base:cloudflare-worker:1", "type": "cloudflare-worker", "name": "CORE_BASE_API" }),
        );
        write_source(
            container,
            "core-base-kv",
            json!({ "name": "core-base-kv" }),
            json!({ "id": "core:base:cloudflare-kv:1", "type": "cloudflare-kv", "name": "CORE_BASE_KV" }),
        );
    }

    #[test]
    fn test_discover_resources() {
        let tmp = tempdir().unwrap();
        sample_container(tmp.path());

        let resources = discover_resources(tmp.path(), &JsonConfigResolver::new()).unwrap();

        let api = ResourceId::parse("core:base:cloudflare-worker:1").unwrap();
        let kv = ResourceId::parse("core:base:cloudflare-kv:1").unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[&api].dependencies, vec![kv.clone()]);
        assert!(resources[&kv].dependencies.is_empty());
        assert_eq!(resources[&kv].name(), Some("CORE_BASE_KV"));
    }

    /// Records the order sources arrive in
    struct RecordingResolver {
        inner: JsonConfigResolver,
        order: Mutex<Vec<String>>,
    }

    impl ConfigResolver for RecordingResolver {
        fn resolve(&self, sources: &[ResourceSource]) -> Result<ResolvedConfigs> {
            *self.order.lock().unwrap() = sources.iter().map(|s| s.key.clone()).collect();
            self.inner.resolve(sources)
        }
    }

    #[test]
    fn test_sources_resolved_deepest_first() {
        let tmp = tempdir().unwrap();
        sample_container(tmp.path());

        let resolver = RecordingResolver {
            inner: JsonConfigResolver::new(),
            order: Mutex::new(vec![]),
        };
        discover_resources(tmp.path(), &resolver).unwrap();

        assert_eq!(
            *resolver.order.lock().unwrap(),
            vec!["core-base-kv".to_string(), "core-base-api".to_string()]
        );
    }

    #[test]
    fn test_duplicate_resource_id() {
        let tmp = tempdir().unwrap();
        let config = json!({ "id": "core:base:cloudflare-kv:1", "type": "cloudflare-kv", "name": "KV" });
        write_source(tmp.path(), "a", json!({ "name": "a" }), config.clone());
        write_source(tmp.path(), "b", json!({ "name": "b" }), config);

        let err = discover_resources(tmp.path(), &JsonConfigResolver::new()).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateResourceId { .. }));
    }

    #[test]
    fn test_missing_id_and_type_mismatch() {
        let tmp = tempdir().unwrap();
        write_source(tmp.path(), "a", json!({ "name": "a" }), json!({ "name": "NO_ID" }));
        let err = discover_resources(tmp.path(), &JsonConfigResolver::new()).unwrap_err();
        assert!(matches!(err, CoreError::Resolve { .. }));

        let tmp = tempdir().unwrap();
        write_source(
            tmp.path(),
            "a",
            json!({ "name": "a" }),
            json!({ "id": "core:base:cloudflare-kv:1", "type": "cloudflare-worker" }),
        );
        let err = discover_resources(tmp.path(), &JsonConfigResolver::new()).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn test_cyclic_sources() {
        let tmp = tempdir().unwrap();
        write_source(
            tmp.path(),
            "a",
            json!({ "name": "a", "dependencies": { "b": "*" } }),
            json!({ "id": "x:a:cloudflare-kv:1" }),
        );
        write_source(
            tmp.path(),
            "b",
            json!({ "name": "b", "dependencies": { "a": "*" } }),
            json!({ "id": "x:b:cloudflare-kv:1" }),
        );

        let err = discover_resources(tmp.path(), &JsonConfigResolver::new()).unwrap_err();
        assert!(matches!(err, CoreError::Graph(GraphError::Cycle { .. })));
    }
}
