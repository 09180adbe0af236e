//! Resource container discovery
//!
//! Every immediate subdirectory of the resource container (`gas/` by
//! default) is a resource source: a package with a `package.json`. A
//! source's internal dependencies are the `package.json` dependencies that
//! name another source of the same container.

use crate::error::{CoreError, Result};
use crate::graph::DependencyMap;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, instrument};

const PACKAGE_JSON: &str = "package.json";

/// `_<a>.<b>.<c>.index.ts` in `src/`
static INDEX_SOURCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_[^.]+\.[^.]+\.[^.]+\.index\.ts$").expect("valid regex"));

/// `_<a>.<b>.<c>.index.js` in `build/`
static INDEX_BUILD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_[^.]+\.[^.]+\.[^.]+\.index\.js$").expect("valid regex"));

/// The subset of `package.json` discovery reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    pub name: String,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

/// One resource source found in the container
#[derive(Debug, Clone)]
pub struct ResourceSource {
    /// Package name, unique within the container
    pub key: String,
    pub path: PathBuf,
    pub package: PackageJson,
    /// Package names of other sources this one depends on, sorted
    pub internal_dependencies: Vec<String>,
}

impl ResourceSource {
    /// `src/_<a>.<b>.<c>.index.ts`
    pub fn index_source_file(&self) -> Option<PathBuf> {
        find_index_file(&self.path.join("src"), "ts", &INDEX_SOURCE_PATTERN)
    }

    /// `build/_<a>.<b>.<c>.index.js`
    pub fn index_build_file(&self) -> Option<PathBuf> {
        find_index_file(&self.path.join("build"), "js", &INDEX_BUILD_PATTERN)
    }
}

fn find_index_file(dir: &Path, extension: &str, pattern: &Regex) -> Option<PathBuf> {
    let pattern_str = format!("{}/_*.index.{}", dir.display(), extension);
    let mut matches: Vec<PathBuf> = glob::glob(&pattern_str)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| pattern.is_match(n))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Immediate subdirectories of the container, sorted
pub fn container_subdirs(container: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(container).map_err(|e| CoreError::ContainerError {
        path: container.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Read `<dir>/package.json`
pub fn read_package_json(dir: &Path) -> Result<PackageJson> {
    let path = dir.join(PACKAGE_JSON);
    let content = std::fs::read_to_string(&path).map_err(|e| CoreError::InvalidSource {
        path: dir.to_path_buf(),
        message: format!("unable to read {}: {}", path.display(), e),
    })?;
    serde_json::from_str(&content).map_err(|e| CoreError::InvalidSource {
        path: dir.to_path_buf(),
        message: format!("unable to parse {}: {}", path.display(), e),
    })
}

/// Scan the resource container
#[instrument(skip(container), fields(container = %container.display()))]
pub fn scan_container(container: &Path) -> Result<Vec<ResourceSource>> {
    let mut packages: Vec<(PathBuf, PackageJson)> = Vec::new();
    for dir in container_subdirs(container)? {
        let package = read_package_json(&dir)?;
        debug!(source = %dir.display(), package = %package.name, "Found resource source");
        packages.push((dir, package));
    }

    let mut owners: BTreeMap<&str, &Path> = BTreeMap::new();
    for (dir, package) in &packages {
        if let Some(first) = owners.insert(&package.name, dir) {
            return Err(CoreError::InvalidSource {
                path: dir.clone(),
                message: format!(
                    "package name '{}' is already used by {}",
                    package.name,
                    first.display()
                ),
            });
        }
    }

    let sources: Vec<ResourceSource> = packages
        .iter()
        .map(|(dir, package)| {
            let internal_dependencies = package
                .dependencies
                .keys()
                .filter(|name| *name != &package.name && owners.contains_key(name.as_str()))
                .cloned()
                .collect();
            ResourceSource {
                key: package.name.clone(),
                path: dir.clone(),
                package: package.clone(),
                internal_dependencies,
            }
        })
        .collect();

    info!(sources = sources.len(), "Resource container scanned");
    Ok(sources)
}

/// Check every source has the index files the script resolver imports
pub fn validate_index_files(sources: &[ResourceSource]) -> Result<()> {
    for source in sources {
        if source.index_source_file().is_none() {
            return Err(CoreError::InvalidSource {
                path: source.path.clone(),
                message: format!(
                    "unable to find resource index.ts file in {}",
                    source.path.join("src").display()
                ),
            });
        }
        if source.index_build_file().is_none() {
            return Err(CoreError::InvalidSource {
                path: source.path.clone(),
                message: format!(
                    "unable to find resource index.js file in {}",
                    source.path.join("build").display()
                ),
            });
        }
    }
    Ok(())
}

/// `package name -> [internal dependency]`
pub fn source_dependency_map(sources: &[ResourceSource]) -> DependencyMap<String> {
    sources
        .iter()
        .map(|s| (s.key.clone(), s.internal_dependencies.clone()))
        .collect()
}
