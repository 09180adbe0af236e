//! Config resolvers
//!
//! A resolver turns resource sources into their resolved configs. Sources
//! are handed over deepest-first so cross-references between configs
//! resolve in dependency order.

use crate::discovery::{ResourceSource, validate_index_files};
use crate::error::{CoreError, Result};
use crate::model::ResourceConfig;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, instrument};

/// Resolved configs keyed by source key (package name)
pub type ResolvedConfigs = BTreeMap<String, ResourceConfig>;

/// Turns resource sources into configs
pub trait ConfigResolver: Send + Sync {
    /// Check the sources carry what this resolver needs
    fn validate(&self, sources: &[ResourceSource]) -> Result<()> {
        let _ = sources;
        Ok(())
    }

    /// Resolve every source; errors name the offending source
    fn resolve(&self, sources: &[ResourceSource]) -> Result<ResolvedConfigs>;
}

/// Reads `<source>/resource.json`
#[derive(Debug, Clone)]
pub struct JsonConfigResolver {
    file_name: String,
}

impl JsonConfigResolver {
    pub const DEFAULT_FILE_NAME: &'static str = "resource.json";

    pub fn new() -> Self {
        Self {
            file_name: Self::DEFAULT_FILE_NAME.to_string(),
        }
    }

    pub fn with_file_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl Default for JsonConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver for JsonConfigResolver {
    fn validate(&self, sources: &[ResourceSource]) -> Result<()> {
        for source in sources {
            let path = source.path.join(&self.file_name);
            if !path.is_file() {
                return Err(CoreError::InvalidSource {
                    path: source.path.clone(),
                    message: format!("unable to find {}", path.display()),
                });
            }
        }
        Ok(())
    }

    fn resolve(&self, sources: &[ResourceSource]) -> Result<ResolvedConfigs> {
        let mut configs = ResolvedConfigs::new();
        for source in sources {
            let path = source.path.join(&self.file_name);
            let content = std::fs::read_to_string(&path).map_err(|e| CoreError::Resolve {
                source_key: source.key.clone(),
                message: format!("unable to read {}: {}", path.display(), e),
            })?;
            let value: serde_json::Value =
                serde_json::from_str(&content).map_err(|e| CoreError::Resolve {
                    source_key: source.key.clone(),
                    message: format!("unable to parse {}: {}", path.display(), e),
                })?;
            configs.insert(source.key.clone(), ResourceConfig::new(value));
        }
        Ok(configs)
    }
}

/// Imports each source's built index module with Node.js and prints the
/// first export whose `id` looks like a resource ID
///
/// The generated module is piped to `node --input-type=module` on stdin.
#[derive(Debug, Clone)]
pub struct ScriptConfigResolver {
    node: String,
    working_dir: PathBuf,
}

impl ScriptConfigResolver {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            node: "node".to_string(),
            working_dir: working_dir.into(),
        }
    }

    /// Use a specific Node.js executable
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    /// Pipe the script to node and return its stdout
    ///
    /// The child is always waited on, also when the script cannot be sent.
    fn run_script(&self, script: &str, source_key: &str) -> Result<String> {
        let resolve_err = |message: String| CoreError::Resolve {
            source_key: source_key.to_string(),
            message,
        };

        let mut child = Command::new(&self.node)
            .arg("--input-type=module")
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| resolve_err(format!("unable to run {}: {}", self.node, e)))?;

        // stdin is closed at the end of this statement
        let sent = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(script.as_bytes()),
            None => Ok(()),
        };

        let output = child
            .wait_with_output()
            .map_err(|e| resolve_err(format!("{} did not finish: {}", self.node, e)))?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Err(e) = sent {
            return Err(resolve_err(format!(
                "unable to send the resolver script to {}: {}\n{}",
                self.node,
                e,
                stderr.trim()
            )));
        }
        if !output.status.success() {
            return Err(resolve_err(format!(
                "config resolver script failed\n{}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn build_files(&self, sources: &[ResourceSource]) -> Result<Vec<PathBuf>> {
        sources
            .iter()
            .map(|source| {
                let file = source.index_build_file().ok_or_else(|| CoreError::Resolve {
                    source_key: source.key.clone(),
                    message: "no built index file; build the resource first".to_string(),
                })?;
                Ok(absolute(&self.working_dir, &file))
            })
            .collect()
    }
}

fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// ES module printing a JSON array with one config (or `null`) per file
pub fn build_resolver_script(files: &[PathBuf]) -> Result<String> {
    let paths: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
    let paths_json = serde_json::to_string(&paths)?;

    Ok(format!(
        r#"import {{ pathToFileURL }} from 'url';

const files = {paths_json};
const resourceId = /^[^:]+:[^:]+:[^:]+(:[^:]+)*$/;

try {{
  const configs = [];
  for (const file of files) {{
    const exports = await import(pathToFileURL(file).href);
    let found = null;
    for (const key in exports) {{
      const item = exports[key];
      if (item && typeof item.id === 'string' && resourceId.test(item.id)) {{
        found = item;
        break;
      }}
    }}
    configs.push(found);
  }}
  console.log(JSON.stringify(configs));
}} catch (error) {{
  console.error(error);
  process.exit(1);
}}
"#
    ))
}

/// Pair the script's JSON output with the sources it was generated for
pub fn parse_resolver_output(sources: &[ResourceSource], stdout: &str) -> Result<ResolvedConfigs> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(stdout.trim()).map_err(|e| CoreError::Resolve {
            source_key: "*".to_string(),
            message: format!("unable to parse exported resource configs: {}", e),
        })?;

    if values.len() != sources.len() {
        return Err(CoreError::Resolve {
            source_key: "*".to_string(),
            message: format!(
                "expected {} resource configs, got {}",
                sources.len(),
                values.len()
            ),
        });
    }

    let mut configs = ResolvedConfigs::new();
    for (source, value) in sources.iter().zip(values) {
        if value.is_null() {
            return Err(CoreError::Resolve {
                source_key: source.key.clone(),
                message: "no export with a resource id was found".to_string(),
            });
        }
        configs.insert(source.key.clone(), ResourceConfig::new(value));
    }
    Ok(configs)
}

impl ConfigResolver for ScriptConfigResolver {
    fn validate(&self, sources: &[ResourceSource]) -> Result<()> {
        validate_index_files(sources)
    }

    #[instrument(skip(self, sources), fields(sources = sources.len()))]
    fn resolve(&self, sources: &[ResourceSource]) -> Result<ResolvedConfigs> {
        if sources.is_empty() {
            return Ok(ResolvedConfigs::new());
        }

        let files = self.build_files(sources)?;
        let script = build_resolver_script(&files)?;
        debug!(node = %self.node, files = files.len(), "Running config resolver script");

        let keys: Vec<&str> = sources.iter().map(|s| s.key.as_str()).collect();
        let stdout = self.run_script(&script, &keys.join(", "))?;
        parse_resolver_output(sources, &stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{PackageJson, scan_container};
    use std::fs;
    use tempfile::tempdir;

    fn source(key: &str, path: &Path) -> ResourceSource {
        ResourceSource {
            key: key.to_string(),
            path: path.to_path_buf(),
            package: PackageJson {
                name: key.to_string(),
                ..Default::default()
            },
            internal_dependencies: vec![],
        }
    }

    #[test]
    fn test_json_resolver() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("kv");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), r#"{"name":"kv"}"#).unwrap();
        fs::write(
            dir.join("resource.json"),
            r#"{"id":"core:base:cloudflare-kv:1","type":"cloudflare-kv","name":"CORE_BASE_KV"}"#,
        )
        .unwrap();

        let sources = scan_container(tmp.path()).unwrap();
        let resolver = JsonConfigResolver::new();
        resolver.validate(&sources).unwrap();

        let configs = resolver.resolve(&sources).unwrap();
        assert_eq!(configs["kv"].name(), Some("CORE_BASE_KV"));
    }

    #[test]
    fn test_json_resolver_names_failing_source() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("resource.json"), "{ not json").unwrap();

        let err = JsonConfigResolver::new()
            .resolve(&[source("broken", tmp.path())])
            .unwrap_err();

        match err {
            CoreError::Resolve { source_key, .. } => assert_eq!(source_key, "broken"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_build_resolver_script() {
        let files = vec![
            PathBuf::from("/work/gas/kv/build/_core.base.kv.index.js"),
            PathBuf::from("/work/gas/api/build/_core.base.api.index.js"),
        ];
        let script = build_resolver_script(&files).unwrap();

        assert!(script.contains(
            r#"["/work/gas/kv/build/_core.base.kv.index.js","/work/gas/api/build/_core.base.api.index.js"]"#
        ));
        assert!(script.starts_with("import { pathToFileURL } from 'url';"));
    }

    #[test]
    fn test_parse_resolver_output() {
        let tmp = tempdir().unwrap();
        let sources = vec![source("kv", tmp.path()), source("api", tmp.path())];

        let configs = parse_resolver_output(
            &sources,
            r#"[{"id":"a:b:cloudflare-kv:1","name":"KV"},{"id":"a:b:cloudflare-worker:1","name":"API"}]"#,
        )
        .unwrap();
        assert_eq!(configs["api"].name(), Some("API"));

        let err = parse_resolver_output(&sources, r#"[{"id":"a:b:cloudflare-kv:1"},null]"#)
            .unwrap_err();
        match err {
            CoreError::Resolve { source_key, .. } => assert_eq!(source_key, "api"),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(parse_resolver_output(&sources, "[]").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_script_not_read_by_interpreter() {
        // `true` exits without reading stdin, so a script larger than the
        // pipe buffer cannot be written
        let resolver = ScriptConfigResolver::new(std::env::temp_dir()).with_node("true");
        let script = "x".repeat(4 * 1024 * 1024);

        match resolver.run_script(&script, "core-base-kv, core-api") {
            Err(CoreError::Resolve {
                source_key,
                message,
            }) => {
                assert_eq!(source_key, "core-base-kv, core-api");
                assert!(message.starts_with("unable to send the resolver script to true"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_script_resolver_requires_build_file() {
        let tmp = tempdir().unwrap();
        let resolver = ScriptConfigResolver::new(tmp.path());

        let err = resolver.resolve(&[source("kv", tmp.path())]).unwrap_err();
        assert!(matches!(err, CoreError::Resolve { .. }));
    }
}
