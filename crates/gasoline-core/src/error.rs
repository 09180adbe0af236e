use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or leveling a dependency graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Dependency cycle detected between: {}", nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    #[error("'{node}' depends on '{dependency}', which is not a declared resource")]
    DanglingDependency { node: String, dependency: String },
}

/// Errors raised while scanning the resource container or resolving configs
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unable to read resource container {path}\nReason: {message}")]
    ContainerError { path: PathBuf, message: String },

    #[error("Invalid resource source {path}\nReason: {message}")]
    InvalidSource { path: PathBuf, message: String },

    #[error("Unable to resolve config for '{source_key}'\nReason: {message}")]
    Resolve { source_key: String, message: String },

    #[error("Invalid resource ID '{0}': expected at least three ':'-separated segments")]
    InvalidResourceId(String),

    #[error("Resource '{id}' declares type '{config_type}' but its ID names type '{id_type}'")]
    TypeMismatch {
        id: String,
        id_type: String,
        config_type: String,
    },

    #[error("Resource ID '{id}' is declared by both {first} and {second}")]
    DuplicateResourceId {
        id: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
