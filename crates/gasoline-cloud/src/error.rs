//! Deploy error types

use crate::action::{Action, HandlerKey};
use gasoline_core::{GraphError, ResourceId};
use std::fmt::Write as _;
use std::path::PathBuf;
use thiserror::Error;

/// Snapshot file errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Unable to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to parse snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a single provisioning call
///
/// Recorded against the resource as `*_FAILED`; never aborts the deploy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("No handler registered for {0}")]
    MissingHandler(HandlerKey),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Previous output is missing or invalid: {0}")]
    MissingOutput(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

/// A resource that ended `*_FAILED`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedResource {
    pub id: ResourceId,
    pub action: Action,
    pub error: String,
}

/// Deploy errors
#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("No provisioning handler registered for: {}", join_keys(keys))]
    MissingHandlers { keys: Vec<HandlerKey> },

    #[error("{}", describe_aggregate(failed, canceled))]
    Aggregate {
        failed: Vec<FailedResource>,
        canceled: Vec<ResourceId>,
    },
}

fn join_keys(keys: &[HandlerKey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_aggregate(failed: &[FailedResource], canceled: &[ResourceId]) -> String {
    let mut out = format!(
        "Deploy failed: {} failed, {} canceled",
        failed.len(),
        canceled.len()
    );
    for f in failed {
        let _ = write!(out, "\n  {} ({}_FAILED): {}", f.id, f.action.label(), f.error);
    }
    for id in canceled {
        let _ = write!(out, "\n  {} (CANCELED)", id);
    }
    out
}

pub type Result<T> = std::result::Result<T, DeployError>;
