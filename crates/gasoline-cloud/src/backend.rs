//! Provisioning backend contract
//!
//! The orchestrator talks to the cloud through [`ProvisioningBackend`]. The
//! usual backend is a [`BackendRegistry`] of typed handlers keyed by
//! `(resource type, action)`, checked against the deploy plan before any
//! provisioning starts.

use crate::action::HandlerKey;
use crate::error::{DeployError, ProvisionError};
use async_trait::async_trait;
use gasoline_core::{ResourceConfig, ResourceId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One provisioning call
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub id: ResourceId,
    pub key: HandlerKey,
    /// Current config; the recorded config for deletions
    pub config: ResourceConfig,
    /// Output recorded by the previous deploy, if any
    pub previous_output: Option<serde_json::Value>,
}

/// Executes single create/update/delete operations
///
/// Must be safe to call concurrently for distinct resources.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Whether a handler exists for the key
    fn supports(&self, key: &HandlerKey) -> bool;

    /// Provision one resource and return the output to record
    async fn provision(&self, request: ProvisionRequest) -> Result<serde_json::Value, ProvisionError>;
}

/// Handler for one `(resource type, action)` pair
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn handle(&self, request: &ProvisionRequest) -> Result<serde_json::Value, ProvisionError>;
}

/// Fail with every key the backend cannot serve
pub fn validate_backend<'a>(
    backend: &dyn ProvisioningBackend,
    keys: impl IntoIterator<Item = &'a HandlerKey>,
) -> Result<(), DeployError> {
    let mut missing: Vec<HandlerKey> = keys
        .into_iter()
        .filter(|key| !backend.supports(key))
        .cloned()
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    missing.sort();
    missing.dedup();
    Err(DeployError::MissingHandlers { keys: missing })
}

/// Handlers keyed by `(resource type, action)`
#[derive(Default, Clone)]
pub struct BackendRegistry {
    handlers: BTreeMap<HandlerKey, Arc<dyn ResourceHandler>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: HandlerKey, handler: Arc<dyn ResourceHandler>) -> &mut Self {
        if self.handlers.insert(key.clone(), handler).is_some() {
            tracing::warn!(handler = %key, "Replacing registered handler");
        }
        self
    }

    pub fn with_handler(mut self, key: HandlerKey, handler: Arc<dyn ResourceHandler>) -> Self {
        self.register(key, handler);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &HandlerKey> {
        self.handlers.keys()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Fail fast on keys without a handler
    pub fn validate<'a>(&self, keys: impl IntoIterator<Item = &'a HandlerKey>) -> Result<(), DeployError> {
        validate_backend(self, keys)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ProvisioningBackend for BackendRegistry {
    fn supports(&self, key: &HandlerKey) -> bool {
        self.handlers.contains_key(key)
    }

    async fn provision(&self, request: ProvisionRequest) -> Result<serde_json::Value, ProvisionError> {
        let handler = self
            .handlers
            .get(&request.key)
            .ok_or_else(|| ProvisionError::MissingHandler(request.key.clone()))?;
        handler.handle(&request).await
    }
}
