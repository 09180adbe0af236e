//! Provisioning handlers for Cloudflare resource types

use crate::api::CloudflareConfig;
use crate::error::CloudflareError;
use crate::kv::{CloudflareKv, namespace_title};
use async_trait::async_trait;
use gasoline_cloud::{Action, BackendRegistry, HandlerKey, ProvisionError, ProvisionRequest, ResourceHandler};
use gasoline_core::ResourceSpec;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Config of a `cloudflare-kv` resource
#[derive(Debug, Clone, Deserialize)]
pub struct KvSpec {
    pub name: String,
}

impl ResourceSpec for KvSpec {
    const TYPE: &'static str = "cloudflare-kv";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Creates, renames and deletes KV namespaces
pub struct KvHandler {
    kv: Arc<CloudflareKv>,
    project: String,
    action: Action,
}

impl KvHandler {
    pub fn new(kv: Arc<CloudflareKv>, project: impl Into<String>, action: Action) -> Self {
        Self {
            kv,
            project: project.into(),
            action,
        }
    }

    fn spec(request: &ProvisionRequest) -> Result<KvSpec, CloudflareError> {
        request
            .config
            .typed::<KvSpec>()
            .map_err(|e| CloudflareError::InvalidConfig(format!("{}: {}", request.id, e)))
    }

    fn previous_namespace_id(request: &ProvisionRequest) -> Result<String, CloudflareError> {
        request
            .previous_output
            .as_ref()
            .and_then(|output| output.get("id"))
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| CloudflareError::MissingOutput(format!("{} has no namespace id", request.id)))
    }

    async fn run(&self, request: &ProvisionRequest) -> Result<serde_json::Value, CloudflareError> {
        let spec = Self::spec(request)?;
        let title = namespace_title(&self.project, spec.name());

        match self.action {
            Action::Create => {
                let namespace = self.kv.create_namespace(&title).await?;
                info!(resource = %request.id, namespace = %namespace.id, "Created KV namespace");
                Ok(json!({ "id": namespace.id, "title": namespace.title }))
            }
            Action::Update => {
                let namespace_id = Self::previous_namespace_id(request)?;
                let namespace = self.kv.rename_namespace(&namespace_id, &title).await?;
                info!(resource = %request.id, namespace = %namespace.id, "Updated KV namespace");
                Ok(json!({ "id": namespace.id, "title": namespace.title }))
            }
            Action::Delete => {
                let namespace_id = Self::previous_namespace_id(request)?;
                self.kv.delete_namespace(&namespace_id).await?;
                info!(resource = %request.id, namespace = %namespace_id, "Deleted KV namespace");
                Ok(serde_json::Value::Null)
            }
        }
    }
}

#[async_trait]
impl ResourceHandler for KvHandler {
    async fn handle(&self, request: &ProvisionRequest) -> Result<serde_json::Value, ProvisionError> {
        debug!(resource = %request.id, action = %self.action, "Handling KV request");
        self.run(request).await.map_err(ProvisionError::from)
    }
}

/// Register every Cloudflare handler
pub fn register_handlers(registry: &mut BackendRegistry, config: CloudflareConfig, project: &str) {
    let kv = Arc::new(CloudflareKv::new(config));
    for action in [Action::Create, Action::Update, Action::Delete] {
        registry.register(
            HandlerKey::new(KvSpec::TYPE, action),
            Arc::new(KvHandler::new(Arc::clone(&kv), project, action)),
        );
    }
}

/// A registry holding only the Cloudflare handlers
pub fn registry(config: CloudflareConfig, project: &str) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    register_handlers(&mut registry, config, project);
    registry
}
