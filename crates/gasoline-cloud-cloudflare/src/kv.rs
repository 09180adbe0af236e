//! Workers KV namespace API client

use crate::api::{CloudflareConfig, read_result};
use crate::error::{CloudflareError, Result};
use serde::{Deserialize, Serialize};

/// A Workers KV namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvNamespace {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
struct NamespaceRequest<'a> {
    title: &'a str,
}

/// Workers KV namespace manager
pub struct CloudflareKv {
    client: reqwest::Client,
    config: CloudflareConfig,
}

impl CloudflareKv {
    pub fn new(config: CloudflareConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn namespaces_url(&self) -> String {
        format!(
            "{}/accounts/{}/storage/kv/namespaces",
            self.config.api_base, self.config.account_id
        )
    }

    fn namespace_url(&self, namespace_id: &str) -> String {
        format!("{}/{}", self.namespaces_url(), namespace_id)
    }

    /// Create a namespace
    pub async fn create_namespace(&self, title: &str) -> Result<KvNamespace> {
        let response = self
            .client
            .post(self.namespaces_url())
            .bearer_auth(&self.config.api_token)
            .json(&NamespaceRequest { title })
            .send()
            .await?;

        let namespace: Option<KvNamespace> = read_result(response).await?;
        namespace.ok_or_else(|| CloudflareError::ApiError("empty create namespace result".to_string()))
    }

    /// Rename a namespace
    pub async fn rename_namespace(&self, namespace_id: &str, title: &str) -> Result<KvNamespace> {
        let response = self
            .client
            .put(self.namespace_url(namespace_id))
            .bearer_auth(&self.config.api_token)
            .json(&NamespaceRequest { title })
            .send()
            .await?;

        let _: Option<serde_json::Value> = read_result(response).await?;
        Ok(KvNamespace {
            id: namespace_id.to_string(),
            title: title.to_string(),
        })
    }

    /// Delete a namespace
    pub async fn delete_namespace(&self, namespace_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.namespace_url(namespace_id))
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;

        let _: Option<serde_json::Value> = read_result(response).await?;
        Ok(())
    }
}

/// `CORE_BASE_KV` -> `Core-Base-Kv`
pub fn capital_snake_to_train_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Namespace title for a resource name: `<project>-<Train-Case-Name>`
pub fn namespace_title(project: &str, name: &str) -> String {
    format!("{}-{}", project, capital_snake_to_train_case(name))
}
