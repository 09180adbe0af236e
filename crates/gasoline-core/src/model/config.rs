use super::id::ResourceType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Resolved configuration of one resource
///
/// Configs are opaque JSON objects; the engine only relies on the `type` and
/// `name` fields every config variant carries. Provisioning handlers decode
/// the object into their own typed spec with [`ResourceConfig::typed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceConfig(serde_json::Value);

impl ResourceConfig {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Declared resource type (`type` field)
    pub fn resource_type(&self) -> Option<ResourceType> {
        self.0
            .get("type")
            .and_then(|v| v.as_str())
            .map(ResourceType::new)
    }

    /// Declared resource name (`name` field)
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(|v| v.as_str())
    }

    /// Declared resource ID (`id` field), as exported by resource sources
    pub fn declared_id(&self) -> Option<&str> {
        self.0.get("id").and_then(|v| v.as_str())
    }

    /// Decode into a typed spec
    pub fn typed<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.0.clone())
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for ResourceConfig {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// A typed resource configuration
///
/// Implemented by the config structs provisioning backends decode into, so
/// every variant exposes its type and name without inspecting raw JSON.
pub trait ResourceSpec: DeserializeOwned {
    /// Type tag this spec is registered under
    const TYPE: &'static str;

    fn name(&self) -> &str;
}
