use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Index of the `:`-separated segment that names the resource type
const TYPE_SEGMENT: usize = 2;

/// Unique identifier of a declared resource
///
/// IDs are `:`-separated with at least three non-empty segments, the third
/// of which is the resource type used for provisioning dispatch
/// (`core:base:cloudflare-kv:12345` has type `cloudflare-kv`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let segments: Vec<&str> = raw.split(':').collect();
        if segments.len() <= TYPE_SEGMENT || segments.iter().any(|s| s.is_empty()) {
            return Err(CoreError::InvalidResourceId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Type segment of the ID
    pub fn resource_type(&self) -> ResourceType {
        // parse() guarantees the segment exists
        let segment = self.0.split(':').nth(TYPE_SEGMENT).unwrap_or_default();
        ResourceType::new(segment)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Resource type such as `cloudflare-kv`
///
/// Left open so provisioning backends can register types this crate does not
/// know about.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
