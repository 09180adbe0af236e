//! Provisioning actions and handler keys

use gasoline_core::{DiffState, ResourceType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provisioning operation applied to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
}

impl Action {
    /// Action for a diff state; `Unchanged` needs none
    pub fn from_diff(state: DiffState) -> Option<Self> {
        match state {
            DiffState::Created => Some(Action::Create),
            DiffState::Updated => Some(Action::Update),
            DiffState::Deleted => Some(Action::Delete),
            DiffState::Unchanged => None,
        }
    }

    pub fn diff_state(&self) -> DiffState {
        match self {
            Action::Create => DiffState::Created,
            Action::Update => DiffState::Updated,
            Action::Delete => DiffState::Deleted,
        }
    }

    /// Upper-case name used in deploy state labels
    pub fn label(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// Dispatch key of a provisioning handler
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandlerKey {
    pub resource_type: ResourceType,
    pub action: Action,
}

impl HandlerKey {
    pub fn new(resource_type: impl Into<ResourceType>, action: Action) -> Self {
        Self {
            resource_type: resource_type.into(),
            action,
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_from_diff() {
        assert_eq!(Action::from_diff(DiffState::Created), Some(Action::Create));
        assert_eq!(Action::from_diff(DiffState::Deleted), Some(Action::Delete));
        assert_eq!(Action::from_diff(DiffState::Unchanged), None);
        assert_eq!(Action::Update.diff_state(), DiffState::Updated);
    }

    #[test]
    fn test_handler_key_display() {
        let key = HandlerKey::new("cloudflare-kv", Action::Create);
        assert_eq!(key.to_string(), "cloudflare-kv:create");
    }
}
