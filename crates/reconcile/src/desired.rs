//! Desired state as handed to the reconciler.
//!
//! Construction (file loading, normalization, validation) happens
//! upstream. The reconciler assumes names and explicit ids are unique per
//! kind, container parents name known containers without cycles, and every
//! work item carries an id or a managed key.

use serde::{Deserialize, Serialize};

/// The full desired state for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredSpec {
    #[serde(default)]
    pub containers: Vec<DesiredContainer>,
    #[serde(default)]
    pub tags: Vec<DesiredTag>,
    #[serde(default)]
    pub saved_queries: Vec<DesiredSavedQuery>,
    #[serde(default)]
    pub work_items: Vec<DesiredWorkItem>,
    #[serde(default)]
    pub prune: PruneSpec,
}

impl DesiredSpec {
    /// Order a saved query takes, defaulting to its 1-based list position
    pub fn effective_order(&self, index: usize) -> i64 {
        self.saved_queries
            .get(index)
            .and_then(|q| q.order)
            .unwrap_or(index as i64 + 1)
    }

    pub fn container(&self, name: &str) -> Option<&DesiredContainer> {
        self.containers.iter().find(|c| c.name == name)
    }
}

/// Per-kind permission to delete unmanaged remote entities.
///
/// Deletions also require pruning to be enabled for the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneSpec {
    #[serde(default)]
    pub containers: bool,
    #[serde(default)]
    pub tags: bool,
    #[serde(default)]
    pub saved_queries: bool,
    #[serde(default)]
    pub work_items: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredContainer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Parent container by name; `None` means root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_style: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredTag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredSavedQuery {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredWorkItem {
    /// Managed key embedded in the remote description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    /// User description, without the managed key annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Container by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

impl DesiredWorkItem {
    /// Display name used in operations: the key when present, else content
    pub fn display_name(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.content)
    }
}
