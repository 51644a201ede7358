//! Core types for reconciliation plans and apply results

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity kind managed by the reconciler.
///
/// Variant order is the plan display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Hierarchical container (remote: project)
    Container,
    /// Flat label (remote: label)
    Tag,
    /// Named persisted filter with a display order (remote: filter)
    SavedQuery,
    /// Task-like entity (remote: task)
    WorkItem,
}

impl Kind {
    /// Stable machine name, also used in prune flag names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Tag => "tag",
            Self::SavedQuery => "saved_query",
            Self::WorkItem => "work_item",
        }
    }

    /// Plural human label used in notes
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Container => "containers",
            Self::Tag => "tags",
            Self::SavedQuery => "saved queries",
            Self::WorkItem => "work items",
        }
    }

    /// Name of the per-kind prune flag
    pub fn prune_flag(&self) -> &'static str {
        match self {
            Self::Container => "containers",
            Self::Tag => "tags",
            Self::SavedQuery => "saved_queries",
            Self::WorkItem => "work_items",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an operation does to its entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Move,
    Delete,
    Reorder,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Move => "move",
            Self::Delete => "delete",
            Self::Reorder => "reorder",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level difference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub field: String,
    pub from: String,
    pub to: String,
}

impl Change {
    pub fn new(field: &str, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Container attributes carried from plan to apply
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerPayload {
    pub name: String,
    pub parent: Option<String>,
    pub color: Option<String>,
    pub is_favorite: Option<bool>,
    pub view_style: Option<String>,
}

/// Tag attributes carried from plan to apply
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagPayload {
    pub name: String,
    pub color: Option<String>,
    pub is_favorite: Option<bool>,
}

/// Saved query attributes carried from plan to apply
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SavedQueryPayload {
    pub name: String,
    pub query: String,
    pub color: Option<String>,
    pub is_favorite: Option<bool>,
    /// Effective 1-based display order
    pub order: i64,
}

/// Work item attributes carried from plan to apply
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkItemPayload {
    pub key: Option<String>,
    pub content: String,
    /// Full description to write, managed key annotation included
    pub description: Option<String>,
    /// Container name the item belongs in
    pub container: Option<String>,
    pub labels: Option<Vec<String>>,
    pub priority: Option<u8>,
    pub due: Option<String>,
}

/// Kind-specific operation payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Container(ContainerPayload),
    Tag(TagPayload),
    SavedQuery(SavedQueryPayload),
    WorkItem(WorkItemPayload),
}

/// The atomic unit of planning and execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub kind: Kind,
    pub action: Action,
    /// Display name (desired name, or remote name for deletes)
    pub name: String,
    /// Remote identifier when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,
    #[serde(skip)]
    pub payload: Option<Payload>,
}

impl Operation {
    pub fn new(kind: Kind, action: Action, name: impl Into<String>) -> Self {
        Self {
            kind,
            action,
            name: name.into(),
            id: None,
            changes: Vec::new(),
            payload: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_changes(mut self, changes: Vec<Change>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Whether any change touches the given field
    pub fn changes_field(&self, field: &str) -> bool {
        self.changes.iter().any(|c| c.field == field)
    }

    /// Key used for deterministic plan display order
    pub fn sort_key(&self) -> (Kind, &str, Action) {
        (self.kind, self.name.as_str(), self.action)
    }
}

/// Counts per action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub create: usize,
    pub update: usize,
    #[serde(rename = "move")]
    pub moves: usize,
    pub delete: usize,
    pub reorder: usize,
}

impl Summary {
    /// Count one operation of the given action
    pub fn record(&mut self, action: Action) {
        match action {
            Action::Create => self.create += 1,
            Action::Update => self.update += 1,
            Action::Move => self.moves += 1,
            Action::Delete => self.delete += 1,
            Action::Reorder => self.reorder += 1,
        }
    }

    pub fn total_changes(&self) -> usize {
        self.create + self.update + self.moves + self.delete + self.reorder
    }

    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }
}

/// Ordered operations plus summary and advisory notes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub operations: Vec<Operation>,
    pub summary: Summary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Plan {
    /// Append an operation and count it
    pub fn push(&mut self, op: Operation) {
        self.summary.record(op.action);
        self.operations.push(op);
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations matching a kind and action, in plan order
    pub fn operations_of(&self, kind: Kind, action: Action) -> Vec<Operation> {
        self.operations
            .iter()
            .filter(|op| op.kind == kind && op.action == action)
            .cloned()
            .collect()
    }
}

/// Outcome of one applied operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub kind: Kind,
    pub action: Action,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// "ok" or the failure detail
    pub status: String,
}

impl OperationResult {
    pub const OK: &'static str = "ok";

    pub fn ok(kind: Kind, action: Action, name: &str, id: Option<String>) -> Self {
        Self {
            kind,
            action,
            name: name.to_string(),
            id,
            status: Self::OK.to_string(),
        }
    }

    pub fn failed(kind: Kind, action: Action, name: &str, id: Option<String>, detail: String) -> Self {
        Self {
            kind,
            action,
            name: name.to_string(),
            id,
            status: detail,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Self::OK
    }
}

/// Per-operation outcomes of one apply run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub applied: Vec<OperationResult>,
    pub summary: Summary,
}

impl ApplyResult {
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            applied: Vec::new(),
            summary: plan.summary,
        }
    }

    /// Number of operations that completed successfully
    pub fn succeeded(&self) -> usize {
        self.applied.iter().filter(|r| r.is_ok()).count()
    }

    /// Find the recorded outcome for an operation
    pub fn find(&self, kind: Kind, action: Action, name: &str) -> Option<&OperationResult> {
        self.applied
            .iter()
            .find(|r| r.kind == kind && r.action == action && r.name == name)
    }
}
