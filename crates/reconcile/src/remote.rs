//! Remote access contracts consumed by the reconciler.
//!
//! The remote service exposes two surfaces:
//!
//! - [`RemoteApi`]: per-entity `list` / `create` / `update` / `delete`
//!   calls returning typed entities, with cursor-paged listing
//! - [`BatchApi`]: ordered multi-command submissions correlated by id,
//!   with temporary ids mapped to real ids in the response
//!
//! Transport concerns (auth, retry, backoff) live behind these traits.
//! See [`crate::mock::MockRemote`] for an in-memory implementation.

use crate::deadline::Deadline;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Maximum commands per batch submission unless the transport says otherwise
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Failure reported by a remote collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Non-success HTTP-style status
    #[error("http {status}{}", body_suffix(.body))]
    Http { status: u16, body: String },

    /// Connection, TLS, timeout or similar transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Response could not be decoded
    #[error("decode response: {0}")]
    Decode(String),

    /// The run's deadline passed before or during the call
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

impl RemoteError {
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into().trim().to_string(),
        }
    }

    /// Whether a transport may retry the call that produced this error
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Transport(_) => true,
            Self::Decode(_) | Self::DeadlineExceeded => false,
        }
    }

    /// HTTP status if this error carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// Live entities
// =============================================================================

/// Remote hierarchical container
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteContainer {
    pub id: String,
    pub name: String,
    pub color: String,
    pub is_favorite: bool,
    pub view_style: String,
    pub parent_id: Option<String>,
    /// Service-designated default container that must never be deleted
    pub is_inbox: bool,
}

/// Remote tag
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteTag {
    pub id: String,
    pub name: String,
    pub color: String,
    pub is_favorite: bool,
}

/// Remote saved query
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteSavedQuery {
    pub id: String,
    pub name: String,
    pub query: String,
    pub color: String,
    pub is_favorite: bool,
    pub item_order: i64,
    pub is_deleted: bool,
}

/// Remote work item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteWorkItem {
    pub id: String,
    pub content: String,
    pub description: String,
    pub container_id: String,
    pub labels: Vec<String>,
    pub priority: u8,
    /// Human due expression as the service echoes it back
    pub due: Option<String>,
}

/// One page of a cursor-paged listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub results: Vec<T>,
    /// Opaque cursor for the next page; `None` or empty when exhausted
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(results: Vec<T>) -> Self {
        Self {
            results,
            next_cursor: None,
        }
    }

    /// Cursor to continue with, if any
    pub fn continuation(&self) -> Option<&str> {
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CreateContainer {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_style: Option<String>,
}

/// Field update; only `Some` fields are sent
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UpdateContainer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CreateTag {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UpdateTag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CreateWorkItem {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UpdateWorkItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

/// Per-entity remote operations.
///
/// Every call receives the run's [`Deadline`] and must give up once it
/// passes rather than retry beyond it.
pub trait RemoteApi: Send + Sync {
    fn list_containers(
        &self,
        cursor: Option<&str>,
        deadline: &Deadline,
    ) -> RemoteResult<Page<RemoteContainer>>;

    fn list_tags(&self, cursor: Option<&str>, deadline: &Deadline) -> RemoteResult<Page<RemoteTag>>;

    fn list_work_items(
        &self,
        cursor: Option<&str>,
        deadline: &Deadline,
    ) -> RemoteResult<Page<RemoteWorkItem>>;

    /// Saved queries are read in one shot, soft-deleted entries included
    fn list_saved_queries(&self, deadline: &Deadline) -> RemoteResult<Vec<RemoteSavedQuery>>;

    fn create_container(
        &self,
        request: &CreateContainer,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteContainer>;

    fn update_container(
        &self,
        id: &str,
        request: &UpdateContainer,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteContainer>;

    fn delete_container(&self, id: &str, deadline: &Deadline) -> RemoteResult<()>;

    fn create_tag(&self, request: &CreateTag, deadline: &Deadline) -> RemoteResult<RemoteTag>;

    fn update_tag(&self, id: &str, request: &UpdateTag, deadline: &Deadline)
    -> RemoteResult<RemoteTag>;

    fn delete_tag(&self, id: &str, deadline: &Deadline) -> RemoteResult<()>;

    fn create_work_item(
        &self,
        request: &CreateWorkItem,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteWorkItem>;

    fn update_work_item(
        &self,
        id: &str,
        request: &UpdateWorkItem,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteWorkItem>;

    /// Relationship change: move a work item into another container
    fn move_work_item(&self, id: &str, container_id: &str, deadline: &Deadline)
    -> RemoteResult<()>;

    fn delete_work_item(&self, id: &str, deadline: &Deadline) -> RemoteResult<()>;
}

// =============================================================================
// Batch commands
// =============================================================================

/// One command of a batch submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCommand {
    #[serde(rename = "type")]
    pub command_type: String,
    /// Correlation id reported back in `sync_status`
    pub uuid: String,
    /// Placeholder id for entities created by this command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    pub args: Map<String, Value>,
}

impl BatchCommand {
    pub fn new(command_type: &str, args: Map<String, Value>) -> Self {
        Self {
            command_type: command_type.to_string(),
            uuid: new_token(),
            temp_id: None,
            args,
        }
    }

    pub fn with_temp_id(command_type: &str, temp_id: String, args: Map<String, Value>) -> Self {
        Self {
            temp_id: Some(temp_id),
            ..Self::new(command_type, args)
        }
    }
}

/// Generate a fresh correlation token
pub fn new_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Response to a batch submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Correlation id to status (`"ok"` or an error object)
    #[serde(default)]
    pub sync_status: HashMap<String, Value>,
    /// Temporary id to real id for created entities
    #[serde(default)]
    pub temp_id_mapping: HashMap<String, String>,
}

/// Multi-command remote surface
pub trait BatchApi: Send + Sync {
    /// Submit one batch; callers keep batches within [`Self::max_batch_size`]
    fn submit(&self, commands: &[BatchCommand], deadline: &Deadline)
    -> RemoteResult<BatchResponse>;

    /// Protocol limit on commands per submission
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}

/// Failure of a batch run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// One or more commands did not report success
    #[error("{}", .0.join("; "))]
    Status(Vec<String>),
}

/// Submit commands, splitting them into sequential sub-batches no larger
/// than the protocol limit, and merge the responses.
///
/// Every command's correlation id must report `"ok"` in the merged
/// response; anything else fails the whole run.
pub fn run_batch(
    api: &dyn BatchApi,
    commands: &[BatchCommand],
    deadline: &Deadline,
) -> Result<BatchResponse, BatchError> {
    let mut merged = BatchResponse::default();
    if commands.is_empty() {
        return Ok(merged);
    }

    let limit = api.max_batch_size().max(1);
    let chunks = commands.len().div_ceil(limit);
    for (index, chunk) in commands.chunks(limit).enumerate() {
        deadline.check()?;
        log::debug!(
            "submitting batch {}/{} ({} commands)",
            index + 1,
            chunks,
            chunk.len()
        );
        let response = api.submit(chunk, deadline)?;
        merged.sync_status.extend(response.sync_status);
        merged.temp_id_mapping.extend(response.temp_id_mapping);
    }

    require_all_ok(&merged, commands)?;
    Ok(merged)
}

/// Validate that every submitted command reported success
pub fn require_all_ok(response: &BatchResponse, commands: &[BatchCommand]) -> Result<(), BatchError> {
    let failures: Vec<String> = commands
        .iter()
        .filter_map(|cmd| match response.sync_status.get(&cmd.uuid) {
            None => Some(format!(
                "status missing uuid={} type={}",
                cmd.uuid, cmd.command_type
            )),
            Some(Value::String(s)) if s == "ok" => None,
            Some(Value::String(s)) => Some(format!(
                "uuid={} type={}: {s}",
                cmd.uuid, cmd.command_type
            )),
            Some(other) => Some(format!(
                "uuid={} type={}: {other}",
                cmd.uuid, cmd.command_type
            )),
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(BatchError::Status(failures))
    }
}
