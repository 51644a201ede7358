//! Error types for reconciliation.
//!
//! Errors are categorized so callers can tell input mistakes apart from
//! ambiguity, structural problems, and remote failures. Every error is
//! fatal for the run; there is no silent recovery at this layer.

use crate::remote::{BatchError, RemoteError};
use crate::types::{Action, ApplyResult, Kind};
use std::fmt;
use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing inputs or references the remote side does not know
    Input,
    /// A name matches several remote entities
    Ambiguity,
    /// Ordering or indexing invariant broken
    Structural,
    /// Remote call or batch status failed
    Remote,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Input => "Invalid input",
            Self::Ambiguity => "Ambiguous name",
            Self::Structural => "Structural inconsistency",
            Self::Remote => "Remote failure",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Input => "Fix the desired spec and run again",
            Self::Ambiguity => "Add an explicit id to the desired entity to pick one candidate",
            Self::Structural => "Check the desired spec for parent cycles and the remote for duplicates",
            Self::Remote => "Run again; reconciliation converges from partially applied state",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while snapshotting, planning, or applying.
#[derive(Debug, Error)]
pub enum Error {
    /// Required input missing or malformed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Desired entity names an explicit id the remote does not have
    #[error("{kind} {name:?} references id {id:?} which was not found")]
    UnknownId { kind: Kind, name: String, id: String },

    /// Several remote entities share the desired name
    #[error(
        "remote has {} {} named {name:?} (ids: {}); cannot reconcile by name",
        .ids.len(),
        .kind.plural(),
        .ids.join(", ")
    )]
    Ambiguous {
        kind: Kind,
        name: String,
        /// Candidate ids, sorted
        ids: Vec<String>,
    },

    /// Remote listing returned two entities with one id
    #[error("remote has duplicate {kind} id {id:?}")]
    DuplicateRemoteId { kind: Kind, id: String },

    /// Two remote work items carry the same managed key
    #[error("remote has duplicate managed work item key {key:?} (ids: {first}, {second})")]
    DuplicateManagedKey {
        key: String,
        first: String,
        second: String,
    },

    /// Create batch contains a parent cycle
    #[error("{kind} create ordering cycle detected among: {}", .names.join(", "))]
    CreateCycle { kind: Kind, names: Vec<String> },

    /// Operation reached apply without the payload its kind needs
    #[error("{kind} {action} operation for {name:?} is missing its payload")]
    MissingPayload {
        kind: Kind,
        action: Action,
        name: String,
    },

    /// A name reference could not be resolved to a remote id during apply
    #[error("{kind} {name:?}: {reference} id not found")]
    UnresolvedReference {
        kind: Kind,
        name: String,
        reference: String,
    },

    /// Snapshot listing failed
    #[error("list {what}: {source}")]
    Fetch {
        what: &'static str,
        #[source]
        source: RemoteError,
    },

    /// Single-entity remote call failed
    #[error("{action} {kind} {name:?}: {source}")]
    Remote {
        kind: Kind,
        action: Action,
        name: String,
        #[source]
        source: RemoteError,
    },

    /// Batch submission failed or reported non-success statuses
    #[error("batch {context}: {source}")]
    Batch {
        context: String,
        #[source]
        source: BatchError,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidInput(_) | Error::UnknownId { .. } | Error::MissingPayload { .. } => {
                ErrorCategory::Input
            }
            Error::Ambiguous { .. } => ErrorCategory::Ambiguity,
            Error::DuplicateRemoteId { .. }
            | Error::DuplicateManagedKey { .. }
            | Error::CreateCycle { .. }
            | Error::UnresolvedReference { .. } => ErrorCategory::Structural,
            Error::Fetch { .. } | Error::Remote { .. } | Error::Batch { .. } => {
                ErrorCategory::Remote
            }
        }
    }

    pub(crate) fn remote(kind: Kind, action: Action, name: &str, source: RemoteError) -> Self {
        Self::Remote {
            kind,
            action,
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn batch(context: impl Into<String>, source: BatchError) -> Self {
        Self::Batch {
            context: context.into(),
            source,
        }
    }
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, Error>;

/// Apply aborted part-way.
///
/// `partial` holds every outcome recorded before the failure plus one
/// entry for the failing operation whose status is the failure detail.
/// Applied operations are not rolled back; running reconciliation again
/// converges.
#[derive(Debug, Error)]
#[error("apply aborted after {} successful operations", .partial.succeeded())]
pub struct ApplyError {
    pub partial: Box<ApplyResult>,
    #[source]
    pub source: Error,
}

impl ApplyError {
    pub fn category(&self) -> ErrorCategory {
        self.source.category()
    }
}
