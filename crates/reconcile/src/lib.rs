//! # Reconcile
//!
//! Declarative reconciliation of remote task-service entities.
//!
//! The engine captures remote state, diffs it against a desired spec, and
//! applies the resulting plan in an order the remote side accepts.
//!
//! ## Core Concepts
//!
//! - **Snapshot**: immutable per-run capture of remote state, indexed by id
//!   and by name (names may repeat remotely)
//! - **Plan**: field-level operations sorted for display, plus a summary
//!   and advisory notes
//! - **Executor**: issues operations phase by phase, batching where the
//!   remote protocol allows and resolving temporary ids
//!
//! ## Example
//!
//! ```
//! use reconcile::mock::MockRemote;
//! use reconcile::{
//!     apply, build_plan, build_snapshot, ApplyContext, Deadline, DesiredContainer,
//!     DesiredSpec, NoProgress, PruneOptions,
//! };
//!
//! let remote = MockRemote::new();
//! let desired = DesiredSpec {
//!     containers: vec![DesiredContainer {
//!         name: "Work".to_string(),
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//!
//! let snapshot = build_snapshot(&remote, &Deadline::none())?;
//! let plan = build_plan(&desired, &snapshot, PruneOptions::default())?;
//! assert_eq!(plan.summary.create, 1);
//!
//! let mut progress = NoProgress;
//! let mut ctx = ApplyContext::new(&remote, &remote, &mut progress);
//! let result = apply(&desired, &snapshot, &plan, &mut ctx)?;
//! assert_eq!(result.succeeded(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`RemoteApi`]: per-entity list/create/update/delete calls
//! - [`BatchApi`]: multi-command submissions with temporary ids
//! - [`ProgressCallback`]: receives progress updates during apply
//!
//! Transport retry policy lives behind these traits; the engine itself
//! never sleeps or retries.

pub mod context;
pub mod deadline;
pub mod desired;
pub mod error;
pub mod executor;
pub mod managed_key;
pub mod mock;
pub mod order;
pub mod planner;
pub mod remote;
pub mod snapshot;
pub mod types;

// Re-export main types at crate root
pub use context::{ApplyContext, NoProgress, ProgressCallback};
pub use deadline::Deadline;
pub use desired::{
    DesiredContainer, DesiredSavedQuery, DesiredSpec, DesiredTag, DesiredWorkItem, PruneSpec,
};
pub use error::{ApplyError, Error, ErrorCategory, Result};
pub use executor::{REORDER_NAME, apply};
pub use planner::{PruneOptions, build_plan};
pub use remote::{BatchApi, BatchCommand, BatchResponse, RemoteApi, RemoteError, run_batch};
pub use snapshot::{Snapshot, build_snapshot};
pub use types::{
    Action, ApplyResult, Change, Kind, Operation, OperationResult, Payload, Plan, Summary,
};
