//! Apply context and progress reporting
//!
//! The executor reaches the remote service only through the collaborators
//! held here, so it can run against the HTTP clients or an in-memory mock.

use crate::deadline::Deadline;
use crate::remote::{BatchApi, RemoteApi};
use crate::types::{Action, Kind, OperationResult};

/// Progress callback for apply runs
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called before a phase issues its first remote call
    fn on_phase_start(&mut self, kind: Kind, action: Action, count: usize);

    /// Called after each operation's outcome is recorded
    fn on_operation_complete(&mut self, result: &OperationResult);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase_start(&mut self, _kind: Kind, _action: Action, _count: usize) {}
    fn on_operation_complete(&mut self, _result: &OperationResult) {}
}

/// Everything an apply run needs besides the plan itself
pub struct ApplyContext<'a> {
    /// Bound on the whole run; checked before every remote call
    pub deadline: Deadline,
    pub remote: &'a dyn RemoteApi,
    pub batch: &'a dyn BatchApi,
    pub progress: &'a mut dyn ProgressCallback,
}

impl<'a> ApplyContext<'a> {
    pub fn new(
        remote: &'a dyn RemoteApi,
        batch: &'a dyn BatchApi,
        progress: &'a mut dyn ProgressCallback,
    ) -> Self {
        Self {
            deadline: Deadline::none(),
            remote,
            batch,
            progress,
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }
}
