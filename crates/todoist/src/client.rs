//! Todoist client combining the REST and sync surfaces.

use crate::http::HttpClient;
use reconcile::remote::DEFAULT_MAX_BATCH_SIZE;

/// Todoist API client.
///
/// Implements [`reconcile::RemoteApi`] over the REST endpoints and
/// [`reconcile::BatchApi`] over the sync endpoint, so one value serves as
/// both collaborators of an apply run.
///
/// # Example
///
/// ```no_run
/// use reconcile::{build_snapshot, Deadline};
/// use todoist::{Client, HttpClient};
///
/// let client = Client::new(HttpClient::new("my-token"));
/// let snapshot = build_snapshot(&client, &Deadline::none()).unwrap();
/// println!("{} projects", snapshot.containers.len());
/// ```
#[derive(Debug)]
pub struct Client {
    http: HttpClient,
    max_commands: usize,
}

impl Client {
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            max_commands: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    /// Limit commands per sync submission. Zero keeps the current limit.
    #[must_use]
    pub fn with_max_commands(mut self, max_commands: usize) -> Self {
        if max_commands > 0 {
            self.max_commands = max_commands;
        }
        self
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }

    pub(crate) fn max_commands(&self) -> usize {
        self.max_commands
    }
}
