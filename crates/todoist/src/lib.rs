//! # Todoist
//!
//! Blocking clients for the Todoist v1 API, implementing the remote
//! contracts of the [`reconcile`] engine.
//!
//! ## Surfaces
//!
//! - REST (`/api/v1/projects`, `/labels`, `/tasks`): cursor-paged listing
//!   and per-entity create/update/delete
//! - Sync (`/api/v1/sync`): filter reads and batched commands with
//!   temporary ids
//!
//! ## Transport
//!
//! [`HttpClient`] adds the bearer token and user agent, bounds each attempt
//! by the run's deadline and retries 429/5xx responses with exponential
//! backoff, honoring `Retry-After`. The token never appears in logs.

pub mod client;
pub mod error;
pub mod http;
mod rest;
pub mod retry;
mod sync;

#[cfg(test)]
mod test_server;

// Re-export main types at crate root
pub use client::Client;
pub use error::{Error, Result};
pub use http::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, HttpClient};
pub use retry::{RetryConfig, with_retry};
