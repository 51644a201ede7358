//! Subcommand implementations.
//!
//! Each command loads what it needs, talks to Todoist through a
//! [`Session`] and renders for humans or, with `--json`, for machines.

pub mod apply;
pub mod export;
pub mod plan;
pub mod validate;

use anyhow::{Context as AnyhowContext, Result};
use reconcile::{Deadline, DesiredSpec, Plan, PruneOptions, Snapshot, build_plan, build_snapshot};
use std::time::Duration;
use todoist::{Client, HttpClient};

use crate::Context;
use crate::config;
use crate::token;

/// Authenticated connection to the Todoist API
pub struct Session {
    pub client: Client,
    timeout: Duration,
    /// Bounds the snapshot and, unless restarted, the apply after it
    deadline: Deadline,
}

impl Session {
    pub fn connect(ctx: &Context) -> Result<Self> {
        let (token, source) = token::discover()?;
        log::info!("Using API token from {source}");
        let http = HttpClient::new(token).with_base_url(&ctx.base_url);
        Ok(Self {
            client: Client::new(http),
            timeout: ctx.timeout,
            deadline: Deadline::after(ctx.timeout),
        })
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Start the time limit over, after waiting on the user
    pub fn restart_deadline(&mut self) {
        self.deadline = Deadline::after(self.timeout);
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let snapshot = build_snapshot(&self.client, &self.deadline())
            .context("Could not read current Todoist state")?;
        log::info!(
            "Fetched {} projects, {} labels, {} filters, {} tasks",
            snapshot.containers.len(),
            snapshot.tags.len(),
            snapshot.saved_queries.len(),
            snapshot.work_items.len()
        );
        Ok(snapshot)
    }
}

/// Everything a plan run produces, kept together for apply
pub struct Planned {
    pub desired: DesiredSpec,
    pub snapshot: Snapshot,
    pub plan: Plan,
}

/// Load the desired state, capture the remote side and diff them
pub fn plan_against_remote(ctx: &Context, session: &Session, prune: bool) -> Result<Planned> {
    let desired = config::load(&ctx.file)?.to_desired();
    let snapshot = session.snapshot()?;
    let plan = build_plan(&desired, &snapshot, PruneOptions { enabled: prune })?;
    log::debug!("Planned {} operations", plan.operations.len());
    Ok(Planned {
        desired,
        snapshot,
        plan,
    })
}
