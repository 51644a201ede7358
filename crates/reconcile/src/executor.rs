//! Apply executor - issues plan operations in dependency-safe order
//!
//! Phases run strictly in sequence:
//!
//! 1. Containers: ordered creates, updates, then one batch of moves
//! 2. Tags: creates, updates
//! 3. Saved queries: one batch of creates/updates/deletes, then a bulk
//!    reorder when any create or order change happened
//! 4. Work items: creates, updates, moves
//! 5. Deletes: work items, tags, then containers deepest first
//!
//! The first failure aborts the run. Operations applied before it stay
//! applied; running reconciliation again converges.

use crate::context::ApplyContext;
use crate::deadline::Deadline;
use crate::desired::DesiredSpec;
use crate::error::{ApplyError, Error, Result};
use crate::order::{order_container_creates, order_container_deletes};
use crate::remote::{
    BatchCommand, BatchResponse, CreateContainer, CreateTag, CreateWorkItem, RemoteApi,
    RemoteResult, UpdateContainer, UpdateTag, UpdateWorkItem, new_token, run_batch,
};
use crate::snapshot::Snapshot;
use crate::types::{
    Action, ApplyResult, ContainerPayload, Kind, Operation, OperationResult, Payload, Plan,
    SavedQueryPayload, TagPayload, WorkItemPayload,
};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Display name of the synthesized saved query reorder
pub const REORDER_NAME: &str = "saved_queries";

/// Apply a plan against the remote service.
///
/// Returns every operation's outcome. On failure, the error carries the
/// outcomes recorded so far plus the failing operation's entry.
pub fn apply(
    desired: &DesiredSpec,
    snapshot: &Snapshot,
    plan: &Plan,
    ctx: &mut ApplyContext<'_>,
) -> std::result::Result<ApplyResult, ApplyError> {
    let mut executor = Executor::new(desired, snapshot, plan, ctx);
    match executor.run() {
        Ok(()) => Ok(executor.result),
        Err(source) => {
            log::warn!("apply aborted: {source}");
            Err(ApplyError {
                partial: Box::new(executor.result),
                source,
            })
        }
    }
}

/// Reject plans that cannot run before any remote call is made
fn validate_plan(plan: &Plan) -> Result<()> {
    for op in &plan.operations {
        let needs_payload = matches!(op.action, Action::Create | Action::Update | Action::Move);
        if needs_payload && op.payload.is_none() {
            return Err(Error::MissingPayload {
                kind: op.kind,
                action: op.action,
                name: op.name.clone(),
            });
        }
        if op.action != Action::Create && op.id.is_none() {
            return Err(Error::InvalidInput(format!(
                "{} {} operation for {:?} has no remote id",
                op.kind, op.action, op.name
            )));
        }
    }
    Ok(())
}

fn container_payload(op: &Operation) -> Result<&ContainerPayload> {
    match &op.payload {
        Some(Payload::Container(p)) => Ok(p),
        _ => Err(missing_payload(op)),
    }
}

fn tag_payload(op: &Operation) -> Result<&TagPayload> {
    match &op.payload {
        Some(Payload::Tag(p)) => Ok(p),
        _ => Err(missing_payload(op)),
    }
}

fn saved_query_payload(op: &Operation) -> Result<&SavedQueryPayload> {
    match &op.payload {
        Some(Payload::SavedQuery(p)) => Ok(p),
        _ => Err(missing_payload(op)),
    }
}

fn work_item_payload(op: &Operation) -> Result<&WorkItemPayload> {
    match &op.payload {
        Some(Payload::WorkItem(p)) => Ok(p),
        _ => Err(missing_payload(op)),
    }
}

fn missing_payload(op: &Operation) -> Error {
    Error::MissingPayload {
        kind: op.kind,
        action: op.action,
        name: op.name.clone(),
    }
}

fn op_id(op: &Operation) -> &str {
    op.id.as_deref().unwrap_or_default()
}

struct Executor<'r, 'c> {
    desired: &'r DesiredSpec,
    snapshot: &'r Snapshot,
    plan: &'r Plan,
    ctx: &'r mut ApplyContext<'c>,
    result: ApplyResult,
    /// Container name to id, extended as creates succeed
    container_ids: HashMap<String, String>,
    /// Saved query name to id, extended from batch temp id mappings
    saved_query_ids: HashMap<String, String>,
}

impl<'r, 'c> Executor<'r, 'c> {
    fn new(
        desired: &'r DesiredSpec,
        snapshot: &'r Snapshot,
        plan: &'r Plan,
        ctx: &'r mut ApplyContext<'c>,
    ) -> Self {
        // Names resolve uniquely or not at all; explicit ids win so that a
        // pending rename still maps the desired name.
        let mut container_ids = HashMap::new();
        for remote in &snapshot.containers {
            if let Ok(Some(unique)) = snapshot.container_by_name(&remote.name) {
                container_ids.insert(unique.name.clone(), unique.id.clone());
            }
        }
        for want in &desired.containers {
            if let Some(id) = &want.id {
                container_ids.insert(want.name.clone(), id.clone());
            }
        }

        let mut saved_query_ids = HashMap::new();
        for want in &desired.saved_queries {
            let id = match &want.id {
                Some(id) => Some(id.clone()),
                None => snapshot
                    .saved_query_by_name(&want.name)
                    .ok()
                    .flatten()
                    .map(|q| q.id.clone()),
            };
            if let Some(id) = id {
                saved_query_ids.insert(want.name.clone(), id);
            }
        }

        Self {
            desired,
            snapshot,
            plan,
            ctx,
            result: ApplyResult::from_plan(plan),
            container_ids,
            saved_query_ids,
        }
    }

    fn run(&mut self) -> Result<()> {
        validate_plan(self.plan)?;

        self.apply_containers()?;
        self.apply_tags()?;
        self.apply_saved_queries()?;
        self.apply_work_items()?;
        self.apply_deletes()?;

        log::info!(
            "applied {} operations ({} reorder)",
            self.result.succeeded(),
            self.result.summary.reorder
        );
        Ok(())
    }

    // =========================================================================
    // Recording
    // =========================================================================

    fn record(&mut self, outcome: OperationResult) {
        if outcome.is_ok() {
            log::info!("{} {} {:?}", outcome.action, outcome.kind, outcome.name);
        } else {
            log::warn!(
                "{} {} {:?} failed: {}",
                outcome.action,
                outcome.kind,
                outcome.name,
                outcome.status
            );
        }
        self.ctx.progress.on_operation_complete(&outcome);
        self.result.applied.push(outcome);
    }

    fn phase(&mut self, kind: Kind, action: Action, count: usize) {
        if count > 0 {
            log::debug!("{action} {kind}: {count} operations");
            self.ctx.progress.on_phase_start(kind, action, count);
        }
    }

    /// Run one single-entity operation and record its outcome
    fn run_op(
        &mut self,
        op: &Operation,
        f: impl FnOnce(&mut Self) -> Result<Option<String>>,
    ) -> Result<()> {
        match f(self) {
            Ok(id) => {
                self.record(OperationResult::ok(op.kind, op.action, &op.name, id));
                Ok(())
            }
            Err(err) => {
                self.record(OperationResult::failed(
                    op.kind,
                    op.action,
                    &op.name,
                    op.id.clone(),
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }

    /// Issue one remote call under the run deadline
    fn call<T>(
        &self,
        op: &Operation,
        f: impl FnOnce(&dyn RemoteApi, &Deadline) -> RemoteResult<T>,
    ) -> Result<T> {
        let deadline = self.ctx.deadline;
        deadline
            .check()
            .and_then(|()| f(self.ctx.remote, &deadline))
            .map_err(|source| Error::remote(op.kind, op.action, &op.name, source))
    }

    /// Submit a batch; on failure every operation in it is recorded failed
    fn submit(
        &mut self,
        context: &str,
        ops: &[&Operation],
        commands: &[BatchCommand],
    ) -> Result<BatchResponse> {
        match run_batch(self.ctx.batch, commands, &self.ctx.deadline) {
            Ok(response) => Ok(response),
            Err(source) => {
                let err = Error::batch(context, source);
                for op in ops {
                    self.record(OperationResult::failed(
                        op.kind,
                        op.action,
                        &op.name,
                        op.id.clone(),
                        err.to_string(),
                    ));
                }
                Err(err)
            }
        }
    }

    fn container_id(&self, op: &Operation, container: &str) -> Result<String> {
        self.container_ids
            .get(container)
            .cloned()
            .ok_or_else(|| Error::UnresolvedReference {
                kind: op.kind,
                name: op.name.clone(),
                reference: format!("container {container:?}"),
            })
    }

    // =========================================================================
    // Containers
    // =========================================================================

    fn apply_containers(&mut self) -> Result<()> {
        let plan = self.plan;

        let creates = order_container_creates(plan.operations_of(Kind::Container, Action::Create))?;
        self.phase(Kind::Container, Action::Create, creates.len());
        for op in &creates {
            self.run_op(op, |ex| {
                let payload = container_payload(op)?;
                let parent_id = match payload.parent.as_deref().filter(|p| !p.is_empty()) {
                    Some(parent) => Some(ex.container_id(op, parent)?),
                    None => None,
                };
                let request = CreateContainer {
                    name: payload.name.clone(),
                    parent_id,
                    color: payload.color.clone(),
                    is_favorite: payload.is_favorite,
                    view_style: payload.view_style.clone(),
                };
                let created = ex.call(op, |remote, deadline| remote.create_container(&request, deadline))?;
                ex.container_ids.insert(op.name.clone(), created.id.clone());
                Ok(Some(created.id))
            })?;
        }

        let updates = plan.operations_of(Kind::Container, Action::Update);
        self.phase(Kind::Container, Action::Update, updates.len());
        for op in &updates {
            self.run_op(op, |ex| {
                let payload = container_payload(op)?;
                let mut request = UpdateContainer::default();
                for change in &op.changes {
                    match change.field.as_str() {
                        "name" => request.name = Some(payload.name.clone()),
                        "color" => request.color.clone_from(&payload.color),
                        "is_favorite" => request.is_favorite = payload.is_favorite,
                        "view_style" => request.view_style.clone_from(&payload.view_style),
                        _ => {}
                    }
                }
                ex.call(op, |remote, deadline| {
                    remote.update_container(op_id(op), &request, deadline)
                })?;
                Ok(op.id.clone())
            })?;
        }

        let moves = plan.operations_of(Kind::Container, Action::Move);
        if moves.is_empty() {
            return Ok(());
        }
        self.phase(Kind::Container, Action::Move, moves.len());
        let mut commands = Vec::with_capacity(moves.len());
        for op in &moves {
            let resolved = container_payload(op).and_then(|payload| {
                match payload.parent.as_deref().filter(|p| !p.is_empty()) {
                    Some(parent) => self.container_id(op, parent).map(Value::String),
                    None => Ok(Value::Null),
                }
            });
            let parent = match resolved {
                Ok(parent) => parent,
                Err(err) => return self.run_op(op, |_| Err(err)),
            };
            let mut args = Map::new();
            args.insert("id".into(), json!(op_id(op)));
            args.insert("parent_id".into(), parent);
            commands.push(BatchCommand::new("project_move", args));
        }
        let refs: Vec<&Operation> = moves.iter().collect();
        self.submit("container moves", &refs, &commands)?;
        for op in &moves {
            self.record(OperationResult::ok(op.kind, op.action, &op.name, op.id.clone()));
        }
        Ok(())
    }

    // =========================================================================
    // Tags
    // =========================================================================

    fn apply_tags(&mut self) -> Result<()> {
        let plan = self.plan;

        let creates = plan.operations_of(Kind::Tag, Action::Create);
        self.phase(Kind::Tag, Action::Create, creates.len());
        for op in &creates {
            self.run_op(op, |ex| {
                let payload = tag_payload(op)?;
                let request = CreateTag {
                    name: payload.name.clone(),
                    color: payload.color.clone(),
                    is_favorite: payload.is_favorite,
                };
                let created = ex.call(op, |remote, deadline| remote.create_tag(&request, deadline))?;
                Ok(Some(created.id))
            })?;
        }

        let updates = plan.operations_of(Kind::Tag, Action::Update);
        self.phase(Kind::Tag, Action::Update, updates.len());
        for op in &updates {
            self.run_op(op, |ex| {
                let payload = tag_payload(op)?;
                let mut request = UpdateTag::default();
                for change in &op.changes {
                    match change.field.as_str() {
                        "name" => request.name = Some(payload.name.clone()),
                        "color" => request.color.clone_from(&payload.color),
                        "is_favorite" => request.is_favorite = payload.is_favorite,
                        _ => {}
                    }
                }
                ex.call(op, |remote, deadline| remote.update_tag(op_id(op), &request, deadline))?;
                Ok(op.id.clone())
            })?;
        }
        Ok(())
    }

    // =========================================================================
    // Saved queries
    // =========================================================================

    fn apply_saved_queries(&mut self) -> Result<()> {
        let plan = self.plan;
        let creates = plan.operations_of(Kind::SavedQuery, Action::Create);
        let updates = plan.operations_of(Kind::SavedQuery, Action::Update);
        let deletes = plan.operations_of(Kind::SavedQuery, Action::Delete);

        let mut commands = Vec::new();
        let mut temp_names: HashMap<String, String> = HashMap::new();

        for op in &creates {
            let payload = match saved_query_payload(op) {
                Ok(p) => p,
                Err(err) => return self.run_op(op, |_| Err(err)),
            };
            let mut args = Map::new();
            args.insert("name".into(), json!(payload.name));
            args.insert("query".into(), json!(payload.query));
            if let Some(color) = &payload.color {
                args.insert("color".into(), json!(color));
            }
            if let Some(fav) = payload.is_favorite {
                args.insert("is_favorite".into(), json!(fav));
            }
            args.insert("item_order".into(), json!(payload.order));

            let temp_id = new_token();
            temp_names.insert(temp_id.clone(), op.name.clone());
            commands.push(BatchCommand::with_temp_id("filter_add", temp_id, args));
        }

        for op in &updates {
            let payload = match saved_query_payload(op) {
                Ok(p) => p,
                Err(err) => return self.run_op(op, |_| Err(err)),
            };
            let mut args = Map::new();
            args.insert("id".into(), json!(op_id(op)));
            for change in &op.changes {
                match change.field.as_str() {
                    "name" => {
                        args.insert("name".into(), json!(payload.name));
                    }
                    "query" => {
                        args.insert("query".into(), json!(payload.query));
                    }
                    "color" => {
                        if let Some(color) = &payload.color {
                            args.insert("color".into(), json!(color));
                        }
                    }
                    "is_favorite" => {
                        if let Some(fav) = payload.is_favorite {
                            args.insert("is_favorite".into(), json!(fav));
                        }
                    }
                    "order" => {
                        args.insert("item_order".into(), json!(payload.order));
                    }
                    _ => {}
                }
            }
            commands.push(BatchCommand::new("filter_update", args));
        }

        for op in &deletes {
            let mut args = Map::new();
            args.insert("id".into(), json!(op_id(op)));
            commands.push(BatchCommand::new("filter_delete", args));
        }

        if !commands.is_empty() {
            self.phase(Kind::SavedQuery, Action::Create, creates.len());
            self.phase(Kind::SavedQuery, Action::Update, updates.len());
            self.phase(Kind::SavedQuery, Action::Delete, deletes.len());

            let batch_ops: Vec<&Operation> =
                creates.iter().chain(&updates).chain(&deletes).collect();
            let response = self.submit("saved queries", &batch_ops, &commands)?;

            for (temp_id, real_id) in response.temp_id_mapping {
                if let Some(name) = temp_names.remove(&temp_id) {
                    self.saved_query_ids.insert(name, real_id);
                }
            }

            for op in &creates {
                let id = self.saved_query_ids.get(&op.name).cloned();
                self.record(OperationResult::ok(op.kind, op.action, &op.name, id));
            }
            for op in updates.iter().chain(&deletes) {
                self.record(OperationResult::ok(op.kind, op.action, &op.name, op.id.clone()));
            }
        }

        let reorder = !creates.is_empty() || updates.iter().any(|op| op.changes_field("order"));
        if reorder && !self.desired.saved_queries.is_empty() {
            self.reorder_saved_queries()?;
        }
        Ok(())
    }

    /// Set the full saved query order from the desired list
    fn reorder_saved_queries(&mut self) -> Result<()> {
        let desired = self.desired;
        let op = Operation::new(Kind::SavedQuery, Action::Reorder, REORDER_NAME);
        self.phase(Kind::SavedQuery, Action::Reorder, 1);

        let mut mapping = Map::new();
        for (index, want) in desired.saved_queries.iter().enumerate() {
            let id = want
                .id
                .clone()
                .or_else(|| self.saved_query_ids.get(&want.name).cloned());
            let Some(id) = id else {
                let err = Error::UnresolvedReference {
                    kind: Kind::SavedQuery,
                    name: want.name.clone(),
                    reference: "saved query".to_string(),
                };
                return self.run_op(&op, |_| Err(err));
            };
            mapping.insert(id, json!(desired.effective_order(index)));
        }

        let mut args = Map::new();
        args.insert("id_order_mapping".into(), Value::Object(mapping));
        let commands = [BatchCommand::new("filter_update_orders", args)];
        self.submit("saved query order", &[&op], &commands)?;

        self.result.summary.record(Action::Reorder);
        self.record(OperationResult::ok(op.kind, op.action, &op.name, None));
        Ok(())
    }

    // =========================================================================
    // Work items
    // =========================================================================

    fn apply_work_items(&mut self) -> Result<()> {
        let plan = self.plan;

        let creates = plan.operations_of(Kind::WorkItem, Action::Create);
        self.phase(Kind::WorkItem, Action::Create, creates.len());
        for op in &creates {
            self.run_op(op, |ex| {
                let payload = work_item_payload(op)?;
                let container_id = match payload.container.as_deref() {
                    Some(container) => Some(ex.container_id(op, container)?),
                    None => None,
                };
                let request = CreateWorkItem {
                    content: payload.content.clone(),
                    description: payload.description.clone(),
                    container_id,
                    labels: payload.labels.clone().unwrap_or_default(),
                    priority: payload.priority,
                    due: payload.due.clone(),
                };
                let created = ex.call(op, |remote, deadline| remote.create_work_item(&request, deadline))?;
                Ok(Some(created.id))
            })?;
        }

        let updates = plan.operations_of(Kind::WorkItem, Action::Update);
        self.phase(Kind::WorkItem, Action::Update, updates.len());
        for op in &updates {
            self.run_op(op, |ex| {
                let payload = work_item_payload(op)?;
                let mut request = UpdateWorkItem::default();
                for change in &op.changes {
                    match change.field.as_str() {
                        "content" => request.content = Some(payload.content.clone()),
                        "description" | "managed_key" => {
                            request.description.clone_from(&payload.description);
                        }
                        "labels" => request.labels.clone_from(&payload.labels),
                        "priority" => request.priority = payload.priority,
                        "due" => request.due.clone_from(&payload.due),
                        _ => {}
                    }
                }
                ex.call(op, |remote, deadline| {
                    remote.update_work_item(op_id(op), &request, deadline)
                })?;
                Ok(op.id.clone())
            })?;
        }

        let moves = plan.operations_of(Kind::WorkItem, Action::Move);
        self.phase(Kind::WorkItem, Action::Move, moves.len());
        for op in &moves {
            self.run_op(op, |ex| {
                let payload = work_item_payload(op)?;
                let container = payload.container.as_deref().unwrap_or_default();
                let container_id = ex.container_id(op, container)?;
                ex.call(op, |remote, deadline| {
                    remote.move_work_item(op_id(op), &container_id, deadline)
                })?;
                Ok(op.id.clone())
            })?;
        }
        Ok(())
    }

    // =========================================================================
    // Deletes
    // =========================================================================

    fn apply_deletes(&mut self) -> Result<()> {
        let plan = self.plan;

        let work_items = plan.operations_of(Kind::WorkItem, Action::Delete);
        self.phase(Kind::WorkItem, Action::Delete, work_items.len());
        for op in &work_items {
            self.run_op(op, |ex| {
                ex.call(op, |remote, deadline| remote.delete_work_item(op_id(op), deadline))?;
                Ok(op.id.clone())
            })?;
        }

        let tags = plan.operations_of(Kind::Tag, Action::Delete);
        self.phase(Kind::Tag, Action::Delete, tags.len());
        for op in &tags {
            self.run_op(op, |ex| {
                ex.call(op, |remote, deadline| remote.delete_tag(op_id(op), deadline))?;
                Ok(op.id.clone())
            })?;
        }

        let containers = order_container_deletes(
            plan.operations_of(Kind::Container, Action::Delete),
            self.snapshot,
        );
        self.phase(Kind::Container, Action::Delete, containers.len());
        for op in &containers {
            self.run_op(op, |ex| {
                ex.call(op, |remote, deadline| remote.delete_container(op_id(op), deadline))?;
                Ok(op.id.clone())
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{NoProgress, ProgressCallback};
    use crate::desired::{
        DesiredContainer, DesiredSavedQuery, DesiredTag, DesiredWorkItem, PruneSpec,
    };
    use crate::error::ErrorCategory;
    use crate::mock::MockRemote;
    use crate::planner::{PruneOptions, build_plan};
    use crate::remote::{RemoteContainer, RemoteSavedQuery, RemoteTag, RemoteWorkItem};
    use crate::snapshot::build_snapshot;

    /// Snapshot, plan and apply once against the mock
    fn reconcile(
        mock: &MockRemote,
        desired: &DesiredSpec,
        prune: PruneOptions,
    ) -> std::result::Result<ApplyResult, ApplyError> {
        let snapshot = build_snapshot(mock, &Deadline::none()).unwrap();
        let plan = build_plan(desired, &snapshot, prune).unwrap();
        let mut progress = NoProgress;
        let mut ctx = ApplyContext::new(mock, mock, &mut progress);
        apply(desired, &snapshot, &plan, &mut ctx)
    }

    fn replan(mock: &MockRemote, desired: &DesiredSpec, prune: PruneOptions) -> Plan {
        let snapshot = build_snapshot(mock, &Deadline::none()).unwrap();
        build_plan(desired, &snapshot, prune).unwrap()
    }

    fn container(name: &str, parent: Option<&str>) -> DesiredContainer {
        DesiredContainer {
            name: name.into(),
            parent: parent.map(Into::into),
            ..Default::default()
        }
    }

    fn saved_query(name: &str, query: &str) -> DesiredSavedQuery {
        DesiredSavedQuery {
            name: name.into(),
            query: query.into(),
            ..Default::default()
        }
    }

    fn full_spec() -> DesiredSpec {
        DesiredSpec {
            containers: vec![
                DesiredContainer {
                    color: Some("red".into()),
                    ..container("Work", None)
                },
                container("Deep", Some("Child")),
                container("Child", Some("Work")),
            ],
            tags: vec![DesiredTag {
                name: "waiting".into(),
                color: Some("grey".into()),
                ..Default::default()
            }],
            saved_queries: vec![saved_query("Today", "today"), saved_query("Focus", "p1 & today")],
            work_items: vec![DesiredWorkItem {
                key: Some("weekly".into()),
                content: "Weekly review".into(),
                description: Some("Go through every list".into()),
                container: Some("Child".into()),
                labels: Some(vec!["waiting".into()]),
                priority: Some(3),
                due: Some("every friday".into()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_from_empty_then_idempotent() {
        let mock = MockRemote::new();
        let desired = full_spec();

        let result = reconcile(&mock, &desired, PruneOptions::default()).unwrap();
        assert_eq!(result.summary.create, 7);
        assert_eq!(result.summary.reorder, 1);
        assert!(result.find(Kind::SavedQuery, Action::Reorder, REORDER_NAME).is_some());
        assert!(result.applied.iter().all(OperationResult::is_ok));

        let containers = mock.containers();
        let id_of = |name: &str| {
            containers
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.id.clone())
                .unwrap()
        };
        let child = containers.iter().find(|c| c.name == "Child").unwrap();
        assert_eq!(child.parent_id.as_deref(), Some(id_of("Work").as_str()));

        let items = mock.work_items();
        assert_eq!(items[0].container_id, id_of("Child"));
        assert_eq!(
            items[0].description,
            "Go through every list\nTIDYIST_KEY: weekly"
        );

        let plan = replan(&mock, &desired, PruneOptions::default());
        assert!(plan.is_empty(), "second plan not empty: {:?}", plan.operations);
    }

    #[test]
    fn test_creates_children_after_parents() {
        let mock = MockRemote::new();
        let result = reconcile(&mock, &full_spec(), PruneOptions::default()).unwrap();
        let order: Vec<&str> = result
            .applied
            .iter()
            .filter(|r| r.kind == Kind::Container)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(order, vec!["Work", "Child", "Deep"]);
    }

    #[test]
    fn test_update_and_move_scenario_applies() {
        let mock = MockRemote::new();
        mock.add_container(RemoteContainer {
            id: "P1".into(),
            name: "Work".into(),
            color: "blue".into(),
            ..Default::default()
        });
        mock.add_container(RemoteContainer {
            id: "P2".into(),
            name: "Child".into(),
            color: "green".into(),
            ..Default::default()
        });
        let desired = DesiredSpec {
            containers: vec![
                DesiredContainer {
                    color: Some("red".into()),
                    ..container("Work", None)
                },
                container("Child", Some("Work")),
            ],
            ..Default::default()
        };

        let result = reconcile(&mock, &desired, PruneOptions::default()).unwrap();
        assert_eq!(result.applied.len(), 2);
        assert_eq!(result.summary.reorder, 0);

        let submissions = mock.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0][0].command_type, "project_move");
        assert_eq!(submissions[0][0].args["parent_id"], "P1");

        assert!(replan(&mock, &desired, PruneOptions::default()).is_empty());
    }

    #[test]
    fn test_move_to_root_sends_null_parent() {
        let mock = MockRemote::new();
        mock.add_container(RemoteContainer {
            id: "P1".into(),
            name: "Work".into(),
            ..Default::default()
        });
        mock.add_container(RemoteContainer {
            id: "P2".into(),
            name: "Child".into(),
            parent_id: Some("P1".into()),
            ..Default::default()
        });
        let desired = DesiredSpec {
            containers: vec![container("Work", None), container("Child", None)],
            ..Default::default()
        };
        reconcile(&mock, &desired, PruneOptions::default()).unwrap();
        assert!(mock.submissions()[0][0].args["parent_id"].is_null());
        assert!(mock.containers().iter().all(|c| c.parent_id.is_none()));
    }

    #[test]
    fn test_reorder_uses_created_ids() {
        let mock = MockRemote::new();
        mock.add_saved_query(RemoteSavedQuery {
            id: "F1".into(),
            name: "Today".into(),
            query: "today".into(),
            item_order: 1,
            ..Default::default()
        });
        let desired = DesiredSpec {
            saved_queries: vec![saved_query("Focus", "p1"), saved_query("Today", "today")],
            ..Default::default()
        };

        let result = reconcile(&mock, &desired, PruneOptions::default()).unwrap();
        assert_eq!(result.summary.reorder, 1);

        let submissions = mock.submissions();
        assert_eq!(submissions.len(), 2);
        let reorder = &submissions[1][0];
        assert_eq!(reorder.command_type, "filter_update_orders");
        let focus_id = result
            .find(Kind::SavedQuery, Action::Create, "Focus")
            .and_then(|r| r.id.clone())
            .unwrap();
        assert_eq!(reorder.args["id_order_mapping"][focus_id.as_str()], 1);
        assert_eq!(reorder.args["id_order_mapping"]["F1"], 2);

        assert!(replan(&mock, &desired, PruneOptions::default()).is_empty());
    }

    #[test]
    fn test_no_reorder_without_create_or_order_change() {
        let mock = MockRemote::new();
        mock.add_saved_query(RemoteSavedQuery {
            id: "F1".into(),
            name: "Today".into(),
            query: "today".into(),
            item_order: 1,
            ..Default::default()
        });
        let desired = DesiredSpec {
            saved_queries: vec![saved_query("Today", "today | overdue")],
            ..Default::default()
        };
        let result = reconcile(&mock, &desired, PruneOptions::default()).unwrap();
        assert_eq!(result.summary.reorder, 0);
        assert_eq!(mock.submissions().len(), 1);
        let update = &mock.submissions()[0][0];
        assert_eq!(update.command_type, "filter_update");
        assert!(update.args.get("item_order").is_none());
    }

    #[test]
    fn test_saved_query_batch_split() {
        let mock = MockRemote::new().with_batch_limit(2);
        let desired = DesiredSpec {
            saved_queries: (0..5)
                .map(|i| saved_query(&format!("q{i}"), "today"))
                .collect(),
            ..Default::default()
        };
        let result = reconcile(&mock, &desired, PruneOptions::default()).unwrap();
        let sizes: Vec<usize> = mock.submissions().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1, 1]);
        assert_eq!(result.summary.create, 5);
        assert!(replan(&mock, &desired, PruneOptions::default()).is_empty());
    }

    #[test]
    fn test_failure_aborts_and_rerun_converges() {
        let mock = MockRemote::new();
        mock.fail_on("create_tag");
        let desired = full_spec();

        let err = reconcile(&mock, &desired, PruneOptions::default()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Remote);
        assert!(err.source.to_string().contains("create tag \"waiting\""));
        assert_eq!(err.partial.succeeded(), 3);
        let failed = err.partial.applied.last().unwrap();
        assert_eq!((failed.kind, failed.action), (Kind::Tag, Action::Create));
        assert!(failed.status.contains("injected failure"));

        // Nothing rolled back, nothing after the failure attempted.
        assert_eq!(mock.containers().len(), 3);
        assert_eq!(mock.call_count("submit"), 0);

        mock.clear_failures();
        let second = reconcile(&mock, &desired, PruneOptions::default()).unwrap();
        assert_eq!(second.summary.create, 4);
        assert_eq!(mock.containers().len(), 3);
        assert!(replan(&mock, &desired, PruneOptions::default()).is_empty());
    }

    #[test]
    fn test_batch_status_failure_is_fatal() {
        let mock = MockRemote::new();
        mock.reject_command("filter_add");
        let desired = DesiredSpec {
            saved_queries: vec![saved_query("Focus", "p1")],
            work_items: vec![DesiredWorkItem {
                key: Some("k".into()),
                content: "never created".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let err = reconcile(&mock, &desired, PruneOptions::default()).unwrap_err();
        assert!(matches!(err.source, Error::Batch { .. }));
        let failed = err
            .partial
            .find(Kind::SavedQuery, Action::Create, "Focus")
            .unwrap();
        assert!(failed.status.contains("rejected"));
        assert!(err.partial.find(Kind::SavedQuery, Action::Reorder, REORDER_NAME).is_none());
        assert!(mock.work_items().is_empty());
    }

    #[test]
    fn test_prune_deletes_leaves_first() {
        let mock = MockRemote::new();
        mock.add_container(RemoteContainer {
            id: "P0".into(),
            name: "Inbox".into(),
            is_inbox: true,
            ..Default::default()
        });
        mock.add_container(RemoteContainer {
            id: "P1".into(),
            name: "Old".into(),
            ..Default::default()
        });
        mock.add_container(RemoteContainer {
            id: "P2".into(),
            name: "Old child".into(),
            parent_id: Some("P1".into()),
            ..Default::default()
        });
        mock.add_container(RemoteContainer {
            id: "P3".into(),
            name: "Old grandchild".into(),
            parent_id: Some("P2".into()),
            ..Default::default()
        });
        mock.add_tag(RemoteTag {
            id: "L1".into(),
            name: "stale".into(),
            ..Default::default()
        });
        mock.add_work_item(RemoteWorkItem {
            id: "T1".into(),
            content: "Retired".into(),
            description: "TIDYIST_KEY: retired".into(),
            container_id: "P3".into(),
            ..Default::default()
        });
        let desired = DesiredSpec {
            prune: PruneSpec {
                containers: true,
                tags: true,
                saved_queries: true,
                work_items: true,
            },
            ..Default::default()
        };

        let result = reconcile(&mock, &desired, PruneOptions::enabled()).unwrap();
        let deletes: Vec<&str> = result.applied.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            deletes,
            vec!["retired", "stale", "Old grandchild", "Old child", "Old"]
        );
        let remaining: Vec<String> = mock.containers().into_iter().map(|c| c.name).collect();
        assert_eq!(remaining, vec!["Inbox".to_string()]);
    }

    #[test]
    fn test_saved_query_delete_goes_through_batch() {
        let mock = MockRemote::new();
        mock.add_saved_query(RemoteSavedQuery {
            id: "F9".into(),
            name: "Legacy".into(),
            query: "today".into(),
            item_order: 1,
            ..Default::default()
        });
        let desired = DesiredSpec {
            prune: PruneSpec {
                saved_queries: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = reconcile(&mock, &desired, PruneOptions::enabled()).unwrap();
        assert_eq!(result.summary.delete, 1);
        assert_eq!(mock.submissions()[0][0].command_type, "filter_delete");
        assert!(mock.saved_queries()[0].is_deleted);
        assert!(replan(&mock, &desired, PruneOptions::enabled()).is_empty());
    }

    #[test]
    fn test_work_item_update_and_move() {
        let mock = MockRemote::new();
        mock.add_container(RemoteContainer {
            id: "P1".into(),
            name: "Home".into(),
            ..Default::default()
        });
        mock.add_container(RemoteContainer {
            id: "P2".into(),
            name: "Work".into(),
            ..Default::default()
        });
        mock.add_work_item(RemoteWorkItem {
            id: "T1".into(),
            content: "Weekly review".into(),
            description: "old\nTIDYIST_KEY: weekly".into(),
            container_id: "P1".into(),
            priority: 1,
            ..Default::default()
        });
        let desired = DesiredSpec {
            containers: vec![container("Home", None), container("Work", None)],
            work_items: vec![DesiredWorkItem {
                key: Some("weekly".into()),
                content: "Weekly review".into(),
                description: Some("new".into()),
                container: Some("Work".into()),
                priority: Some(2),
                ..Default::default()
            }],
            ..Default::default()
        };

        reconcile(&mock, &desired, PruneOptions::default()).unwrap();
        let item = &mock.work_items()[0];
        assert_eq!(item.container_id, "P2");
        assert_eq!(item.priority, 2);
        assert_eq!(item.description, "new\nTIDYIST_KEY: weekly");
        assert!(replan(&mock, &desired, PruneOptions::default()).is_empty());
    }

    #[test]
    fn test_expired_deadline_issues_no_calls() {
        let mock = MockRemote::new();
        let desired = full_spec();
        let snapshot = build_snapshot(&mock, &Deadline::none()).unwrap();
        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();
        let before = mock.calls().len();

        let mut progress = NoProgress;
        let mut ctx = ApplyContext::new(&mock, &mock, &mut progress)
            .with_deadline(Deadline::at(std::time::Instant::now()));
        let err = apply(&desired, &snapshot, &plan, &mut ctx).unwrap_err();
        assert_eq!(err.partial.applied.len(), 1);
        assert!(err.partial.applied[0].status.contains("deadline exceeded"));
        assert_eq!(mock.calls().len(), before);
    }

    #[test]
    fn test_missing_payload_rejected_before_calls() {
        let mock = MockRemote::new();
        let mut plan = Plan::default();
        plan.push(Operation::new(Kind::Tag, Action::Create, "bare"));
        let mut progress = NoProgress;
        let mut ctx = ApplyContext::new(&mock, &mock, &mut progress);
        let err = apply(&DesiredSpec::default(), &Snapshot::empty(), &plan, &mut ctx).unwrap_err();
        assert!(matches!(err.source, Error::MissingPayload { .. }));
        assert!(mock.calls().is_empty());
    }

    #[derive(Default)]
    struct Recorder {
        phases: Vec<(Kind, Action, usize)>,
        completed: usize,
    }

    impl ProgressCallback for Recorder {
        fn on_phase_start(&mut self, kind: Kind, action: Action, count: usize) {
            self.phases.push((kind, action, count));
        }

        fn on_operation_complete(&mut self, _result: &OperationResult) {
            self.completed += 1;
        }
    }

    #[test]
    fn test_progress_reports_phases_in_order() {
        let mock = MockRemote::new();
        let desired = full_spec();
        let snapshot = build_snapshot(&mock, &Deadline::none()).unwrap();
        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();

        let mut recorder = Recorder::default();
        let mut ctx = ApplyContext::new(&mock, &mock, &mut recorder);
        let result = apply(&desired, &snapshot, &plan, &mut ctx).unwrap();

        assert_eq!(
            recorder.phases,
            vec![
                (Kind::Container, Action::Create, 3),
                (Kind::Tag, Action::Create, 1),
                (Kind::SavedQuery, Action::Create, 2),
                (Kind::SavedQuery, Action::Reorder, 1),
                (Kind::WorkItem, Action::Create, 1),
            ]
        );
        assert_eq!(recorder.completed, result.applied.len());
    }
}
