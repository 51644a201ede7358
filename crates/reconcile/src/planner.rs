//! Plan builder: diff desired state against a snapshot.
//!
//! Each desired entity is resolved to its remote counterpart (explicit id
//! first, else name or managed key), then compared field by field. Fields
//! left unset in the desired entity are never compared. Remote entities
//! nobody claims become deletes only when pruning is allowed for their
//! kind; otherwise they are counted in a note.

use crate::desired::{DesiredSpec, DesiredWorkItem};
use crate::error::{Error, Result};
use crate::managed_key;
use crate::order::find_parent_cycle;
use crate::remote::RemoteWorkItem;
use crate::snapshot::Snapshot;
use crate::types::{
    Action, Change, ContainerPayload, Kind, Operation, Payload, Plan, SavedQueryPayload,
    TagPayload, WorkItemPayload,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Run-level pruning switch.
///
/// Deletes for a kind need both this and the kind's flag in the desired
/// spec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneOptions {
    pub enabled: bool,
}

impl PruneOptions {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    /// Decide whether deletes for a kind may be planned, noting why not
    fn gate(self, plan: &mut Plan, kind: Kind, kind_flag: bool) -> bool {
        if self.enabled && !kind_flag {
            plan.note(format!(
                "prune enabled but prune.{} is false; {} deletions are disabled",
                kind.prune_flag(),
                kind
            ));
        }
        self.enabled && kind_flag
    }
}

/// Remote ids, names and keys claimed by desired entities
#[derive(Default)]
struct Claimed {
    ids: HashSet<String>,
    names: HashSet<String>,
}

impl Claimed {
    fn claim(&mut self, id: Option<&str>, name: &str) {
        if let Some(id) = id {
            self.ids.insert(id.to_string());
        }
        self.names.insert(name.to_string());
    }

    fn contains(&self, id: &str, name: &str) -> bool {
        self.ids.contains(id) || self.names.contains(name)
    }
}

fn diff_str(changes: &mut Vec<Change>, field: &str, desired: Option<&str>, remote: &str) {
    if let Some(want) = desired {
        if want != remote {
            changes.push(Change::new(field, remote, want));
        }
    }
}

fn diff_bool(changes: &mut Vec<Change>, field: &str, desired: Option<bool>, remote: bool) {
    if let Some(want) = desired {
        if want != remote {
            changes.push(Change::new(field, remote.to_string(), want.to_string()));
        }
    }
}

fn note_unmanaged(plan: &mut Plan, kind: Kind, count: usize) {
    if count > 0 {
        plan.note(format!(
            "{count} remote {} are not in the desired spec (prune disabled)",
            kind.plural()
        ));
    }
}

/// Build the change plan for one run.
///
/// Fails on unknown explicit ids, ambiguous names, and desired specs that
/// break the loader's guarantees (unknown or cyclic parents, work items
/// without an identity anchor). Operations come back sorted by kind, name
/// and action for display.
pub fn build_plan(desired: &DesiredSpec, snapshot: &Snapshot, options: PruneOptions) -> Result<Plan> {
    check_desired(desired)?;

    let mut plan = Plan::default();
    plan_containers(desired, snapshot, options, &mut plan)?;
    plan_tags(desired, snapshot, options, &mut plan)?;
    plan_saved_queries(desired, snapshot, options, &mut plan)?;
    plan_work_items(desired, snapshot, options, &mut plan)?;

    plan.operations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let s = &plan.summary;
    log::info!(
        "plan: {} operations (create {}, update {}, move {}, delete {})",
        plan.operations.len(),
        s.create,
        s.update,
        s.moves,
        s.delete
    );
    for note in &plan.notes {
        log::debug!("plan note: {note}");
    }
    Ok(plan)
}

/// Re-check the structural guarantees the desired spec is supposed to carry
fn check_desired(desired: &DesiredSpec) -> Result<()> {
    let names: HashSet<&str> = desired.containers.iter().map(|c| c.name.as_str()).collect();
    let mut parents = BTreeMap::new();
    for container in &desired.containers {
        if let Some(parent) = container.parent.as_deref().filter(|p| !p.is_empty()) {
            if !names.contains(parent) {
                return Err(Error::InvalidInput(format!(
                    "container {:?} has unknown parent {parent:?}",
                    container.name
                )));
            }
            parents.insert(container.name.clone(), parent.to_string());
        }
    }
    if let Some(cycle) = find_parent_cycle(&parents) {
        return Err(Error::InvalidInput(format!(
            "container parent cycle: {}",
            cycle.join(" -> ")
        )));
    }

    if let Some(item) = desired
        .work_items
        .iter()
        .find(|item| item.id.is_none() && item.key.is_none())
    {
        return Err(Error::InvalidInput(format!(
            "work item {:?} has neither an id nor a managed key",
            item.content
        )));
    }
    Ok(())
}

// =============================================================================
// Containers
// =============================================================================

fn plan_containers(
    desired: &DesiredSpec,
    snapshot: &Snapshot,
    options: PruneOptions,
    plan: &mut Plan,
) -> Result<()> {
    let mut claimed = Claimed::default();

    for want in &desired.containers {
        claimed.claim(want.id.as_deref(), &want.name);

        let remote = match want.id.as_deref() {
            Some(id) => Some(snapshot.container_by_id(id).ok_or_else(|| Error::UnknownId {
                kind: Kind::Container,
                name: want.name.clone(),
                id: id.to_string(),
            })?),
            None => snapshot.container_by_name(&want.name)?,
        };

        let Some(remote) = remote else {
            plan.push(
                Operation::new(Kind::Container, Action::Create, &want.name).with_payload(
                    Payload::Container(ContainerPayload {
                        name: want.name.clone(),
                        parent: want.parent.clone(),
                        color: want.color.clone(),
                        is_favorite: want.is_favorite,
                        view_style: want.view_style.clone(),
                    }),
                ),
            );
            continue;
        };

        let mut changes = Vec::new();
        if want.id.is_some() && remote.name != want.name {
            changes.push(Change::new("name", &remote.name, &want.name));
        }
        diff_str(&mut changes, "color", want.color.as_deref(), &remote.color);
        diff_bool(&mut changes, "is_favorite", want.is_favorite, remote.is_favorite);
        diff_str(
            &mut changes,
            "view_style",
            want.view_style.as_deref(),
            &remote.view_style,
        );
        if !changes.is_empty() {
            plan.push(
                Operation::new(Kind::Container, Action::Update, &want.name)
                    .with_id(&remote.id)
                    .with_changes(changes)
                    .with_payload(Payload::Container(ContainerPayload {
                        name: want.name.clone(),
                        parent: None,
                        color: want.color.clone(),
                        is_favorite: want.is_favorite,
                        view_style: want.view_style.clone(),
                    })),
            );
        }

        // Parent changes go through a separate relationship surface.
        let want_parent = want.parent.as_deref().unwrap_or_default();
        let have_parent = snapshot.parent_name(remote);
        if want_parent != have_parent {
            plan.push(
                Operation::new(Kind::Container, Action::Move, &want.name)
                    .with_id(&remote.id)
                    .with_changes(vec![Change::new("parent", have_parent, want_parent)])
                    .with_payload(Payload::Container(ContainerPayload {
                        name: want.name.clone(),
                        parent: want.parent.clone(),
                        ..Default::default()
                    })),
            );
        }
    }

    let prune = options.gate(plan, Kind::Container, desired.prune.containers);
    let unmanaged: Vec<_> = snapshot
        .containers
        .iter()
        .filter(|c| !claimed.contains(&c.id, &c.name))
        .collect();
    if !prune {
        note_unmanaged(plan, Kind::Container, unmanaged.len());
        return Ok(());
    }
    for remote in unmanaged {
        if remote.is_inbox {
            plan.note(format!(
                "refusing to delete protected container {:?}",
                remote.name
            ));
            continue;
        }
        plan.push(Operation::new(Kind::Container, Action::Delete, &remote.name).with_id(&remote.id));
    }
    Ok(())
}

// =============================================================================
// Tags
// =============================================================================

fn plan_tags(
    desired: &DesiredSpec,
    snapshot: &Snapshot,
    options: PruneOptions,
    plan: &mut Plan,
) -> Result<()> {
    let mut claimed = Claimed::default();

    for want in &desired.tags {
        claimed.claim(want.id.as_deref(), &want.name);

        let remote = match want.id.as_deref() {
            Some(id) => Some(snapshot.tag_by_id(id).ok_or_else(|| Error::UnknownId {
                kind: Kind::Tag,
                name: want.name.clone(),
                id: id.to_string(),
            })?),
            None => snapshot.tag_by_name(&want.name)?,
        };

        let payload = Payload::Tag(TagPayload {
            name: want.name.clone(),
            color: want.color.clone(),
            is_favorite: want.is_favorite,
        });

        let Some(remote) = remote else {
            plan.push(Operation::new(Kind::Tag, Action::Create, &want.name).with_payload(payload));
            continue;
        };

        let mut changes = Vec::new();
        if want.id.is_some() && remote.name != want.name {
            changes.push(Change::new("name", &remote.name, &want.name));
        }
        diff_str(&mut changes, "color", want.color.as_deref(), &remote.color);
        diff_bool(&mut changes, "is_favorite", want.is_favorite, remote.is_favorite);
        if !changes.is_empty() {
            plan.push(
                Operation::new(Kind::Tag, Action::Update, &want.name)
                    .with_id(&remote.id)
                    .with_changes(changes)
                    .with_payload(payload),
            );
        }
    }

    let prune = options.gate(plan, Kind::Tag, desired.prune.tags);
    let unmanaged: Vec<_> = snapshot
        .tags
        .iter()
        .filter(|t| !claimed.contains(&t.id, &t.name))
        .collect();
    if prune {
        for remote in unmanaged {
            plan.push(Operation::new(Kind::Tag, Action::Delete, &remote.name).with_id(&remote.id));
        }
    } else {
        note_unmanaged(plan, Kind::Tag, unmanaged.len());
    }
    Ok(())
}

// =============================================================================
// Saved queries
// =============================================================================

fn plan_saved_queries(
    desired: &DesiredSpec,
    snapshot: &Snapshot,
    options: PruneOptions,
    plan: &mut Plan,
) -> Result<()> {
    let mut claimed = Claimed::default();

    for (index, want) in desired.saved_queries.iter().enumerate() {
        claimed.claim(want.id.as_deref(), &want.name);

        let remote = match want.id.as_deref() {
            Some(id) => Some(snapshot.saved_query_by_id(id).ok_or_else(|| Error::UnknownId {
                kind: Kind::SavedQuery,
                name: want.name.clone(),
                id: id.to_string(),
            })?),
            None => snapshot.saved_query_by_name(&want.name)?,
        };

        let order = desired.effective_order(index);
        let payload = Payload::SavedQuery(SavedQueryPayload {
            name: want.name.clone(),
            query: want.query.clone(),
            color: want.color.clone(),
            is_favorite: want.is_favorite,
            order,
        });

        let Some(remote) = remote else {
            plan.push(
                Operation::new(Kind::SavedQuery, Action::Create, &want.name).with_payload(payload),
            );
            continue;
        };

        let mut changes = Vec::new();
        if want.id.is_some() && remote.name != want.name {
            changes.push(Change::new("name", &remote.name, &want.name));
        }
        if remote.query != want.query {
            changes.push(Change::new("query", &remote.query, &want.query));
        }
        diff_str(&mut changes, "color", want.color.as_deref(), &remote.color);
        diff_bool(&mut changes, "is_favorite", want.is_favorite, remote.is_favorite);
        if remote.item_order != order {
            changes.push(Change::new(
                "order",
                remote.item_order.to_string(),
                order.to_string(),
            ));
        }
        if !changes.is_empty() {
            plan.push(
                Operation::new(Kind::SavedQuery, Action::Update, &want.name)
                    .with_id(&remote.id)
                    .with_changes(changes)
                    .with_payload(payload),
            );
        }
    }

    let prune = options.gate(plan, Kind::SavedQuery, desired.prune.saved_queries);
    let unmanaged: Vec<_> = snapshot
        .saved_queries
        .iter()
        .filter(|q| !claimed.contains(&q.id, &q.name))
        .collect();
    if prune {
        for remote in unmanaged {
            plan.push(
                Operation::new(Kind::SavedQuery, Action::Delete, &remote.name).with_id(&remote.id),
            );
        }
    } else {
        note_unmanaged(plan, Kind::SavedQuery, unmanaged.len());
    }
    Ok(())
}

// =============================================================================
// Work items
// =============================================================================

fn label_set(labels: &[String]) -> BTreeSet<&str> {
    labels.iter().map(String::as_str).collect()
}

fn render_labels(labels: &BTreeSet<&str>) -> String {
    labels.iter().copied().collect::<Vec<_>>().join(", ")
}

fn work_item_changes(want: &DesiredWorkItem, remote: &RemoteWorkItem) -> Vec<Change> {
    let mut changes = Vec::new();
    if remote.content != want.content {
        changes.push(Change::new("content", &remote.content, &want.content));
    }

    let remote_text = managed_key::strip(&remote.description);
    if let Some(text) = want.description.as_deref() {
        let text = managed_key::strip(text);
        if text != remote_text {
            changes.push(Change::new("description", remote_text, text));
        }
    }

    if let Some(key) = want.key.as_deref() {
        let have = managed_key::extract(&remote.description).unwrap_or_default();
        if have != key {
            changes.push(Change::new("managed_key", have, key));
        }
    }

    if let Some(labels) = want.labels.as_deref() {
        let want_set = label_set(labels);
        let have_set = label_set(&remote.labels);
        if want_set != have_set {
            changes.push(Change::new(
                "labels",
                render_labels(&have_set),
                render_labels(&want_set),
            ));
        }
    }

    if let Some(priority) = want.priority {
        if priority != remote.priority {
            changes.push(Change::new(
                "priority",
                remote.priority.to_string(),
                priority.to_string(),
            ));
        }
    }

    diff_str(
        &mut changes,
        "due",
        want.due.as_deref(),
        remote.due.as_deref().unwrap_or_default(),
    );
    changes
}

/// A work item's container must be desired or name exactly one remote
/// container, so a bad reference fails before any remote write
fn check_container_reference(
    desired: &DesiredSpec,
    snapshot: &Snapshot,
    want: &DesiredWorkItem,
) -> Result<()> {
    let Some(container) = want.container.as_deref().filter(|c| !c.is_empty()) else {
        return Ok(());
    };
    if desired.container(container).is_some() || snapshot.container_by_name(container)?.is_some() {
        return Ok(());
    }
    Err(Error::InvalidInput(format!(
        "work item {:?} references unknown container {container:?}",
        want.display_name()
    )))
}

fn plan_work_items(
    desired: &DesiredSpec,
    snapshot: &Snapshot,
    options: PruneOptions,
    plan: &mut Plan,
) -> Result<()> {
    let mut claimed_ids = HashSet::new();
    let mut claimed_keys = HashSet::new();

    for want in &desired.work_items {
        let name = want.display_name();
        check_container_reference(desired, snapshot, want)?;
        if let Some(id) = want.id.as_deref() {
            claimed_ids.insert(id);
        }
        if let Some(key) = want.key.as_deref() {
            claimed_keys.insert(key);
        }

        let remote = match (want.id.as_deref(), want.key.as_deref()) {
            (Some(id), _) => Some(snapshot.work_item_by_id(id).ok_or_else(|| Error::UnknownId {
                kind: Kind::WorkItem,
                name: name.to_string(),
                id: id.to_string(),
            })?),
            (None, Some(key)) => snapshot.work_item_by_key(key),
            (None, None) => {
                return Err(Error::InvalidInput(format!(
                    "work item {:?} has neither an id nor a managed key",
                    want.content
                )));
            }
        };

        let Some(remote) = remote else {
            plan.push(
                Operation::new(Kind::WorkItem, Action::Create, name).with_payload(
                    Payload::WorkItem(WorkItemPayload {
                        key: want.key.clone(),
                        content: want.content.clone(),
                        description: managed_key::embed(
                            want.description.as_deref(),
                            want.key.as_deref(),
                        ),
                        container: want.container.clone(),
                        labels: want.labels.clone(),
                        priority: want.priority,
                        due: want.due.clone(),
                    }),
                ),
            );
            continue;
        };

        let changes = work_item_changes(want, remote);
        if !changes.is_empty() {
            // Rewrite the full description only when its text or key changes,
            // keeping remote text and key the desired item does not manage.
            let description = if changes
                .iter()
                .any(|c| c.field == "description" || c.field == "managed_key")
            {
                let remote_text = managed_key::strip(&remote.description);
                let text = want.description.as_deref().unwrap_or(&remote_text);
                let key = want
                    .key
                    .as_deref()
                    .or_else(|| managed_key::extract(&remote.description));
                managed_key::embed(Some(text), key)
            } else {
                None
            };
            plan.push(
                Operation::new(Kind::WorkItem, Action::Update, name)
                    .with_id(&remote.id)
                    .with_changes(changes)
                    .with_payload(Payload::WorkItem(WorkItemPayload {
                        key: want.key.clone(),
                        content: want.content.clone(),
                        description,
                        container: None,
                        labels: want.labels.clone(),
                        priority: want.priority,
                        due: want.due.clone(),
                    })),
            );
        }

        if let Some(container) = want.container.as_deref() {
            let have = snapshot.work_item_container_name(remote);
            if have != container {
                plan.push(
                    Operation::new(Kind::WorkItem, Action::Move, name)
                        .with_id(&remote.id)
                        .with_changes(vec![Change::new("container", have, container)])
                        .with_payload(Payload::WorkItem(WorkItemPayload {
                            key: want.key.clone(),
                            content: want.content.clone(),
                            container: Some(container.to_string()),
                            ..Default::default()
                        })),
                );
            }
        }
    }

    // Only items carrying a managed key are candidates; anything else was
    // never created by this tool.
    let prune = options.gate(plan, Kind::WorkItem, desired.prune.work_items);
    let unmanaged: Vec<(&str, &RemoteWorkItem)> = snapshot
        .work_items
        .iter()
        .filter_map(|item| managed_key::extract(&item.description).map(|key| (key, item)))
        .filter(|(key, item)| {
            !claimed_ids.contains(item.id.as_str()) && !claimed_keys.contains(key)
        })
        .collect();
    if prune {
        for (key, remote) in unmanaged {
            plan.push(Operation::new(Kind::WorkItem, Action::Delete, key).with_id(&remote.id));
        }
    } else {
        note_unmanaged(plan, Kind::WorkItem, unmanaged.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desired::{DesiredContainer, DesiredSavedQuery, DesiredTag, PruneSpec};
    use crate::remote::{RemoteContainer, RemoteSavedQuery, RemoteTag};

    fn remote_container(id: &str, name: &str, parent: Option<&str>, color: &str) -> RemoteContainer {
        RemoteContainer {
            id: id.into(),
            name: name.into(),
            parent_id: parent.map(Into::into),
            color: color.into(),
            ..Default::default()
        }
    }

    fn container(name: &str, parent: Option<&str>, color: Option<&str>) -> DesiredContainer {
        DesiredContainer {
            name: name.into(),
            parent: parent.map(Into::into),
            color: color.map(Into::into),
            ..Default::default()
        }
    }

    fn snapshot_with_containers(containers: Vec<RemoteContainer>) -> Snapshot {
        Snapshot::from_parts(containers, vec![], vec![], vec![]).unwrap()
    }

    fn all_prune() -> PruneSpec {
        PruneSpec {
            containers: true,
            tags: true,
            saved_queries: true,
            work_items: true,
        }
    }

    #[test]
    fn test_update_and_move_scenario() {
        let desired = DesiredSpec {
            containers: vec![
                container("Work", None, Some("red")),
                container("Child", Some("Work"), None),
            ],
            ..Default::default()
        };
        let snapshot = snapshot_with_containers(vec![
            remote_container("P1", "Work", None, "blue"),
            remote_container("P2", "Child", None, "green"),
        ]);

        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();

        assert_eq!(plan.operations.len(), 2);
        let mv = &plan.operations[0];
        assert_eq!((mv.kind, mv.action, mv.name.as_str()), (Kind::Container, Action::Move, "Child"));
        assert_eq!(mv.id.as_deref(), Some("P2"));
        assert_eq!(mv.changes, vec![Change::new("parent", "", "Work")]);

        let update = &plan.operations[1];
        assert_eq!((update.action, update.name.as_str()), (Action::Update, "Work"));
        assert_eq!(update.changes, vec![Change::new("color", "blue", "red")]);

        assert_eq!(plan.summary.create, 0);
        assert_eq!(plan.summary.update, 1);
        assert_eq!(plan.summary.moves, 1);
        assert_eq!(plan.summary.delete, 0);
    }

    #[test]
    fn test_unset_fields_not_compared() {
        let desired = DesiredSpec {
            containers: vec![container("Work", None, None)],
            ..Default::default()
        };
        let snapshot = snapshot_with_containers(vec![remote_container("P1", "Work", None, "blue")]);
        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_rename_compared_only_with_explicit_id() {
        let desired = DesiredSpec {
            containers: vec![DesiredContainer {
                name: "Renamed".into(),
                id: Some("P1".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let snapshot = snapshot_with_containers(vec![remote_container("P1", "Old", None, "")]);
        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();
        assert_eq!(plan.operations.len(), 1);
        assert_eq!(plan.operations[0].changes, vec![Change::new("name", "Old", "Renamed")]);
    }

    #[test]
    fn test_unknown_explicit_id_fails() {
        let desired = DesiredSpec {
            tags: vec![DesiredTag {
                name: "waiting".into(),
                id: Some("L404".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let err = build_plan(&desired, &Snapshot::empty(), PruneOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnknownId { kind: Kind::Tag, ref id, .. } if id == "L404"));
    }

    #[test]
    fn test_name_ambiguity_lists_candidates() {
        let desired = DesiredSpec {
            containers: vec![container("Dup", None, None)],
            ..Default::default()
        };
        let snapshot = snapshot_with_containers(vec![
            remote_container("P9", "Dup", None, ""),
            remote_container("P3", "Dup", None, ""),
        ]);
        let err = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap_err();
        match &err {
            Error::Ambiguous { ids, .. } => assert_eq!(ids, &vec!["P3".to_string(), "P9".to_string()]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("P3, P9"));
    }

    #[test]
    fn test_explicit_id_disambiguates() {
        let desired = DesiredSpec {
            containers: vec![DesiredContainer {
                name: "Dup".into(),
                id: Some("P3".into()),
                color: Some("red".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let snapshot = snapshot_with_containers(vec![
            remote_container("P9", "Dup", None, ""),
            remote_container("P3", "Dup", None, "red"),
        ]);
        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();
        assert!(plan.is_empty());
    }

    fn unmanaged_everywhere() -> Snapshot {
        Snapshot::from_parts(
            vec![remote_container("P1", "Stray", None, "")],
            vec![RemoteTag {
                id: "L1".into(),
                name: "old".into(),
                ..Default::default()
            }],
            vec![RemoteSavedQuery {
                id: "F1".into(),
                name: "Legacy".into(),
                query: "today".into(),
                item_order: 1,
                ..Default::default()
            }],
            vec![RemoteWorkItem {
                id: "T1".into(),
                content: "Stale".into(),
                description: "TIDYIST_KEY: stale".into(),
                ..Default::default()
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_global_prune_off_never_deletes() {
        let desired = DesiredSpec {
            prune: all_prune(),
            ..Default::default()
        };
        let plan = build_plan(&desired, &unmanaged_everywhere(), PruneOptions::default()).unwrap();
        assert_eq!(plan.summary.delete, 0);
        assert!(plan.is_empty());
        assert!(plan
            .notes
            .contains(&"1 remote containers are not in the desired spec (prune disabled)".to_string()));
        assert_eq!(plan.notes.len(), 4);
    }

    #[test]
    fn test_kind_flag_off_notes_and_skips() {
        let desired = DesiredSpec {
            prune: PruneSpec {
                containers: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let plan = build_plan(&desired, &unmanaged_everywhere(), PruneOptions::enabled()).unwrap();
        let deletes: Vec<_> = plan
            .operations
            .iter()
            .filter(|op| op.action == Action::Delete)
            .map(|op| op.kind)
            .collect();
        assert_eq!(deletes, vec![Kind::Container]);
        assert!(plan
            .notes
            .contains(&"prune enabled but prune.tags is false; tag deletions are disabled".to_string()));
        assert!(plan.notes.iter().any(|n| n.contains("prune.saved_queries is false")));
        assert!(plan.notes.iter().any(|n| n.contains("prune.work_items is false")));
    }

    #[test]
    fn test_prune_deletes_every_kind() {
        let desired = DesiredSpec {
            prune: all_prune(),
            ..Default::default()
        };
        let plan = build_plan(&desired, &unmanaged_everywhere(), PruneOptions::enabled()).unwrap();
        assert_eq!(plan.summary.delete, 4);
        let wi = plan
            .operations
            .iter()
            .find(|op| op.kind == Kind::WorkItem)
            .unwrap();
        assert_eq!(wi.name, "stale");
        assert_eq!(wi.id.as_deref(), Some("T1"));
    }

    #[test]
    fn test_protected_container_never_deleted() {
        let mut inbox = remote_container("P0", "Inbox", None, "");
        inbox.is_inbox = true;
        let desired = DesiredSpec {
            prune: all_prune(),
            ..Default::default()
        };
        let plan = build_plan(&desired, &snapshot_with_containers(vec![inbox]), PruneOptions::enabled())
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.notes, vec!["refusing to delete protected container \"Inbox\"".to_string()]);
    }

    #[test]
    fn test_work_items_without_key_not_prune_candidates() {
        let snapshot = Snapshot::from_parts(
            vec![],
            vec![],
            vec![],
            vec![RemoteWorkItem {
                id: "T1".into(),
                content: "Hand-made".into(),
                ..Default::default()
            }],
        )
        .unwrap();
        let desired = DesiredSpec {
            prune: all_prune(),
            ..Default::default()
        };
        let plan = build_plan(&desired, &snapshot, PruneOptions::enabled()).unwrap();
        assert!(plan.is_empty());
        assert!(plan.notes.is_empty());
    }

    #[test]
    fn test_saved_query_create_and_order_default() {
        let desired = DesiredSpec {
            saved_queries: vec![
                DesiredSavedQuery {
                    name: "Today".into(),
                    query: "today".into(),
                    ..Default::default()
                },
                DesiredSavedQuery {
                    name: "Focus".into(),
                    query: "p1 & today".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let snapshot = Snapshot::from_parts(
            vec![],
            vec![],
            vec![RemoteSavedQuery {
                id: "F1".into(),
                name: "Today".into(),
                query: "today".into(),
                item_order: 5,
                ..Default::default()
            }],
            vec![],
        )
        .unwrap();

        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();
        assert_eq!(plan.operations.len(), 2);

        let create = &plan.operations[0];
        assert_eq!((create.action, create.name.as_str()), (Action::Create, "Focus"));
        match &create.payload {
            Some(Payload::SavedQuery(p)) => assert_eq!(p.order, 2),
            other => panic!("unexpected payload: {other:?}"),
        }

        let update = &plan.operations[1];
        assert_eq!(update.changes, vec![Change::new("order", "5", "1")]);
    }

    #[test]
    fn test_saved_query_query_always_compared() {
        let desired = DesiredSpec {
            saved_queries: vec![DesiredSavedQuery {
                name: "Today".into(),
                query: "today | overdue".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let snapshot = Snapshot::from_parts(
            vec![],
            vec![],
            vec![RemoteSavedQuery {
                id: "F1".into(),
                name: "Today".into(),
                query: "today".into(),
                item_order: 1,
                ..Default::default()
            }],
            vec![],
        )
        .unwrap();
        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();
        assert_eq!(
            plan.operations[0].changes,
            vec![Change::new("query", "today", "today | overdue")]
        );
    }

    #[test]
    fn test_work_item_create_embeds_key() {
        let desired = DesiredSpec {
            work_items: vec![DesiredWorkItem {
                key: Some("weekly".into()),
                content: "Weekly review".into(),
                description: Some("Go through inbox".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let plan = build_plan(&desired, &Snapshot::empty(), PruneOptions::default()).unwrap();
        let op = &plan.operations[0];
        assert_eq!((op.action, op.name.as_str()), (Action::Create, "weekly"));
        match &op.payload {
            Some(Payload::WorkItem(p)) => assert_eq!(
                p.description.as_deref(),
                Some("Go through inbox\nTIDYIST_KEY: weekly")
            ),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_work_item_diff_and_move() {
        let snapshot = Snapshot::from_parts(
            vec![
                remote_container("P1", "Home", None, ""),
                remote_container("P2", "Work", None, ""),
            ],
            vec![],
            vec![],
            vec![RemoteWorkItem {
                id: "T1".into(),
                content: "Weekly review".into(),
                description: "old text\nTIDYIST_KEY: weekly".into(),
                container_id: "P1".into(),
                labels: vec!["b".into(), "a".into()],
                priority: 1,
                due: Some("every friday".into()),
            }],
        )
        .unwrap();
        let desired = DesiredSpec {
            containers: vec![container("Home", None, None), container("Work", None, None)],
            work_items: vec![DesiredWorkItem {
                key: Some("weekly".into()),
                content: "Weekly review".into(),
                description: Some("new text".into()),
                container: Some("Work".into()),
                labels: Some(vec!["a".into(), "b".into()]),
                priority: Some(4),
                due: Some("every friday".into()),
                ..Default::default()
            }],
            ..Default::default()
        };

        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();
        assert_eq!(plan.operations.len(), 2);

        let update = &plan.operations[0];
        assert_eq!(update.action, Action::Update);
        assert_eq!(
            update.changes,
            vec![
                Change::new("description", "old text", "new text"),
                Change::new("priority", "1", "4"),
            ]
        );
        match &update.payload {
            Some(Payload::WorkItem(p)) => {
                assert_eq!(p.description.as_deref(), Some("new text\nTIDYIST_KEY: weekly"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        let mv = &plan.operations[1];
        assert_eq!(mv.action, Action::Move);
        assert_eq!(mv.changes, vec![Change::new("container", "Home", "Work")]);
    }

    #[test]
    fn test_work_item_by_id_gains_key() {
        let snapshot = Snapshot::from_parts(
            vec![],
            vec![],
            vec![],
            vec![RemoteWorkItem {
                id: "T1".into(),
                content: "Water plants".into(),
                description: "kitchen first".into(),
                ..Default::default()
            }],
        )
        .unwrap();
        let desired = DesiredSpec {
            work_items: vec![DesiredWorkItem {
                id: Some("T1".into()),
                key: Some("plants".into()),
                content: "Water plants".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();
        let op = &plan.operations[0];
        assert_eq!(op.changes, vec![Change::new("managed_key", "", "plants")]);
        match &op.payload {
            Some(Payload::WorkItem(p)) => assert_eq!(
                p.description.as_deref(),
                Some("kitchen first\nTIDYIST_KEY: plants")
            ),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_work_item_unknown_container_rejected() {
        let desired = DesiredSpec {
            tags: vec![DesiredTag {
                name: "waiting".into(),
                ..Default::default()
            }],
            work_items: vec![DesiredWorkItem {
                key: Some("k".into()),
                content: "Call back".into(),
                container: Some("Nowhere".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let err = build_plan(&desired, &Snapshot::empty(), PruneOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("\"Nowhere\"")));
    }

    #[test]
    fn test_work_item_container_resolves_remote_or_desired() {
        let snapshot = Snapshot::from_parts(
            vec![remote_container("P1", "Home", None, "")],
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        let desired = DesiredSpec {
            containers: vec![container("Work", None, None)],
            work_items: vec![
                DesiredWorkItem {
                    key: Some("a".into()),
                    content: "At home".into(),
                    container: Some("Home".into()),
                    ..Default::default()
                },
                DesiredWorkItem {
                    key: Some("b".into()),
                    content: "At work".into(),
                    container: Some("Work".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let plan = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap();
        assert_eq!(plan.summary.create, 3);
    }

    #[test]
    fn test_work_item_ambiguous_container_rejected() {
        let snapshot = Snapshot::from_parts(
            vec![
                remote_container("P1", "Errands", None, ""),
                remote_container("P2", "Errands", None, ""),
            ],
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        let desired = DesiredSpec {
            work_items: vec![DesiredWorkItem {
                key: Some("k".into()),
                content: "Buy milk".into(),
                container: Some("Errands".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let err = build_plan(&desired, &snapshot, PruneOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Ambiguous { kind: Kind::Container, .. }));
    }

    #[test]
    fn test_desired_parent_cycle_rejected() {
        let desired = DesiredSpec {
            containers: vec![
                container("A", Some("B"), None),
                container("B", Some("A"), None),
            ],
            ..Default::default()
        };
        let err = build_plan(&desired, &Snapshot::empty(), PruneOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("cycle")));
    }

    #[test]
    fn test_operations_sorted_for_display() {
        let desired = DesiredSpec {
            containers: vec![container("Zeta", None, None), container("Alpha", None, None)],
            tags: vec![DesiredTag {
                name: "a".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let plan = build_plan(&desired, &Snapshot::empty(), PruneOptions::default()).unwrap();
        let order: Vec<_> = plan
            .operations
            .iter()
            .map(|op| (op.kind, op.name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Kind::Container, "Alpha"),
                (Kind::Container, "Zeta"),
                (Kind::Tag, "a"),
            ]
        );
    }
}
