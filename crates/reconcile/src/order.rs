//! Execution ordering for hierarchical containers.
//!
//! Plan display order is not a valid execution order: a child create must
//! follow its parent's create, and deletes must remove leaves before their
//! ancestors.

use crate::error::{Error, Result};
use crate::snapshot::Snapshot;
use crate::types::{Kind, Operation, Payload};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

fn create_parent(op: &Operation) -> Option<&str> {
    match &op.payload {
        Some(Payload::Container(p)) => p.parent.as_deref().filter(|name| !name.is_empty()),
        _ => None,
    }
}

/// Order container creates so parents precede their children.
///
/// Only parents that are themselves part of the batch create a dependency.
/// Among ready creates, the smallest name goes first. A batch that cannot
/// be fully ordered contains a cycle and fails.
pub fn order_container_creates(ops: Vec<Operation>) -> Result<Vec<Operation>> {
    if ops.len() < 2 {
        return Ok(ops);
    }

    let positions: HashMap<&str, usize> = ops
        .iter()
        .enumerate()
        .map(|(pos, op)| (op.name.as_str(), pos))
        .collect();

    let mut indegree = vec![0usize; ops.len()];
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for (pos, op) in ops.iter().enumerate() {
        if let Some(&parent) = create_parent(op).and_then(|name| positions.get(name)) {
            indegree[pos] += 1;
            children.entry(parent).or_default().push(pos);
        }
    }

    let mut ready: BTreeSet<(&str, usize)> = ops
        .iter()
        .enumerate()
        .filter(|(pos, _)| indegree[*pos] == 0)
        .map(|(pos, op)| (op.name.as_str(), pos))
        .collect();

    let mut sequence = Vec::with_capacity(ops.len());
    while let Some(next) = ready.pop_first() {
        let (_, pos) = next;
        sequence.push(pos);
        for &child in children.get(&pos).map(Vec::as_slice).unwrap_or_default() {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                ready.insert((ops[child].name.as_str(), child));
            }
        }
    }

    if sequence.len() < ops.len() {
        let stuck: BTreeMap<String, String> = ops
            .iter()
            .enumerate()
            .filter(|(pos, _)| indegree[*pos] > 0)
            .filter_map(|(_, op)| {
                create_parent(op).map(|parent| (op.name.clone(), parent.to_string()))
            })
            .collect();
        let names = find_parent_cycle(&stuck).unwrap_or_else(|| stuck.into_keys().collect());
        return Err(Error::CreateCycle {
            kind: Kind::Container,
            names,
        });
    }

    let mut slots: Vec<Option<Operation>> = ops.into_iter().map(Some).collect();
    Ok(sequence
        .into_iter()
        .filter_map(|pos| slots[pos].take())
        .collect())
}

/// Depth of a remote container: number of ancestors reachable through the
/// snapshot. Stops when a node repeats.
fn remote_depth(snapshot: &Snapshot, id: &str) -> usize {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut depth = 0;
    let mut current = snapshot.container_by_id(id);
    while let Some(container) = current {
        if !visited.insert(container.id.as_str()) {
            break;
        }
        match container.parent_id.as_deref().filter(|p| !p.is_empty()) {
            Some(parent) => {
                depth += 1;
                current = snapshot.container_by_id(parent);
            }
            None => break,
        }
    }
    depth
}

/// Order container deletes deepest first, ties by name
pub fn order_container_deletes(mut ops: Vec<Operation>, snapshot: &Snapshot) -> Vec<Operation> {
    ops.sort_by_cached_key(|op| {
        let depth = op
            .id
            .as_deref()
            .map_or(0, |id| remote_depth(snapshot, id));
        (Reverse(depth), op.name.clone())
    });
    ops
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// Find a cycle in a child to parent map.
///
/// Walks each chain with unvisited/visiting/visited marks. Returns the
/// names along the first cycle found, starting and ending at the same
/// node, or `None` when every chain terminates. Parents missing from the
/// map end a chain.
pub fn find_parent_cycle(parents: &BTreeMap<String, String>) -> Option<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    for start in parents.keys() {
        if marks.contains_key(start.as_str()) {
            continue;
        }

        let mut path: Vec<&str> = Vec::new();
        let mut current = Some(start.as_str());
        while let Some(node) = current {
            match marks.get(node) {
                Some(Mark::Visited) => break,
                Some(Mark::Visiting) => {
                    let from = path.iter().position(|n| *n == node).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[from..].iter().map(|n| (*n).to_string()).collect();
                    cycle.push(node.to_string());
                    return Some(cycle);
                }
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            path.push(node);
            current = parents
                .get_key_value(node)
                .map(|(_, parent)| parent.as_str());
        }

        for node in path {
            marks.insert(node, Mark::Visited);
        }
    }
    None
}
