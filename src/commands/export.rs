//! `tidyist export`: render current Todoist state as a desired-state file.
//!
//! The output is a starting point for adoption: planning it against the
//! same account should report no changes.

use anyhow::Result;
use reconcile::Snapshot;
use reconcile::managed_key;
use reconcile::remote::RemoteContainer;
use std::collections::{HashMap, HashSet};

use super::Session;
use crate::Context;
use crate::cli::ExportArgs;
use crate::config::{FilterConfig, LabelConfig, ProjectConfig, TaskConfig, TidyConfig};
use crate::ui;

pub fn run(ctx: &Context, args: &ExportArgs) -> Result<()> {
    let session = Session::connect(ctx)?;
    let snapshot = session.snapshot()?;
    let config = export_config(&snapshot, args);
    warn_duplicate_names(&config);

    if ctx.json {
        ui::print_json(&config)?;
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

/// Desired-state equivalent of a snapshot.
///
/// Tasks are exported only when they carry a managed key, or when ids are
/// included and the id alone can pin them. Cosmetic fields (color,
/// favorite, view style) need `full`.
pub fn export_config(snapshot: &Snapshot, args: &ExportArgs) -> TidyConfig {
    let include_inbox = args.include_inbox;
    let include_ids = args.include_ids;
    let full = args.full;
    let pin = |id: &str| include_ids.then(|| id.to_string());
    let cosmetic = |value: &str| if full { non_empty(value) } else { None };
    let favorite = |value: bool| (full && value).then_some(true);

    let projects = parents_first(&snapshot.containers)
        .into_iter()
        .filter(|c| include_inbox || !c.is_inbox)
        .map(|c| {
            let parent = snapshot.parent_name(c);
            // Unknown parents come back as raw ids; drop them, and skipped inboxes
            let parent = c
                .parent_id
                .as_deref()
                .and_then(|id| snapshot.container_by_id(id))
                .filter(|p| include_inbox || !p.is_inbox)
                .map(|_| parent);
            ProjectConfig {
                name: c.name.clone(),
                id: pin(&c.id),
                parent,
                color: cosmetic(&c.color),
                is_favorite: favorite(c.is_favorite),
                view_style: cosmetic(&c.view_style),
            }
        })
        .collect();

    let labels = snapshot
        .tags
        .iter()
        .map(|t| LabelConfig {
            name: t.name.clone(),
            id: pin(&t.id),
            color: cosmetic(&t.color),
            is_favorite: favorite(t.is_favorite),
        })
        .collect();

    let mut queries: Vec<_> = snapshot.saved_queries.iter().collect();
    queries.sort_by(|a, b| a.item_order.cmp(&b.item_order).then(a.name.cmp(&b.name)));
    let filters = queries
        .into_iter()
        .map(|q| FilterConfig {
            name: q.name.clone(),
            id: pin(&q.id),
            query: q.query.clone(),
            color: cosmetic(&q.color),
            is_favorite: favorite(q.is_favorite),
            order: (q.item_order >= 1).then_some(q.item_order),
        })
        .collect();

    let tasks = snapshot
        .work_items
        .iter()
        .filter_map(|item| {
            let key = managed_key::extract(&item.description).map(str::to_string);
            if key.is_none() && !include_ids {
                return None;
            }
            let project = snapshot.work_item_container_name(item);
            Some(TaskConfig {
                key,
                id: pin(&item.id),
                content: item.content.clone(),
                description: non_empty(&managed_key::strip(&item.description)),
                project: non_empty(&project),
                labels: (!item.labels.is_empty()).then(|| item.labels.clone()),
                priority: (item.priority > 1).then_some(item.priority),
                due: item.due.as_deref().and_then(non_empty),
            })
        })
        .collect();

    TidyConfig {
        name: args.name.clone(),
        projects,
        labels,
        filters,
        tasks,
        ..Default::default()
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Containers ordered so every parent precedes its children.
///
/// Siblings keep name order; containers caught in a parent cycle are
/// appended last.
fn parents_first(containers: &[RemoteContainer]) -> Vec<&RemoteContainer> {
    let known: HashSet<&str> = containers.iter().map(|c| c.id.as_str()).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(containers.len());

    loop {
        let before = ordered.len();
        for container in containers {
            if placed.contains(container.id.as_str()) {
                continue;
            }
            let ready = match container.parent_id.as_deref() {
                None | Some("") => true,
                Some(parent) => !known.contains(parent) || placed.contains(parent),
            };
            if ready {
                placed.insert(container.id.as_str());
                ordered.push(container);
            }
        }
        if ordered.len() == before {
            break;
        }
    }

    ordered.extend(
        containers
            .iter()
            .filter(|c| !placed.contains(c.id.as_str())),
    );
    ordered
}

/// Remote names may repeat; an exported file with repeats will not validate
fn warn_duplicate_names(config: &TidyConfig) {
    report_repeats("projects", config.projects.iter().map(|p| p.name.as_str()));
    report_repeats("labels", config.labels.iter().map(|l| l.name.as_str()));
    report_repeats("filters", config.filters.iter().map(|f| f.name.as_str()));
}

fn report_repeats<'a>(what: &str, names: impl Iterator<Item = &'a str>) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    let mut repeated: Vec<_> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    repeated.sort_unstable();
    for (name, count) in repeated {
        log::warn!("{count} {what} named {name:?}; rename them before using this file");
    }
}
