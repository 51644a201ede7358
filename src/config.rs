//! Desired-state file: loading, normalization and validation.
//!
//! The file uses Todoist vocabulary (projects, labels, filters, tasks) and
//! converts into the reconciler's [`DesiredSpec`].

use anyhow::{Context, Result};
use reconcile::order::find_parent_cycle;
use reconcile::{
    DesiredContainer, DesiredSavedQuery, DesiredSpec, DesiredTag, DesiredWorkItem, PruneSpec,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Default desired-state file, relative to the working directory
pub const DEFAULT_PATH: &str = "tidyist.toml";

// ============================================================================
// File Schema
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TidyConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prune: PruneConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<ProjectConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskConfig>,
}

/// Per-kind deletion gates; `--prune` must also be given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneConfig {
    #[serde(default)]
    pub projects: bool,
    #[serde(default)]
    pub labels: bool,
    #[serde(default)]
    pub filters: bool,
    #[serde(default)]
    pub tasks: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_style: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Managed key embedded in the task description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Project name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

// ============================================================================
// Loading
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    /// Pick a format from the file extension; anything but `.json` is TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// All problems found in a desired-state file
#[derive(Debug, thiserror::Error)]
#[error("invalid config:\n  - {}", .0.join("\n  - "))]
pub struct ValidationError(pub Vec<String>);

/// Read, normalize and validate a desired-state file
pub fn load(path: &Path) -> Result<TidyConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read config file: {}", path.display()))?;
    let mut config = parse(&content, Format::from_path(path))
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    config.normalize();
    config.validate()?;
    log::debug!(
        "loaded {}: {} projects, {} labels, {} filters, {} tasks",
        path.display(),
        config.projects.len(),
        config.labels.len(),
        config.filters.len(),
        config.tasks.len()
    );
    Ok(config)
}

pub fn parse(content: &str, format: Format) -> Result<TidyConfig> {
    match format {
        Format::Toml => toml::from_str(content).context("Invalid TOML format"),
        Format::Json => serde_json::from_str(content).context("Invalid JSON format"),
    }
}

fn trim(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn trim_opt(value: &mut Option<String>) {
    if let Some(v) = value {
        trim(v);
    }
}

impl TidyConfig {
    /// Trim strings and default filter orders to their 1-based position.
    ///
    /// Names stay case-sensitive.
    pub fn normalize(&mut self) {
        trim(&mut self.name);
        for project in &mut self.projects {
            trim(&mut project.name);
            trim_opt(&mut project.id);
            trim_opt(&mut project.parent);
            trim_opt(&mut project.color);
            trim_opt(&mut project.view_style);
        }
        for label in &mut self.labels {
            trim(&mut label.name);
            trim_opt(&mut label.id);
            trim_opt(&mut label.color);
        }
        for (index, filter) in self.filters.iter_mut().enumerate() {
            trim(&mut filter.name);
            trim_opt(&mut filter.id);
            trim(&mut filter.query);
            trim_opt(&mut filter.color);
            if filter.order.is_none() {
                filter.order = Some(index as i64 + 1);
            }
        }
        for task in &mut self.tasks {
            trim_opt(&mut task.key);
            trim_opt(&mut task.id);
            trim(&mut task.content);
            trim_opt(&mut task.project);
            trim_opt(&mut task.due);
            if let Some(labels) = &mut task.labels {
                labels.iter_mut().for_each(trim);
            }
        }
    }

    /// Check every rule and report all violations together
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errs = Vec::new();

        if self.name.is_empty() {
            errs.push("name is required".to_string());
        }

        self.validate_projects(&mut errs);
        self.validate_labels(&mut errs);
        self.validate_filters(&mut errs);
        self.validate_tasks(&mut errs);

        if errs.is_empty() {
            Ok(())
        } else {
            Err(ValidationError(errs))
        }
    }

    fn validate_projects(&self, errs: &mut Vec<String>) {
        let mut names = HashSet::new();
        let mut ids = UniqueIds::new("project");
        for (i, project) in self.projects.iter().enumerate() {
            if project.name.is_empty() {
                errs.push(format!("projects[{i}].name is required"));
                continue;
            }
            if !names.insert(project.name.as_str()) {
                errs.push(format!("duplicate project name {:?}", project.name));
            }
            ids.check(project.id.as_deref(), errs);
            if project.parent.as_deref() == Some("") {
                errs.push(format!(
                    "projects[{i}].parent cannot be empty; omit it to keep the project at the root"
                ));
            }
        }

        let mut parents = BTreeMap::new();
        for (i, project) in self.projects.iter().enumerate() {
            let Some(parent) = project.parent.as_deref().filter(|p| !p.is_empty()) else {
                continue;
            };
            if names.contains(parent) {
                parents.insert(project.name.clone(), parent.to_string());
            } else {
                errs.push(format!(
                    "projects[{i}] ({:?}) references unknown parent {parent:?}",
                    project.name
                ));
            }
        }
        if let Some(cycle) = find_parent_cycle(&parents) {
            errs.push(format!(
                "project parent cycle detected: {}",
                cycle.join(" -> ")
            ));
        }
    }

    fn validate_labels(&self, errs: &mut Vec<String>) {
        let mut names = HashSet::new();
        let mut ids = UniqueIds::new("label");
        for (i, label) in self.labels.iter().enumerate() {
            if label.name.is_empty() {
                errs.push(format!("labels[{i}].name is required"));
                continue;
            }
            if !names.insert(label.name.as_str()) {
                errs.push(format!("duplicate label name {:?}", label.name));
            }
            ids.check(label.id.as_deref(), errs);
        }
    }

    fn validate_filters(&self, errs: &mut Vec<String>) {
        let mut names = HashSet::new();
        let mut ids = UniqueIds::new("filter");
        for (i, filter) in self.filters.iter().enumerate() {
            if filter.name.is_empty() {
                errs.push(format!("filters[{i}].name is required"));
                continue;
            }
            if !names.insert(filter.name.as_str()) {
                errs.push(format!("duplicate filter name {:?}", filter.name));
            }
            ids.check(filter.id.as_deref(), errs);
            if filter.query.is_empty() {
                errs.push(format!("filters[{i}] ({:?}).query is required", filter.name));
            }
            if filter.order.is_none_or(|order| order < 1) {
                errs.push(format!("filters[{i}] ({:?}).order must be >= 1", filter.name));
            }
        }
    }

    fn validate_tasks(&self, errs: &mut Vec<String>) {
        let mut keys = HashSet::new();
        let mut ids = UniqueIds::new("task");
        for (i, task) in self.tasks.iter().enumerate() {
            if task.content.is_empty() {
                errs.push(format!("tasks[{i}].content is required"));
            }
            let key = task.key.as_deref().filter(|k| !k.is_empty());
            if key.is_none() && task.id.as_deref().is_none_or(str::is_empty) {
                errs.push(format!(
                    "tasks[{i}] ({:?}) needs an id or a key",
                    task.content
                ));
            }
            if let Some(key) = key {
                if key.contains(['\n', '\r']) {
                    errs.push(format!("tasks[{i}].key must be a single line"));
                }
                if !keys.insert(key) {
                    errs.push(format!("duplicate task key {key:?}"));
                }
            }
            ids.check(task.id.as_deref(), errs);
            if let Some(priority) = task.priority
                && !(1..=4).contains(&priority)
            {
                errs.push(format!(
                    "tasks[{i}] ({:?}).priority must be between 1 and 4",
                    task.content
                ));
            }
        }
    }

    /// Convert into the reconciler's desired state
    pub fn to_desired(&self) -> DesiredSpec {
        DesiredSpec {
            containers: self
                .projects
                .iter()
                .map(|p| DesiredContainer {
                    name: p.name.clone(),
                    id: p.id.clone(),
                    parent: p.parent.clone(),
                    color: p.color.clone(),
                    is_favorite: p.is_favorite,
                    view_style: p.view_style.clone(),
                })
                .collect(),
            tags: self
                .labels
                .iter()
                .map(|l| DesiredTag {
                    name: l.name.clone(),
                    id: l.id.clone(),
                    color: l.color.clone(),
                    is_favorite: l.is_favorite,
                })
                .collect(),
            saved_queries: self
                .filters
                .iter()
                .map(|f| DesiredSavedQuery {
                    name: f.name.clone(),
                    id: f.id.clone(),
                    query: f.query.clone(),
                    color: f.color.clone(),
                    is_favorite: f.is_favorite,
                    order: f.order,
                })
                .collect(),
            work_items: self
                .tasks
                .iter()
                .map(|t| DesiredWorkItem {
                    key: t.key.clone(),
                    id: t.id.clone(),
                    content: t.content.clone(),
                    description: t.description.clone(),
                    container: t.project.clone(),
                    labels: t.labels.clone(),
                    priority: t.priority,
                    due: t.due.clone(),
                })
                .collect(),
            prune: PruneSpec {
                containers: self.prune.projects,
                tags: self.prune.labels,
                saved_queries: self.prune.filters,
                work_items: self.prune.tasks,
            },
        }
    }
}

/// Tracks explicit ids of one kind
struct UniqueIds<'a> {
    kind: &'static str,
    seen: HashSet<&'a str>,
}

impl<'a> UniqueIds<'a> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            seen: HashSet::new(),
        }
    }

    fn check(&mut self, id: Option<&'a str>, errs: &mut Vec<String>) {
        match id {
            Some("") => errs.push(format!("{} id cannot be empty", self.kind)),
            Some(id) if !self.seen.insert(id) => {
                errs.push(format!("duplicate {} id {id:?}", self.kind));
            }
            _ => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
