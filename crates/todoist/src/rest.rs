//! Per-entity REST endpoints (`/api/v1/projects`, `/labels`, `/tasks`).
//!
//! Wire types mirror the Todoist JSON and are converted into the
//! reconciler's remote entity types at the boundary.

use crate::client::Client;
use crate::http::escape_segment;
use reconcile::remote::{
    CreateContainer, CreateTag, CreateWorkItem, Page, RemoteContainer, RemoteResult,
    RemoteSavedQuery, RemoteTag, RemoteWorkItem, UpdateContainer, UpdateTag, UpdateWorkItem,
};
use reconcile::{Deadline, RemoteApi};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

const PROJECTS: &str = "/api/v1/projects";
const LABELS: &str = "/api/v1/labels";
const TASKS: &str = "/api/v1/tasks";

/// Treat JSON `null` as the field's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ListResponse<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<T>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Project {
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    color: String,
    #[serde(default, deserialize_with = "null_as_default")]
    is_favorite: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    view_style: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    inbox_project: bool,
}

impl From<Project> for RemoteContainer {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            name: p.name,
            color: p.color,
            is_favorite: p.is_favorite,
            view_style: p.view_style,
            parent_id: p.parent_id.filter(|id| !id.is_empty()),
            is_inbox: p.inbox_project,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Label {
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    color: String,
    #[serde(default, deserialize_with = "null_as_default")]
    is_favorite: bool,
}

impl From<Label> for RemoteTag {
    fn from(l: Label) -> Self {
        Self {
            id: l.id,
            name: l.name,
            color: l.color,
            is_favorite: l.is_favorite,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Due {
    #[serde(default, deserialize_with = "null_as_default")]
    string: String,
}

#[derive(Debug, Default, Deserialize)]
struct Task {
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    project_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    labels: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    priority: i64,
    #[serde(default)]
    due: Option<Due>,
}

impl From<Task> for RemoteWorkItem {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            content: t.content,
            description: t.description,
            container_id: t.project_id,
            labels: t.labels,
            priority: t.priority.clamp(0, i64::from(u8::MAX)) as u8,
            due: t.due.map(|d| d.string).filter(|s| !s.is_empty()),
        }
    }
}

fn no_labels(labels: &&[String]) -> bool {
    labels.is_empty()
}

/// Task create body; the API names the container `project_id` and takes
/// due dates as `due_string`.
#[derive(Debug, Serialize)]
struct CreateTaskBody<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<&'a str>,
    #[serde(skip_serializing_if = "no_labels")]
    labels: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_string: Option<&'a str>,
}

impl<'a> From<&'a CreateWorkItem> for CreateTaskBody<'a> {
    fn from(r: &'a CreateWorkItem) -> Self {
        Self {
            content: &r.content,
            description: r.description.as_deref(),
            project_id: r.container_id.as_deref(),
            labels: &r.labels,
            priority: r.priority,
            due_string: r.due.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct UpdateTaskBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_string: Option<&'a str>,
}

impl<'a> From<&'a UpdateWorkItem> for UpdateTaskBody<'a> {
    fn from(r: &'a UpdateWorkItem) -> Self {
        Self {
            content: r.content.as_deref(),
            description: r.description.as_deref(),
            labels: r.labels.as_deref(),
            priority: r.priority,
            due_string: r.due.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MoveTaskBody<'a> {
    project_id: &'a str,
}

// =============================================================================
// RemoteApi
// =============================================================================

fn entity_path(base: &str, id: &str) -> String {
    format!("{base}/{}", escape_segment(id))
}

impl Client {
    fn list_page<W, T>(
        &self,
        path: &str,
        cursor: Option<&str>,
        deadline: &Deadline,
    ) -> RemoteResult<Page<T>>
    where
        W: DeserializeOwned + Into<T>,
    {
        let query: Vec<(&str, &str)> = cursor
            .filter(|c| !c.is_empty())
            .map(|c| ("cursor", c))
            .into_iter()
            .collect();
        let response: ListResponse<W> = self.http().get_json(path, &query, deadline)?;
        Ok(Page {
            results: response.results.into_iter().map(Into::into).collect(),
            next_cursor: response.next_cursor,
        })
    }
}

impl RemoteApi for Client {
    fn list_containers(
        &self,
        cursor: Option<&str>,
        deadline: &Deadline,
    ) -> RemoteResult<Page<RemoteContainer>> {
        self.list_page::<Project, _>(PROJECTS, cursor, deadline)
    }

    fn list_tags(&self, cursor: Option<&str>, deadline: &Deadline) -> RemoteResult<Page<RemoteTag>> {
        self.list_page::<Label, _>(LABELS, cursor, deadline)
    }

    fn list_work_items(
        &self,
        cursor: Option<&str>,
        deadline: &Deadline,
    ) -> RemoteResult<Page<RemoteWorkItem>> {
        self.list_page::<Task, _>(TASKS, cursor, deadline)
    }

    fn list_saved_queries(&self, deadline: &Deadline) -> RemoteResult<Vec<RemoteSavedQuery>> {
        Ok(self.read_filters(deadline)?)
    }

    fn create_container(
        &self,
        request: &CreateContainer,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteContainer> {
        let project: Project = self.http().post_json(PROJECTS, request, deadline)?;
        Ok(project.into())
    }

    fn update_container(
        &self,
        id: &str,
        request: &UpdateContainer,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteContainer> {
        let project: Project = self
            .http()
            .post_json(&entity_path(PROJECTS, id), request, deadline)?;
        Ok(project.into())
    }

    fn delete_container(&self, id: &str, deadline: &Deadline) -> RemoteResult<()> {
        Ok(self.http().delete(&entity_path(PROJECTS, id), deadline)?)
    }

    fn create_tag(&self, request: &CreateTag, deadline: &Deadline) -> RemoteResult<RemoteTag> {
        let label: Label = self.http().post_json(LABELS, request, deadline)?;
        Ok(label.into())
    }

    fn update_tag(
        &self,
        id: &str,
        request: &UpdateTag,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteTag> {
        let label: Label = self
            .http()
            .post_json(&entity_path(LABELS, id), request, deadline)?;
        Ok(label.into())
    }

    fn delete_tag(&self, id: &str, deadline: &Deadline) -> RemoteResult<()> {
        Ok(self.http().delete(&entity_path(LABELS, id), deadline)?)
    }

    fn create_work_item(
        &self,
        request: &CreateWorkItem,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteWorkItem> {
        let body = CreateTaskBody::from(request);
        let task: Task = self.http().post_json(TASKS, &body, deadline)?;
        Ok(task.into())
    }

    fn update_work_item(
        &self,
        id: &str,
        request: &UpdateWorkItem,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteWorkItem> {
        let body = UpdateTaskBody::from(request);
        let task: Task = self
            .http()
            .post_json(&entity_path(TASKS, id), &body, deadline)?;
        Ok(task.into())
    }

    fn move_work_item(
        &self,
        id: &str,
        container_id: &str,
        deadline: &Deadline,
    ) -> RemoteResult<()> {
        let path = format!("{}/move", entity_path(TASKS, id));
        let body = MoveTaskBody {
            project_id: container_id,
        };
        Ok(self.http().post_json_discard(&path, &body, deadline)?)
    }

    fn delete_work_item(&self, id: &str, deadline: &Deadline) -> RemoteResult<()> {
        Ok(self.http().delete(&entity_path(TASKS, id), deadline)?)
    }
}
