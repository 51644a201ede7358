//! In-memory remote for tests and dry runs.
//!
//! [`MockRemote`] implements both [`RemoteApi`] and [`BatchApi`] over shared
//! state. Listings are paged, batch submissions are bounded by a
//! configurable limit, and failures can be injected per method or per
//! batch command type.
//!
//! ```
//! use reconcile::mock::MockRemote;
//! use reconcile::remote::{RemoteApi, RemoteContainer};
//! use reconcile::Deadline;
//!
//! let mock = MockRemote::new();
//! mock.add_container(RemoteContainer {
//!     id: "P1".to_string(),
//!     name: "Work".to_string(),
//!     ..Default::default()
//! });
//!
//! let page = mock.list_containers(None, &Deadline::none()).unwrap();
//! assert_eq!(page.results.len(), 1);
//! ```

use crate::deadline::Deadline;
use crate::remote::{
    BatchApi, BatchCommand, BatchResponse, CreateContainer, CreateTag, CreateWorkItem,
    DEFAULT_MAX_BATCH_SIZE, Page, RemoteApi, RemoteContainer, RemoteError, RemoteResult,
    RemoteSavedQuery, RemoteTag, RemoteWorkItem, UpdateContainer, UpdateTag, UpdateWorkItem,
};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

const DEFAULT_PAGE_SIZE: usize = 200;

#[derive(Debug, Default)]
struct State {
    containers: Vec<RemoteContainer>,
    tags: Vec<RemoteTag>,
    saved_queries: Vec<RemoteSavedQuery>,
    work_items: Vec<RemoteWorkItem>,
    next_id: u64,
    calls: Vec<String>,
    failures: HashMap<String, RemoteError>,
    rejected_commands: HashSet<String>,
    submissions: Vec<Vec<BatchCommand>>,
}

impl State {
    /// Next counter id not already held by a seeded or created entity
    fn new_id(&mut self, prefix: &str) -> String {
        loop {
            self.next_id += 1;
            let id = format!("{prefix}{}", self.next_id);
            if !self.id_taken(&id) {
                return id;
            }
        }
    }

    fn id_taken(&self, id: &str) -> bool {
        self.containers.iter().any(|c| c.id == id)
            || self.tags.iter().any(|t| t.id == id)
            || self.saved_queries.iter().any(|q| q.id == id)
            || self.work_items.iter().any(|t| t.id == id)
    }

    fn has_container(&self, id: &str) -> bool {
        self.containers.iter().any(|c| c.id == id)
    }

    fn container_mut(&mut self, id: &str) -> RemoteResult<&mut RemoteContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found("project", id))
    }

    fn tag_mut(&mut self, id: &str) -> RemoteResult<&mut RemoteTag> {
        self.tags
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found("label", id))
    }

    fn work_item_mut(&mut self, id: &str) -> RemoteResult<&mut RemoteWorkItem> {
        self.work_items
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found("task", id))
    }

    fn saved_query_mut(&mut self, id: &str) -> Result<&mut RemoteSavedQuery, String> {
        self.saved_queries
            .iter_mut()
            .find(|q| q.id == id && !q.is_deleted)
            .ok_or_else(|| format!("filter {id} not found"))
    }
}

fn not_found(what: &str, id: &str) -> RemoteError {
    RemoteError::http(404, format!("{what} {id} not found"))
}

fn page<T: Clone>(items: &[T], cursor: Option<&str>, size: usize) -> RemoteResult<Page<T>> {
    let start = match cursor {
        None => 0,
        Some(c) => c
            .parse::<usize>()
            .map_err(|_| RemoteError::http(400, format!("invalid cursor {c:?}")))?,
    };
    let end = start.saturating_add(size).min(items.len());
    let results = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    let next_cursor = (end < items.len()).then(|| end.to_string());
    Ok(Page {
        results,
        next_cursor,
    })
}

fn arg_str(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn arg_bool(args: &Map<String, Value>, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

fn arg_i64(args: &Map<String, Value>, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

/// In-memory remote service.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect another.
#[derive(Debug, Clone)]
pub struct MockRemote {
    state: Arc<Mutex<State>>,
    page_size: usize,
    batch_limit: usize,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            page_size: DEFAULT_PAGE_SIZE,
            batch_limit: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl MockRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities per listing page
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Commands accepted per batch submission
    #[must_use]
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Record a call and apply any injected failure
    fn enter(&self, method: &str, deadline: &Deadline) -> RemoteResult<MutexGuard<'_, State>> {
        deadline.check()?;
        let mut state = self.lock();
        state.calls.push(method.to_string());
        if let Some(err) = state.failures.get(method) {
            return Err(err.clone());
        }
        Ok(state)
    }

    pub fn add_container(&self, container: RemoteContainer) {
        self.lock().containers.push(container);
    }

    pub fn add_tag(&self, tag: RemoteTag) {
        self.lock().tags.push(tag);
    }

    pub fn add_saved_query(&self, query: RemoteSavedQuery) {
        self.lock().saved_queries.push(query);
    }

    pub fn add_work_item(&self, item: RemoteWorkItem) {
        self.lock().work_items.push(item);
    }

    pub fn containers(&self) -> Vec<RemoteContainer> {
        self.lock().containers.clone()
    }

    pub fn tags(&self) -> Vec<RemoteTag> {
        self.lock().tags.clone()
    }

    /// Saved queries, soft-deleted ones included
    pub fn saved_queries(&self) -> Vec<RemoteSavedQuery> {
        self.lock().saved_queries.clone()
    }

    pub fn work_items(&self) -> Vec<RemoteWorkItem> {
        self.lock().work_items.clone()
    }

    /// Make every call to `method` fail with an HTTP 500
    pub fn fail_on(&self, method: &str) {
        self.fail_with(method, RemoteError::http(500, "injected failure"));
    }

    pub fn fail_with(&self, method: &str, err: RemoteError) {
        self.lock().failures.insert(method.to_string(), err);
    }

    /// Drop every injected failure and command rejection
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failures.clear();
        state.rejected_commands.clear();
    }

    /// Report an error status for every batch command of this type
    pub fn reject_command(&self, command_type: &str) {
        self.lock()
            .rejected_commands
            .insert(command_type.to_string());
    }

    /// Method names in call order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == method).count()
    }

    /// Every batch submission received, in order
    pub fn submissions(&self) -> Vec<Vec<BatchCommand>> {
        self.lock().submissions.clone()
    }
}

impl RemoteApi for MockRemote {
    fn list_containers(
        &self,
        cursor: Option<&str>,
        deadline: &Deadline,
    ) -> RemoteResult<Page<RemoteContainer>> {
        let state = self.enter("list_containers", deadline)?;
        page(&state.containers, cursor, self.page_size)
    }

    fn list_tags(&self, cursor: Option<&str>, deadline: &Deadline) -> RemoteResult<Page<RemoteTag>> {
        let state = self.enter("list_tags", deadline)?;
        page(&state.tags, cursor, self.page_size)
    }

    fn list_work_items(
        &self,
        cursor: Option<&str>,
        deadline: &Deadline,
    ) -> RemoteResult<Page<RemoteWorkItem>> {
        let state = self.enter("list_work_items", deadline)?;
        page(&state.work_items, cursor, self.page_size)
    }

    fn list_saved_queries(&self, deadline: &Deadline) -> RemoteResult<Vec<RemoteSavedQuery>> {
        let state = self.enter("list_saved_queries", deadline)?;
        Ok(state.saved_queries.clone())
    }

    fn create_container(
        &self,
        request: &CreateContainer,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteContainer> {
        let mut state = self.enter("create_container", deadline)?;
        if let Some(parent) = request.parent_id.as_deref() {
            if !state.has_container(parent) {
                return Err(not_found("parent project", parent));
            }
        }
        let container = RemoteContainer {
            id: state.new_id("P"),
            name: request.name.clone(),
            color: request.color.clone().unwrap_or_else(|| "charcoal".to_string()),
            is_favorite: request.is_favorite.unwrap_or(false),
            view_style: request.view_style.clone().unwrap_or_else(|| "list".to_string()),
            parent_id: request.parent_id.clone(),
            is_inbox: false,
        };
        state.containers.push(container.clone());
        Ok(container)
    }

    fn update_container(
        &self,
        id: &str,
        request: &UpdateContainer,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteContainer> {
        let mut state = self.enter("update_container", deadline)?;
        let container = state.container_mut(id)?;
        if let Some(name) = &request.name {
            container.name.clone_from(name);
        }
        if let Some(color) = &request.color {
            container.color.clone_from(color);
        }
        if let Some(fav) = request.is_favorite {
            container.is_favorite = fav;
        }
        if let Some(style) = &request.view_style {
            container.view_style.clone_from(style);
        }
        Ok(container.clone())
    }

    fn delete_container(&self, id: &str, deadline: &Deadline) -> RemoteResult<()> {
        let mut state = self.enter("delete_container", deadline)?;
        let pos = state
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| not_found("project", id))?;
        if state.containers[pos].is_inbox {
            return Err(RemoteError::http(400, "inbox project cannot be deleted"));
        }
        if state
            .containers
            .iter()
            .any(|c| c.parent_id.as_deref() == Some(id))
        {
            return Err(RemoteError::http(400, format!("project {id} still has children")));
        }
        state.containers.remove(pos);
        Ok(())
    }

    fn create_tag(&self, request: &CreateTag, deadline: &Deadline) -> RemoteResult<RemoteTag> {
        let mut state = self.enter("create_tag", deadline)?;
        let tag = RemoteTag {
            id: state.new_id("L"),
            name: request.name.clone(),
            color: request.color.clone().unwrap_or_else(|| "charcoal".to_string()),
            is_favorite: request.is_favorite.unwrap_or(false),
        };
        state.tags.push(tag.clone());
        Ok(tag)
    }

    fn update_tag(&self, id: &str, request: &UpdateTag, deadline: &Deadline) -> RemoteResult<RemoteTag> {
        let mut state = self.enter("update_tag", deadline)?;
        let tag = state.tag_mut(id)?;
        if let Some(name) = &request.name {
            tag.name.clone_from(name);
        }
        if let Some(color) = &request.color {
            tag.color.clone_from(color);
        }
        if let Some(fav) = request.is_favorite {
            tag.is_favorite = fav;
        }
        Ok(tag.clone())
    }

    fn delete_tag(&self, id: &str, deadline: &Deadline) -> RemoteResult<()> {
        let mut state = self.enter("delete_tag", deadline)?;
        let before = state.tags.len();
        state.tags.retain(|t| t.id != id);
        if state.tags.len() == before {
            return Err(not_found("label", id));
        }
        Ok(())
    }

    fn create_work_item(
        &self,
        request: &CreateWorkItem,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteWorkItem> {
        let mut state = self.enter("create_work_item", deadline)?;
        let container_id = match request.container_id.as_deref() {
            Some(id) if !state.has_container(id) => return Err(not_found("project", id)),
            Some(id) => id.to_string(),
            None => state
                .containers
                .iter()
                .find(|c| c.is_inbox)
                .map(|c| c.id.clone())
                .unwrap_or_default(),
        };
        let item = RemoteWorkItem {
            id: state.new_id("T"),
            content: request.content.clone(),
            description: request.description.clone().unwrap_or_default(),
            container_id,
            labels: request.labels.clone(),
            priority: request.priority.unwrap_or(1),
            due: request.due.clone(),
        };
        state.work_items.push(item.clone());
        Ok(item)
    }

    fn update_work_item(
        &self,
        id: &str,
        request: &UpdateWorkItem,
        deadline: &Deadline,
    ) -> RemoteResult<RemoteWorkItem> {
        let mut state = self.enter("update_work_item", deadline)?;
        let item = state.work_item_mut(id)?;
        if let Some(content) = &request.content {
            item.content.clone_from(content);
        }
        if let Some(description) = &request.description {
            item.description.clone_from(description);
        }
        if let Some(labels) = &request.labels {
            item.labels.clone_from(labels);
        }
        if let Some(priority) = request.priority {
            item.priority = priority;
        }
        if let Some(due) = &request.due {
            item.due = Some(due.clone());
        }
        Ok(item.clone())
    }

    fn move_work_item(&self, id: &str, container_id: &str, deadline: &Deadline) -> RemoteResult<()> {
        let mut state = self.enter("move_work_item", deadline)?;
        if !state.has_container(container_id) {
            return Err(not_found("project", container_id));
        }
        state.work_item_mut(id)?.container_id = container_id.to_string();
        Ok(())
    }

    fn delete_work_item(&self, id: &str, deadline: &Deadline) -> RemoteResult<()> {
        let mut state = self.enter("delete_work_item", deadline)?;
        let before = state.work_items.len();
        state.work_items.retain(|t| t.id != id);
        if state.work_items.len() == before {
            return Err(not_found("task", id));
        }
        Ok(())
    }
}

/// Apply one batch command, returning the id it created, if any
fn apply_command(state: &mut State, cmd: &BatchCommand) -> Result<Option<String>, String> {
    let args = &cmd.args;
    let id = || arg_str(args, "id").ok_or_else(|| "missing id".to_string());

    match cmd.command_type.as_str() {
        "project_move" => {
            let id = id()?;
            let parent = match args.get("parent_id") {
                None | Some(Value::Null) => None,
                Some(Value::String(p)) if state.has_container(p) => Some(p.clone()),
                Some(other) => return Err(format!("parent {other} not found")),
            };
            let container = state.container_mut(&id).map_err(|e| e.to_string())?;
            container.parent_id = parent;
            Ok(None)
        }
        "filter_add" => {
            let name = arg_str(args, "name").ok_or("missing name")?;
            let query = arg_str(args, "query").ok_or("missing query")?;
            let order = arg_i64(args, "item_order")
                .unwrap_or_else(|| state.saved_queries.len() as i64 + 1);
            let query = RemoteSavedQuery {
                id: state.new_id("F"),
                name,
                query,
                color: arg_str(args, "color").unwrap_or_else(|| "charcoal".to_string()),
                is_favorite: arg_bool(args, "is_favorite").unwrap_or(false),
                item_order: order,
                is_deleted: false,
            };
            let id = query.id.clone();
            state.saved_queries.push(query);
            Ok(Some(id))
        }
        "filter_update" => {
            let id = id()?;
            let query = state.saved_query_mut(&id)?;
            if let Some(name) = arg_str(args, "name") {
                query.name = name;
            }
            if let Some(text) = arg_str(args, "query") {
                query.query = text;
            }
            if let Some(color) = arg_str(args, "color") {
                query.color = color;
            }
            if let Some(fav) = arg_bool(args, "is_favorite") {
                query.is_favorite = fav;
            }
            if let Some(order) = arg_i64(args, "item_order") {
                query.item_order = order;
            }
            Ok(None)
        }
        "filter_delete" => {
            let id = id()?;
            state.saved_query_mut(&id)?.is_deleted = true;
            Ok(None)
        }
        "filter_update_orders" => {
            let mapping = args
                .get("id_order_mapping")
                .and_then(Value::as_object)
                .ok_or("missing id_order_mapping")?;
            for (id, order) in mapping {
                let order = order.as_i64().ok_or_else(|| format!("bad order for {id}"))?;
                state.saved_query_mut(id)?.item_order = order;
            }
            Ok(None)
        }
        other => Err(format!("unknown command type {other}")),
    }
}

impl BatchApi for MockRemote {
    fn submit(&self, commands: &[BatchCommand], deadline: &Deadline) -> RemoteResult<BatchResponse> {
        let mut state = self.enter("submit", deadline)?;
        if commands.len() > self.batch_limit {
            return Err(RemoteError::http(
                400,
                format!("too many commands: {} > {}", commands.len(), self.batch_limit),
            ));
        }
        state.submissions.push(commands.to_vec());

        let mut response = BatchResponse::default();
        for cmd in commands {
            let outcome = if state.rejected_commands.contains(&cmd.command_type) {
                Err("rejected".to_string())
            } else {
                apply_command(&mut state, cmd)
            };
            let status = match outcome {
                Ok(created) => {
                    if let (Some(temp), Some(real)) = (&cmd.temp_id, created) {
                        response.temp_id_mapping.insert(temp.clone(), real);
                    }
                    json!("ok")
                }
                Err(error) => json!({ "error": error, "error_code": 20 }),
            };
            response.sync_status.insert(cmd.uuid.clone(), status);
        }
        Ok(response)
    }

    fn max_batch_size(&self) -> usize {
        self.batch_limit
    }
}
