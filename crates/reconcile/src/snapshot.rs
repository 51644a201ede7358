//! Snapshot builder and identity resolver.
//!
//! A [`Snapshot`] is an immutable capture of remote state for one run,
//! indexed by id (exact) and by name (one-to-many, since the remote side
//! does not enforce name uniqueness). Name lookups surface ambiguity as an
//! error instead of picking a candidate.

use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::managed_key;
use crate::remote::{
    Page, RemoteApi, RemoteContainer, RemoteResult, RemoteSavedQuery, RemoteTag, RemoteWorkItem,
};
use crate::types::Kind;
use std::collections::HashMap;

/// Id and name indexes over one entity list
#[derive(Debug, Default)]
struct Index {
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl Index {
    fn build<T>(
        kind: Kind,
        items: &[T],
        id: impl Fn(&T) -> &str,
        name: impl Fn(&T) -> &str,
    ) -> Result<Self> {
        let mut index = Self::default();
        for (pos, item) in items.iter().enumerate() {
            if index.by_id.insert(id(item).to_string(), pos).is_some() {
                return Err(Error::DuplicateRemoteId {
                    kind,
                    id: id(item).to_string(),
                });
            }
            index
                .by_name
                .entry(name(item).to_string())
                .or_default()
                .push(pos);
        }
        Ok(index)
    }

    fn by_id<'a, T>(&self, items: &'a [T], id: &str) -> Option<&'a T> {
        self.by_id.get(id).map(|&pos| &items[pos])
    }

    fn by_name<'a, T>(
        &self,
        kind: Kind,
        items: &'a [T],
        name: &str,
        id: impl Fn(&T) -> &str,
    ) -> Result<Option<&'a T>> {
        match self.by_name.get(name).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([pos]) => Ok(Some(&items[*pos])),
            Some(positions) => {
                let mut ids: Vec<String> = positions
                    .iter()
                    .map(|&pos| id(&items[pos]).to_string())
                    .collect();
                ids.sort();
                Err(Error::Ambiguous {
                    kind,
                    name: name.to_string(),
                    ids,
                })
            }
        }
    }
}

/// Immutable per-run capture of remote state
#[derive(Debug)]
pub struct Snapshot {
    /// Sorted by name
    pub containers: Vec<RemoteContainer>,
    /// Sorted by name
    pub tags: Vec<RemoteTag>,
    /// Sorted by name, soft-deleted entries dropped
    pub saved_queries: Vec<RemoteSavedQuery>,
    /// Sorted by content
    pub work_items: Vec<RemoteWorkItem>,

    containers_idx: Index,
    tags_idx: Index,
    saved_queries_idx: Index,
    work_items_by_id: HashMap<String, usize>,
    work_items_by_key: HashMap<String, usize>,
}

impl Snapshot {
    /// Index already-fetched remote lists
    pub fn from_parts(
        mut containers: Vec<RemoteContainer>,
        mut tags: Vec<RemoteTag>,
        saved_queries: Vec<RemoteSavedQuery>,
        mut work_items: Vec<RemoteWorkItem>,
    ) -> Result<Self> {
        let mut saved_queries: Vec<RemoteSavedQuery> =
            saved_queries.into_iter().filter(|q| !q.is_deleted).collect();

        // Stable display order only; lookups go through the indexes.
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        saved_queries.sort_by(|a, b| a.name.cmp(&b.name));
        work_items.sort_by(|a, b| a.content.cmp(&b.content));

        let containers_idx = Index::build(Kind::Container, &containers, |c| &c.id, |c| &c.name)?;
        let tags_idx = Index::build(Kind::Tag, &tags, |t| &t.id, |t| &t.name)?;
        let saved_queries_idx =
            Index::build(Kind::SavedQuery, &saved_queries, |q| &q.id, |q| &q.name)?;

        let mut work_items_by_id = HashMap::new();
        let mut work_items_by_key: HashMap<String, usize> = HashMap::new();
        for (pos, item) in work_items.iter().enumerate() {
            if work_items_by_id.insert(item.id.clone(), pos).is_some() {
                return Err(Error::DuplicateRemoteId {
                    kind: Kind::WorkItem,
                    id: item.id.clone(),
                });
            }
            if let Some(key) = managed_key::extract(&item.description) {
                if let Some(&first) = work_items_by_key.get(key) {
                    return Err(Error::DuplicateManagedKey {
                        key: key.to_string(),
                        first: work_items[first].id.clone(),
                        second: item.id.clone(),
                    });
                }
                work_items_by_key.insert(key.to_string(), pos);
            }
        }

        Ok(Self {
            containers,
            tags,
            saved_queries,
            work_items,
            containers_idx,
            tags_idx,
            saved_queries_idx,
            work_items_by_id,
            work_items_by_key,
        })
    }

    pub fn empty() -> Self {
        Self {
            containers: Vec::new(),
            tags: Vec::new(),
            saved_queries: Vec::new(),
            work_items: Vec::new(),
            containers_idx: Index::default(),
            tags_idx: Index::default(),
            saved_queries_idx: Index::default(),
            work_items_by_id: HashMap::new(),
            work_items_by_key: HashMap::new(),
        }
    }

    pub fn container_by_id(&self, id: &str) -> Option<&RemoteContainer> {
        self.containers_idx.by_id(&self.containers, id)
    }

    /// Resolve a container by name; several matches is an error
    pub fn container_by_name(&self, name: &str) -> Result<Option<&RemoteContainer>> {
        self.containers_idx
            .by_name(Kind::Container, &self.containers, name, |c| &c.id)
    }

    pub fn tag_by_id(&self, id: &str) -> Option<&RemoteTag> {
        self.tags_idx.by_id(&self.tags, id)
    }

    pub fn tag_by_name(&self, name: &str) -> Result<Option<&RemoteTag>> {
        self.tags_idx.by_name(Kind::Tag, &self.tags, name, |t| &t.id)
    }

    pub fn saved_query_by_id(&self, id: &str) -> Option<&RemoteSavedQuery> {
        self.saved_queries_idx.by_id(&self.saved_queries, id)
    }

    pub fn saved_query_by_name(&self, name: &str) -> Result<Option<&RemoteSavedQuery>> {
        self.saved_queries_idx
            .by_name(Kind::SavedQuery, &self.saved_queries, name, |q| &q.id)
    }

    pub fn work_item_by_id(&self, id: &str) -> Option<&RemoteWorkItem> {
        self.work_items_by_id.get(id).map(|&pos| &self.work_items[pos])
    }

    pub fn work_item_by_key(&self, key: &str) -> Option<&RemoteWorkItem> {
        self.work_items_by_key
            .get(key)
            .map(|&pos| &self.work_items[pos])
    }

    pub fn container_name_by_id(&self, id: &str) -> Option<&str> {
        self.container_by_id(id).map(|c| c.name.as_str())
    }

    /// Parent of a remote container rendered by name.
    ///
    /// Empty for root containers; the raw id when the parent is unknown.
    pub fn parent_name(&self, container: &RemoteContainer) -> String {
        match container.parent_id.as_deref() {
            None | Some("") => String::new(),
            Some(id) => self
                .container_name_by_id(id)
                .unwrap_or(id)
                .to_string(),
        }
    }

    /// Container name of a remote work item, falling back to the raw id
    pub fn work_item_container_name(&self, item: &RemoteWorkItem) -> String {
        if item.container_id.is_empty() {
            return String::new();
        }
        self.container_name_by_id(&item.container_id)
            .unwrap_or(&item.container_id)
            .to_string()
    }
}

/// Fetch every page of one listing
fn fetch_all<T>(
    what: &'static str,
    deadline: &Deadline,
    mut list: impl FnMut(Option<&str>) -> RemoteResult<Page<T>>,
) -> Result<Vec<T>> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        deadline
            .check()
            .map_err(|source| Error::Fetch { what, source })?;
        let page = list(cursor.as_deref()).map_err(|source| Error::Fetch { what, source })?;
        let next = page.continuation().map(str::to_string);
        all.extend(page.results);
        match next {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }
    Ok(all)
}

/// Fetch and index the full remote state.
///
/// Pages every listing until exhausted and drops soft-deleted saved
/// queries. Fails if the remote ever reports two entities sharing an id.
pub fn build_snapshot(api: &dyn RemoteApi, deadline: &Deadline) -> Result<Snapshot> {
    let containers = fetch_all("containers", deadline, |cursor| {
        api.list_containers(cursor, deadline)
    })?;
    let tags = fetch_all("tags", deadline, |cursor| api.list_tags(cursor, deadline))?;
    let work_items = fetch_all("work items", deadline, |cursor| {
        api.list_work_items(cursor, deadline)
    })?;
    deadline.check().map_err(|source| Error::Fetch {
        what: "saved queries",
        source,
    })?;
    let saved_queries = api
        .list_saved_queries(deadline)
        .map_err(|source| Error::Fetch {
            what: "saved queries",
            source,
        })?;

    let snapshot = Snapshot::from_parts(containers, tags, saved_queries, work_items)?;
    log::debug!(
        "snapshot: {} containers, {} tags, {} saved queries, {} work items ({} managed)",
        snapshot.containers.len(),
        snapshot.tags.len(),
        snapshot.saved_queries.len(),
        snapshot.work_items.len(),
        snapshot.work_items_by_key.len()
    );
    Ok(snapshot)
}
