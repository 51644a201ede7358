//! Sync endpoint (`/api/v1/sync`): batched commands and filter reads.
//!
//! Commands are submitted as a JSON array in the `commands` form field.
//! The endpoint keeps the legacy command names (`filter_add`,
//! `project_move`, ...).

use crate::client::Client;
use crate::error::Result;
use reconcile::remote::{RemoteResult, RemoteSavedQuery};
use reconcile::{BatchApi, BatchCommand, BatchResponse, Deadline};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const SYNC: &str = "/api/v1/sync";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SyncResponse {
    sync_status: HashMap<String, Value>,
    temp_id_mapping: HashMap<String, String>,
    filters: Vec<Filter>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Filter {
    id: String,
    name: String,
    query: String,
    color: String,
    item_order: i64,
    is_favorite: bool,
    is_deleted: bool,
}

impl From<Filter> for RemoteSavedQuery {
    fn from(f: Filter) -> Self {
        Self {
            id: f.id,
            name: f.name,
            query: f.query,
            color: f.color,
            is_favorite: f.is_favorite,
            item_order: f.item_order,
            is_deleted: f.is_deleted,
        }
    }
}

impl Client {
    /// Full read of the filter resource, soft-deleted entries included.
    pub(crate) fn read_filters(&self, deadline: &Deadline) -> Result<Vec<RemoteSavedQuery>> {
        let form = [
            ("sync_token", "*".to_string()),
            ("resource_types", r#"["filters"]"#.to_string()),
        ];
        let response: SyncResponse = self.http().post_form(SYNC, &form, deadline)?;
        Ok(response.filters.into_iter().map(Into::into).collect())
    }
}

impl BatchApi for Client {
    fn submit(&self, commands: &[BatchCommand], deadline: &Deadline) -> RemoteResult<BatchResponse> {
        let encoded = serde_json::to_string(commands)
            .map_err(|e| crate::Error::Encode(e.to_string()))?;
        let form = [("commands", encoded)];
        let response: SyncResponse = self.http().post_form(SYNC, &form, deadline)?;
        Ok(BatchResponse {
            sync_status: response.sync_status,
            temp_id_mapping: response.temp_id_mapping,
        })
    }

    fn max_batch_size(&self) -> usize {
        self.max_commands()
    }
}
