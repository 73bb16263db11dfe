//! Logical sub-stores, each owning a slice of the [`KVEngine`](crate::kv::KVEngine)
//! keyspace and a uniform `Add`/`Read`/`Delete`/`List` surface.

pub mod app;
pub mod bin;
pub mod contents;
pub mod files;
pub mod history;
pub mod projects_cache;
pub mod revisions;
pub mod shared_index;
pub mod users;

use crate::cursor::{CursorCodec, CursorState};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Options accepted by every `List` method; fields not relevant to a given
/// store are ignored by that store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOptions {
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub since: Option<i64>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub query_field: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize)]
pub struct ListPage<T> {
    pub data: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Decodes `options.cursor` if present, falling back to a fresh state
/// seeded from the request's own fields (first page of a listing).
pub fn resume_or_start(codec: &CursorCodec, options: &ListOptions) -> Result<CursorState> {
    if let Some(token) = &options.cursor {
        return codec.decode(token);
    }
    Ok(CursorState {
        limit: options.limit,
        start: None,
        end: None,
        query: options.query.clone(),
        query_field: options.query_field.clone(),
        parent: options.parent.clone(),
        since: options.since,
        last_key: None,
    })
}

pub fn now_unix_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
