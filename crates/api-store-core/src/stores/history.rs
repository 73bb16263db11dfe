//! Request/response history. Writes land a single data record plus one
//! index record per populated scope (space/project/request/app) in one
//! atomic batch, so each listing type scans a narrow key range instead of
//! the whole history table.

use crate::cursor::CursorCodec;
use crate::error::{ApiError, Result};
use crate::key_codec;
use crate::kv::{BatchOp, KVEngine};
use crate::model::{HistoryEntry, HistoryType};
use crate::stores::{resume_or_start, ListOptions, ListPage};
use serde_json::Value;
use std::sync::Arc;

const DATA_NAMESPACE: &str = "history~data";
const SPACE_NAMESPACE: &str = "history~space";
const PROJECT_NAMESPACE: &str = "history~project";
const REQUEST_NAMESPACE: &str = "history~request";
const APP_NAMESPACE: &str = "history~app";

fn index_namespace(t: HistoryType) -> Option<&'static str> {
    match t {
        HistoryType::User => None,
        HistoryType::Space => Some(SPACE_NAMESPACE),
        HistoryType::Project => Some(PROJECT_NAMESPACE),
        HistoryType::Request => Some(REQUEST_NAMESPACE),
        HistoryType::App => Some(APP_NAMESPACE),
    }
}

pub struct History {
    kv: Arc<KVEngine>,
    cursor: Arc<CursorCodec>,
}

impl History {
    pub fn new(kv: Arc<KVEngine>, cursor: Arc<CursorCodec>) -> Self {
        Self { kv, cursor }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &self,
        user: &str,
        log: Value,
        space: Option<&str>,
        project: Option<&str>,
        request: Option<&str>,
        app: Option<&str>,
    ) -> Result<HistoryEntry> {
        let now = chrono::Utc::now();
        let time = now.to_rfc3339();
        let data_key = key_codec::history_data_key(&time, user)?;
        let entry = HistoryEntry {
            key: data_key.clone(),
            user: user.to_string(),
            created: now.timestamp_millis(),
            log,
            space: space.map(str::to_string),
            project: project.map(str::to_string),
            request: request.map(str::to_string),
            app: app.map(str::to_string),
        };

        let mut ops = vec![BatchOp::put(
            DATA_NAMESPACE,
            data_key.as_bytes().to_vec(),
            serde_json::to_vec(&entry)?,
        )];
        for (owner_id, htype, ns) in [
            (space, HistoryType::Space, SPACE_NAMESPACE),
            (project, HistoryType::Project, PROJECT_NAMESPACE),
            (request, HistoryType::Request, REQUEST_NAMESPACE),
            (app, HistoryType::App, APP_NAMESPACE),
        ] {
            if let Some(owner_id) = owner_id {
                let index_key = key_codec::history_index_key(htype.as_str(), owner_id, &time, user)?;
                ops.push(BatchOp::put(ns, index_key.as_bytes().to_vec(), data_key.as_bytes().to_vec()));
            }
        }
        self.kv.batch(ops)?;
        Ok(entry)
    }

    /// `id` names the user for `type=user`, or the owning space/project/
    /// request/app key otherwise. Cursor resumes just past the last index
    /// key visited on the prior page.
    pub fn list(&self, history_type: HistoryType, id: Option<&str>, options: &ListOptions) -> Result<ListPage<HistoryEntry>> {
        let state = resume_or_start(&self.cursor, options)?;
        let limit = if state.limit == 0 { 50 } else { state.limit };

        let index_rows: Vec<(String, String)> = match history_type {
            HistoryType::User => {
                let user = id.ok_or_else(|| ApiError::InvalidInput("type=user requires id".to_string()))?;
                self.kv
                    .range_asc(DATA_NAMESPACE, None, None, usize::MAX)?
                    .into_iter()
                    .map(|(k, _)| String::from_utf8_lossy(&k).into_owned())
                    .filter(|key| key_codec::parse(key).get(1).map(String::as_str) == Some(user))
                    .map(|key| (key.clone(), key))
                    .collect()
            }
            other => {
                let owner_id = id.ok_or_else(|| ApiError::InvalidInput(format!("type={} requires id", other.as_str())))?;
                let ns = index_namespace(other).expect("non-user history type has an index namespace");
                let prefix = key_codec::form(&[other.as_str(), owner_id])?;
                let start = format!("{prefix}~");
                let end = format!("{prefix}~~");
                self.kv
                    .range_asc(ns, Some(start.as_bytes()), Some(end.as_bytes()), usize::MAX)?
                    .into_iter()
                    .map(|(k, v)| (String::from_utf8_lossy(&k).into_owned(), String::from_utf8_lossy(&v).into_owned()))
                    .collect()
            }
        };

        let mut filtered: Vec<(String, String)> = index_rows
            .into_iter()
            .filter(|(index_key, _)| match &state.last_key {
                Some(last) => index_key.as_str() > last.as_str(),
                None => true,
            })
            .collect();
        filtered.sort_by(|a, b| a.0.cmp(&b.0));
        filtered.truncate(limit);

        let mut data = Vec::with_capacity(filtered.len());
        for (_, data_key) in &filtered {
            if let Some(bytes) = self.kv.get(DATA_NAMESPACE, data_key.as_bytes())? {
                data.push(serde_json::from_slice::<HistoryEntry>(&bytes)?);
            }
        }

        let cursor = match filtered.last() {
            Some((last_index_key, _)) if data.len() == limit => {
                let mut next = state.clone();
                next.last_key = Some(last_index_key.clone());
                Some(self.cursor.encode(&next)?)
            }
            _ => None,
        };
        Ok(ListPage { data, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (History, tempfile::TempDir) {
        let (kv, dir) = KVEngine::open_temp();
        let history = History::new(Arc::new(kv), Arc::new(CursorCodec::new(b"history-test-secret")));
        (history, dir)
    }

    #[test]
    fn indexes_by_space_and_user() {
        let (history, _dir) = store();
        history.add("u1", json!({"method": "GET"}), Some("S1"), None, None, None).unwrap();
        history.add("u1", json!({"method": "POST"}), Some("S1"), None, None, None).unwrap();
        history.add("u2", json!({"method": "GET"}), Some("S2"), None, None, None).unwrap();

        let by_space = history.list(HistoryType::Space, Some("S1"), &ListOptions::default()).unwrap();
        assert_eq!(by_space.data.len(), 2);

        let by_user = history.list(HistoryType::User, Some("u1"), &ListOptions::default()).unwrap();
        assert_eq!(by_user.data.len(), 2);
        assert!(by_user.data.iter().all(|e| e.user == "u1"));
    }

    #[test]
    fn paginates_across_three_pages() {
        let (history, _dir) = store();
        for i in 0..60 {
            history.add("u1", json!({"i": i}), None, Some("P1"), None, None).unwrap();
            std::thread::sleep(std::time::Duration::from_micros(200));
        }

        let mut seen = std::collections::HashSet::new();
        let mut options = ListOptions { limit: 25, ..Default::default() };
        for _ in 0..2 {
            let page = history.list(HistoryType::Project, Some("P1"), &options).unwrap();
            assert_eq!(page.data.len(), 25);
            for entry in &page.data {
                seen.insert(entry.key.clone());
            }
            options = ListOptions { cursor: page.cursor, limit: 25, ..Default::default() };
        }
        let last_page = history.list(HistoryType::Project, Some("P1"), &options).unwrap();
        assert_eq!(last_page.data.len(), 10);
        assert!(last_page.cursor.is_none());
        for entry in &last_page.data {
            seen.insert(entry.key.clone());
        }
        assert_eq!(seen.len(), 60);
    }
}
