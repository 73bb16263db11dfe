//! The HTTP project document, stored separately from its File metadata and
//! retrieved via `GET /files/:id?alt=media`.

use crate::error::{ApiError, Result};
use crate::events::{EventBus, NotifyFilter};
use crate::kv::KVEngine;
use crate::model::{Event, EventOperation, ProjectContents};
use crate::patch::{apply_with_inverse, check_immutable, ops_to_value, parse_patch};
use crate::stores::bin::Bin;
use crate::stores::revisions::Revisions;
use serde_json::Value;
use std::sync::Arc;

const NAMESPACE: &str = "projects";
const IMMUTABLE_PATHS: &[&str] = &["/key", "/kind", "/_deleted"];

pub struct ProjectContentsStore {
    kv: Arc<KVEngine>,
    events: Arc<EventBus>,
    revisions: Arc<Revisions>,
    bin: Arc<Bin>,
}

impl ProjectContentsStore {
    pub fn new(kv: Arc<KVEngine>, events: Arc<EventBus>, revisions: Arc<Revisions>, bin: Arc<Bin>) -> Self {
        Self { kv, events, revisions, bin }
    }

    fn media_url(key: &str) -> String {
        format!("/files/{key}?alt=media")
    }

    /// First-write only; later modifications flow through `apply_patch`.
    pub fn add(&self, key: &str, document: Value, user: &str) -> Result<()> {
        if self.kv.get(NAMESPACE, key.as_bytes())?.is_some() {
            return Err(ApiError::Conflict(format!("project {key} already exists")));
        }
        let contents = ProjectContents { key: key.to_string(), deleted: false, document };
        let bytes = serde_json::to_vec(&contents)?;
        self.kv.put(NAMESPACE, key.as_bytes(), &bytes)?;
        self.events.notify(
            &Event::new(EventOperation::Created, "HttpProject", key, None),
            NotifyFilter { url: &Self::media_url(key), users: None },
        );
        let _ = user;
        Ok(())
    }

    pub fn read(&self, key: &str) -> Result<Option<ProjectContents>> {
        if self.bin.is_deleted("Project", key)? {
            return Ok(None);
        }
        match self.kv.get(NAMESPACE, key.as_bytes())? {
            Some(bytes) => {
                let contents: ProjectContents = serde_json::from_slice(&bytes)?;
                if contents.deleted {
                    Ok(None)
                } else {
                    Ok(Some(contents))
                }
            }
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: &str, user: &str) -> Result<()> {
        let mut contents = self
            .kv
            .get(NAMESPACE, key.as_bytes())?
            .ok_or(ApiError::NotFound)
            .and_then(|bytes| serde_json::from_slice::<ProjectContents>(&bytes).map_err(Into::into))?;
        contents.deleted = true;
        let bytes = serde_json::to_vec(&contents)?;
        let tombstone = self.bin.build_tombstone("Project", key, Some(user))?;
        self.kv.batch(vec![
            crate::kv::BatchOp::put(NAMESPACE, key.as_bytes().to_vec(), bytes),
            tombstone,
        ])?;
        self.events.notify(
            &Event::new(EventOperation::Deleted, "HttpProject", key, None),
            NotifyFilter { url: &Self::media_url(key), users: None },
        );
        Ok(())
    }

    /// Validates, applies reversibly, records the reverse patch, and emits
    /// a `patch` event carrying the forward patch.
    pub fn apply_patch(&self, key: &str, patch: &Value, user: &str) -> Result<Value> {
        let contents = self.read(key)?.ok_or(ApiError::NotFound)?;
        let ops = parse_patch(patch)?;
        check_immutable(&ops, IMMUTABLE_PATHS)?;
        let (new_document, inverse_ops) = apply_with_inverse(&contents.document, &ops)?;

        let updated = ProjectContents { key: key.to_string(), deleted: false, document: new_document.clone() };
        let bytes = serde_json::to_vec(&updated)?;
        self.kv.put(NAMESPACE, key.as_bytes(), &bytes)?;

        self.revisions.add("Project", key, ops_to_value(&inverse_ops), user, false)?;

        self.events.notify(
            &Event::new(EventOperation::Patch, "HttpProject", key, Some(patch.clone())),
            NotifyFilter { url: &Self::media_url(key), users: None },
        );
        Ok(new_document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WsClients;
    use serde_json::json;

    fn store() -> (ProjectContentsStore, tempfile::TempDir) {
        let (kv, dir) = KVEngine::open_temp();
        let kv = Arc::new(kv);
        let events = Arc::new(EventBus::new(Arc::new(WsClients::new())));
        let revisions = Arc::new(Revisions::new(Arc::clone(&kv)));
        let bin = Arc::new(Bin::new(Arc::clone(&kv)));
        (ProjectContentsStore::new(kv, events, revisions, bin), dir)
    }

    #[test]
    fn add_then_patch_then_delete() {
        let (store, _dir) = store();
        store.add("P1", json!({"requests": []}), "u1").unwrap();
        let doc = store.apply_patch("P1", &json!([{"op": "add", "path": "/requests/-", "value": {"name": "req1"}}]), "u1").unwrap();
        assert_eq!(doc["requests"].as_array().unwrap().len(), 1);
        store.delete("P1", "u1").unwrap();
        assert!(store.read("P1").unwrap().is_none());
    }

    #[test]
    fn second_add_conflicts() {
        let (store, _dir) = store();
        store.add("P1", json!({}), "u1").unwrap();
        assert!(matches!(store.add("P1", json!({}), "u1"), Err(ApiError::Conflict(_))));
    }

    #[test]
    fn patch_rejects_immutable_path() {
        let (store, _dir) = store();
        store.add("P1", json!({"a": 1}), "u1").unwrap();
        let result = store.apply_patch("P1", &json!([{"op": "replace", "path": "/key", "value": "P2"}]), "u1");
        assert!(matches!(result, Err(ApiError::InvalidPatch(_))));
    }
}
