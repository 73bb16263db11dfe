//! Per-user index of files granted to a user outside their owned tree, so
//! "shared with me" doesn't require scanning every file.

use crate::error::Result;
use crate::key_codec;
use crate::kv::{BatchOp, KVEngine};
use crate::model::SharedEntry;
use std::sync::Arc;

const NAMESPACE: &str = "shared";

pub struct SharedIndex {
    kv: Arc<KVEngine>,
}

impl SharedIndex {
    pub fn new(kv: Arc<KVEngine>) -> Self {
        Self { kv }
    }

    pub fn build_insert(&self, user_key: &str, file_key: &str, kind: &str, parents: &[String]) -> Result<BatchOp> {
        let key = key_codec::shared_index_key(user_key, file_key)?;
        let entry = SharedEntry {
            target_key: file_key.to_string(),
            user_key: user_key.to_string(),
            kind: kind.to_string(),
            parents: parents.to_vec(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        Ok(BatchOp::put(NAMESPACE, key.into_bytes(), bytes))
    }

    pub fn build_remove(&self, user_key: &str, file_key: &str) -> Result<BatchOp> {
        let key = key_codec::shared_index_key(user_key, file_key)?;
        Ok(BatchOp::delete(NAMESPACE, key.into_bytes()))
    }

    pub fn list_for_user(&self, user_key: &str) -> Result<Vec<SharedEntry>> {
        let prefix = format!("{user_key}~");
        let upper = format!("{user_key}~~");
        let rows = self.kv.range_asc(NAMESPACE, Some(prefix.as_bytes()), Some(upper.as_bytes()), usize::MAX)?;
        rows.into_iter()
            .map(|(_, v)| serde_json::from_slice::<SharedEntry>(&v).map_err(Into::into))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_list_then_remove() {
        let (kv, _dir) = KVEngine::open_temp();
        let kv = Arc::new(kv);
        let index = SharedIndex::new(Arc::clone(&kv));
        kv.batch(vec![index.build_insert("u2", "F1", "Folder", &["root".to_string()]).unwrap()]).unwrap();
        let entries = index.list_for_user("u2").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target_key, "F1");

        kv.batch(vec![index.build_remove("u2", "F1").unwrap()]).unwrap();
        assert!(index.list_for_user("u2").unwrap().is_empty());
    }
}
