//! Soft-delete index: presence of `del~<kind>~<id>` is the tombstone.

use crate::error::Result;
use crate::key_codec;
use crate::kv::{BatchOp, KVEngine};
use crate::model::BinEntry;
use crate::stores::now_unix_ms;
use std::sync::Arc;

const NAMESPACE: &str = "bin";

pub struct Bin {
    kv: Arc<KVEngine>,
}

impl Bin {
    pub fn new(kv: Arc<KVEngine>) -> Self {
        Self { kv }
    }

    pub fn marker_key(kind: &str, id: &str) -> Result<String> {
        key_codec::deleted_marker(kind, &[id])
    }

    /// Builds the put for a tombstone entry, to be included in the same
    /// atomic batch as the entity's own `_deleted` flip.
    pub fn build_tombstone(&self, kind: &str, id: &str, deleted_by: Option<&str>) -> Result<BatchOp> {
        let key = Self::marker_key(kind, id)?;
        let entry = BinEntry {
            key: key.clone(),
            deleted_time: now_unix_ms(),
            deleted_by: deleted_by.map(str::to_string),
        };
        let bytes = serde_json::to_vec(&entry)?;
        Ok(BatchOp::put(NAMESPACE, key.into_bytes(), bytes))
    }

    pub fn is_deleted(&self, kind: &str, id: &str) -> Result<bool> {
        let key = Self::marker_key(kind, id)?;
        Ok(self.kv.get(NAMESPACE, key.as_bytes())?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_is_visible_after_batch_apply() {
        let (kv, _dir) = KVEngine::open_temp();
        let kv = Arc::new(kv);
        let bin = Bin::new(Arc::clone(&kv));
        let op = bin.build_tombstone("File", "F1", Some("u1")).unwrap();
        kv.batch(vec![op]).unwrap();
        assert!(bin.is_deleted("File", "F1").unwrap());
        assert!(!bin.is_deleted("File", "F2").unwrap());
    }
}
