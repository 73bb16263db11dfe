//! Append-only reverse-patch history. Keys are `<kind>~<fileKey>~<invTime>`
//! so newest-first listing is a forward scan.

use crate::error::Result;
use crate::key_codec;
use crate::kv::KVEngine;
use crate::model::{Modification, Revision};
use crate::stores::{now_unix_ms, ListOptions, ListPage};
use serde_json::Value;
use std::sync::Arc;

const NAMESPACE: &str = "revisions";

pub struct Revisions {
    kv: Arc<KVEngine>,
}

impl Revisions {
    pub fn new(kv: Arc<KVEngine>) -> Self {
        Self { kv }
    }

    /// Appended after the entity's own atomic batch has landed, so a crash
    /// between the two never leaves a revision with no matching mutation.
    pub fn add(&self, kind: &str, file_key: &str, reverse_patch: Value, user: &str, deleted: bool) -> Result<Revision> {
        let now = now_unix_ms();
        let key = key_codec::revision_key(kind, file_key, now)?;
        let revision = Revision {
            key: key.clone(),
            kind: kind.to_string(),
            id: file_key.to_string(),
            created: now,
            deleted,
            patch: reverse_patch,
            modification: Modification { user: user.to_string(), time: now },
        };
        let bytes = serde_json::to_vec(&revision)?;
        self.kv.put(NAMESPACE, key.as_bytes(), &bytes)?;
        Ok(revision)
    }

    /// Newest-first listing for `file_key`. Authorization (does `user` have
    /// at least reader on the underlying file) is enforced by the caller
    /// before invoking this.
    pub fn list(&self, kind: &str, file_key: &str, options: &ListOptions) -> Result<ListPage<Revision>> {
        let prefix = key_codec::form(&[kind, file_key])?;
        let start = format!("{prefix}~");
        let end = format!("{prefix}~~"); // '~' (0x7e) + 1 would be '\x7f'; use a wider sentinel
        let limit = if options.limit == 0 { 50 } else { options.limit };
        let rows = self.kv.range_asc(NAMESPACE, Some(start.as_bytes()), Some(end.as_bytes()), limit)?;
        let data = rows
            .into_iter()
            .map(|(_, v)| serde_json::from_slice::<Revision>(&v).map_err(Into::into))
            .collect::<Result<Vec<_>>>()?;
        Ok(ListPage { data, cursor: None })
    }
}
