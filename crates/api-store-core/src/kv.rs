//! Ordered key-value engine. Namespaces are byte-prefixed key regions of a
//! single sled tree rather than separate sled `Tree`s, so that a batch can
//! span namespaces and still land under sled's one-tree atomicity guarantee
//! under sled's one-tree atomicity guarantee. This is the only component
//! that blocks on disk I/O.

use crate::error::{ApiError, Result};
use std::ops::Bound;
use std::time::Duration;

const MAX_RETRIES: u32 = 3;

/// A single write in a [`KVEngine::batch`] call.
pub enum BatchOp {
    Put { ns: &'static str, key: Vec<u8>, value: Vec<u8> },
    Delete { ns: &'static str, key: Vec<u8> },
}

impl BatchOp {
    pub fn put(ns: &'static str, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOp::Put { ns, key: key.into(), value: value.into() }
    }

    pub fn delete(ns: &'static str, key: impl Into<Vec<u8>>) -> Self {
        BatchOp::Delete { ns, key: key.into() }
    }
}

fn namespaced(ns: &str, key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ns.len() + 1 + key.len());
    buf.extend_from_slice(ns.as_bytes());
    buf.push(0);
    buf.extend_from_slice(key);
    buf
}

/// Exclusive upper bound of the byte range covering every key under `ns`.
fn namespace_upper_bound(ns: &str) -> Vec<u8> {
    let mut buf = ns.as_bytes().to_vec();
    buf.push(1); // 0x01 > the 0x00 separator, so this bounds the whole namespace
    buf
}

pub struct KVEngine {
    db: sled::Db,
}

impl KVEngine {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = with_retries(|| sled::open(path.as_ref()))?;
        Ok(Self { db })
    }

    #[cfg(test)]
    pub fn open_temp() -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Self::open(dir.path()).expect("open sled db");
        (engine, dir)
    }

    pub fn get(&self, ns: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let full = namespaced(ns, key);
        let v = with_retries(|| self.db.get(&full))?;
        Ok(v.map(|ivec| ivec.to_vec()))
    }

    pub fn put(&self, ns: &'static str, key: &[u8], value: &[u8]) -> Result<()> {
        let full = namespaced(ns, key);
        with_retries(|| self.db.insert(&full, value))?;
        Ok(())
    }

    pub fn delete(&self, ns: &str, key: &[u8]) -> Result<()> {
        let full = namespaced(ns, key);
        with_retries(|| self.db.remove(&full))?;
        Ok(())
    }

    /// Applies every op atomically: all-or-nothing, visible together.
    pub fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for op in ops {
            match op {
                BatchOp::Put { ns, key, value } => {
                    batch.insert(namespaced(ns, &key), value);
                }
                BatchOp::Delete { ns, key } => {
                    batch.remove(namespaced(ns, &key));
                }
            }
        }
        with_retries(|| self.db.apply_batch(batch.clone()))?;
        Ok(())
    }

    /// Ascending scan within `ns`, `[start, end)` on the unprefixed key,
    /// bounded to at most `limit` entries.
    pub fn range_asc(
        &self,
        ns: &str,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let lower = match start {
            Some(s) => Bound::Included(namespaced(ns, s)),
            None => Bound::Included(namespaced(ns, &[])),
        };
        let upper = match end {
            Some(e) => Bound::Excluded(namespaced(ns, e)),
            None => Bound::Excluded(namespace_upper_bound(ns)),
        };
        let mut out = Vec::new();
        for item in self.db.range((lower, upper)) {
            if out.len() >= limit {
                break;
            }
            let (k, v) = item.map_err(ApiError::from)?;
            out.push((strip_ns(ns, &k), v.to_vec()));
        }
        Ok(out)
    }

    /// Descending scan within `ns`.
    pub fn range_desc(
        &self,
        ns: &str,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let lower = match start {
            Some(s) => Bound::Included(namespaced(ns, s)),
            None => Bound::Included(namespaced(ns, &[])),
        };
        let upper = match end {
            Some(e) => Bound::Excluded(namespaced(ns, e)),
            None => Bound::Excluded(namespace_upper_bound(ns)),
        };
        let mut out = Vec::new();
        for item in self.db.range((lower, upper)).rev() {
            if out.len() >= limit {
                break;
            }
            let (k, v) = item.map_err(ApiError::from)?;
            out.push((strip_ns(ns, &k), v.to_vec()));
        }
        Ok(out)
    }

    /// Deletes every key under `ns` in one atomic batch.
    pub fn clear(&self, ns: &str) -> Result<()> {
        let mut batch = sled::Batch::default();
        for item in self.db.range(namespaced(ns, &[])..namespace_upper_bound(ns)) {
            let (k, _) = item.map_err(ApiError::from)?;
            batch.remove(k);
        }
        with_retries(|| self.db.apply_batch(batch.clone()))?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(ApiError::from)?;
        Ok(())
    }
}

fn strip_ns(ns: &str, full_key: &sled::IVec) -> Vec<u8> {
    full_key[ns.len() + 1..].to_vec()
}

/// Retries transient sled errors up to [`MAX_RETRIES`] times with jitter, per
/// callers above this layer never retry.
fn with_retries<T>(mut op: impl FnMut() -> sled::Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < MAX_RETRIES && is_transient(&e) => {
                attempt += 1;
                let jitter_ms = 5u64 * attempt as u64 + (rand::random::<u8>() % 10) as u64;
                std::thread::sleep(Duration::from_millis(jitter_ms));
                tracing::warn!(attempt, error = %e, "retrying transient kv error");
            }
            Err(e) => return Err(ApiError::from(e)),
        }
    }
}

fn is_transient(e: &sled::Error) -> bool {
    matches!(e, sled::Error::Io(_))
}
