//! Read-through cache in front of [`ProjectContentsStore::read`], so a hot
//! project document doesn't round-trip through the KV engine on every poll
//! from an API client's request runner. Entries past their TTL are swept by
//! a periodic background task on a `tokio::time::interval`.

use crate::error::Result;
use crate::model::ProjectContents;
use crate::stores::contents::ProjectContentsStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct ProjectsCache {
    contents: Arc<ProjectContentsStore>,
    entries: DashMap<String, (ProjectContents, Instant)>,
    ttl: Duration,
}

impl ProjectsCache {
    pub fn new(contents: Arc<ProjectContentsStore>, ttl: Duration) -> Self {
        Self { contents, entries: DashMap::new(), ttl }
    }

    /// Serves a fresh entry from the cache, otherwise reads through to the
    /// backing store and remembers the result (including a miss, briefly,
    /// is not cached: only hits are worth keeping warm).
    pub fn read(&self, key: &str) -> Result<Option<ProjectContents>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.1.elapsed() < self.ttl {
                return Ok(Some(entry.0.clone()));
            }
        }
        let fresh = self.contents.read(key)?;
        if let Some(contents) = &fresh {
            self.entries.insert(key.to_string(), (contents.clone(), Instant::now()));
        } else {
            self.entries.remove(key);
        }
        Ok(fresh)
    }

    /// Drops a key immediately, e.g. after a patch or delete invalidates it.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// One GC pass: drops every entry older than `ttl`. Exclusive only for
    /// the duration of the sweep, not the whole interval between sweeps.
    pub fn sweep_expired(&self) {
        self.entries.retain(|_, (_, inserted)| inserted.elapsed() < self.ttl);
    }
}

/// Spawns the periodic sweep as a `tokio::time::interval` driving a tick
/// function, rather than a bespoke timer.
pub async fn gc_loop(cache: Arc<ProjectsCache>, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    loop {
        interval.tick().await;
        cache.sweep_expired();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, WsClients};
    use crate::kv::KVEngine;
    use crate::stores::bin::Bin;
    use crate::stores::revisions::Revisions;
    use serde_json::json;

    fn cache(ttl: Duration) -> (ProjectsCache, tempfile::TempDir) {
        let (kv, dir) = KVEngine::open_temp();
        let kv = Arc::new(kv);
        let events = Arc::new(EventBus::new(Arc::new(WsClients::new())));
        let revisions = Arc::new(Revisions::new(Arc::clone(&kv)));
        let bin = Arc::new(Bin::new(Arc::clone(&kv)));
        let contents = Arc::new(ProjectContentsStore::new(kv, events, revisions, bin));
        contents.add("P1", json!({"requests": []}), "u1").unwrap();
        (ProjectsCache::new(contents, ttl), dir)
    }

    #[test]
    fn caches_then_expires() {
        let (cache, _dir) = cache(Duration::from_millis(20));
        assert!(cache.read("P1").unwrap().is_some());
        assert_eq!(cache.entries.len(), 1);
        std::thread::sleep(Duration::from_millis(30));
        cache.sweep_expired();
        assert!(cache.entries.is_empty());
        // still readable: a cache miss reads through to the store
        assert!(cache.read("P1").unwrap().is_some());
    }

    #[test]
    fn invalidate_forces_reread() {
        let (cache, _dir) = cache(Duration::from_secs(60));
        cache.read("P1").unwrap();
        cache.invalidate("P1");
        assert!(cache.entries.is_empty());
    }
}
