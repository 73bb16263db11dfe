//! Per-application scratch namespace: `projects` and `requests` sub-areas
//! for client-side app state that isn't part of the files tree.

use crate::error::Result;
use crate::kv::KVEngine;
use serde_json::Value;
use std::sync::Arc;

const NAMESPACE: &str = "app";

#[derive(Debug, Clone, Copy)]
pub enum AppArea {
    Projects,
    Requests,
}

impl AppArea {
    fn prefix(self) -> &'static str {
        match self {
            AppArea::Projects => "projects",
            AppArea::Requests => "requests",
        }
    }
}

pub struct AppStore {
    kv: Arc<KVEngine>,
}

impl AppStore {
    pub fn new(kv: Arc<KVEngine>) -> Self {
        Self { kv }
    }

    fn scoped_key(area: AppArea, key: &str) -> String {
        format!("{}~{}", area.prefix(), key)
    }

    pub fn put(&self, area: AppArea, key: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.kv.put(NAMESPACE, Self::scoped_key(area, key).as_bytes(), &bytes)?;
        Ok(())
    }

    pub fn get(&self, area: AppArea, key: &str) -> Result<Option<Value>> {
        match self.kv.get(NAMESPACE, Self::scoped_key(area, key).as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, area: AppArea, key: &str) -> Result<()> {
        self.kv.delete(NAMESPACE, Self::scoped_key(area, key).as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn areas_do_not_collide() {
        let (kv, _dir) = KVEngine::open_temp();
        let store = AppStore::new(Arc::new(kv));
        store.put(AppArea::Projects, "k1", &json!({"a": 1})).unwrap();
        store.put(AppArea::Requests, "k1", &json!({"a": 2})).unwrap();
        assert_eq!(store.get(AppArea::Projects, "k1").unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.get(AppArea::Requests, "k1").unwrap(), Some(json!({"a": 2})));
    }
}
