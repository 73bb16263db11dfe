//! Users: created on first OIDC login (multi-user) or implicitly as the
//! singleton `default` user (single-user). Never hard-deleted.

use crate::error::{ApiError, Result};
use crate::kv::KVEngine;
use crate::model::User;
use std::sync::Arc;

const NAMESPACE: &str = "users";

pub struct Users {
    kv: Arc<KVEngine>,
}

impl Users {
    pub fn new(kv: Arc<KVEngine>) -> Self {
        Self { kv }
    }

    pub fn add(&self, user: &User) -> Result<()> {
        if self.kv.get(NAMESPACE, user.key.as_bytes())?.is_some() {
            return Err(ApiError::Conflict(format!("user {} already exists", user.key)));
        }
        let bytes = serde_json::to_vec(user)?;
        self.kv.put(NAMESPACE, user.key.as_bytes(), &bytes)?;
        Ok(())
    }

    /// Idempotent variant used by `ensure_default_user` and OIDC login,
    /// where "already exists" is the expected happy path, not a conflict.
    pub fn upsert(&self, user: &User) -> Result<()> {
        let bytes = serde_json::to_vec(user)?;
        self.kv.put(NAMESPACE, user.key.as_bytes(), &bytes)?;
        Ok(())
    }

    pub fn read(&self, key: &str) -> Result<Option<User>> {
        match self.kv.get(NAMESPACE, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_provider_sub(&self, provider: &str, sub: &str) -> Result<Option<User>> {
        let all = self.kv.range_asc(NAMESPACE, None, None, usize::MAX)?;
        for (_, v) in all {
            let user: User = serde_json::from_slice(&v)?;
            if user.provider.as_deref() == Some(provider) && user.provider_sub.as_deref() == Some(sub) {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    /// Substring match on `name`/`email` when `query` is present.
    pub fn list(&self, query: Option<&str>) -> Result<Vec<User>> {
        let all = self.kv.range_asc(NAMESPACE, None, None, usize::MAX)?;
        let mut users = Vec::new();
        for (_, v) in all {
            let user: User = serde_json::from_slice(&v)?;
            let matches = match query {
                None => true,
                Some(q) => {
                    let q = q.to_lowercase();
                    user.name.to_lowercase().contains(&q) || user.email.to_lowercase().contains(&q)
                }
            };
            if matches {
                users.push(user);
            }
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rejects_duplicate_key() {
        let (kv, _dir) = KVEngine::open_temp();
        let users = Users::new(Arc::new(kv));
        let u = User { key: "u1".into(), name: "A".into(), email: "a@x.com".into(), provider: None, picture: None, provider_sub: None };
        users.add(&u).unwrap();
        assert!(matches!(users.add(&u), Err(ApiError::Conflict(_))));
    }

    #[test]
    fn list_filters_by_substring() {
        let (kv, _dir) = KVEngine::open_temp();
        let users = Users::new(Arc::new(kv));
        users.add(&User { key: "u1".into(), name: "Alice".into(), email: "alice@x.com".into(), provider: None, picture: None, provider_sub: None }).unwrap();
        users.add(&User { key: "u2".into(), name: "Bob".into(), email: "bob@x.com".into(), provider: None, picture: None, provider_sub: None }).unwrap();
        let results = users.list(Some("ali")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "u1");
    }
}
