//! Dual-tier session map: an authoritative persisted `sessions` namespace
//! plus a `dashmap` in-memory cache read-through/write-through in front of
//! it, so a hot session never round-trips through sled on every request.

use crate::error::Result;
use crate::kv::KVEngine;
use crate::model::Session;
use crate::tokens::TokenCodec;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const NAMESPACE: &str = "sessions";
const OIDC_STATE_TTL: Duration = Duration::from_secs(5 * 60);

pub struct SessionStore {
    kv: Arc<KVEngine>,
    cache: DashMap<String, Session>,
    /// OIDC `state -> (sid, inserted_at)`. Never persisted: state is short-lived.
    state_index: DashMap<String, (String, Instant)>,
    tokens: TokenCodec,
}

impl SessionStore {
    pub fn new(kv: Arc<KVEngine>, tokens: TokenCodec) -> Self {
        Self { kv, cache: DashMap::new(), state_index: DashMap::new(), tokens }
    }

    pub fn get(&self, sid: &str) -> Result<Option<Session>> {
        if let Some(hit) = self.cache.get(sid) {
            return Ok(Some(hit.clone()));
        }
        let persisted = self.kv.get(NAMESPACE, sid.as_bytes())?;
        match persisted {
            Some(bytes) => {
                let session: Session = serde_json::from_slice(&bytes)?;
                self.cache.insert(sid.to_string(), session.clone());
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    pub fn set(&self, sid: &str, session: Session) -> Result<()> {
        let bytes = serde_json::to_vec(&session)?;
        self.kv.put(NAMESPACE, sid.as_bytes(), &bytes)?;
        self.cache.insert(sid.to_string(), session);
        Ok(())
    }

    pub fn delete(&self, sid: &str) -> Result<()> {
        self.cache.remove(sid);
        self.kv.delete(NAMESPACE, sid.as_bytes())?;
        Ok(())
    }

    pub fn link_oidc_state(&self, state: String, sid: String) {
        self.state_index.insert(state, (sid, Instant::now()));
    }

    pub fn resolve_oidc_state(&self, state: &str) -> Option<String> {
        self.state_index.remove(state).map(|(_, (sid, _))| sid)
    }

    /// Drops OIDC state entries older than [`OIDC_STATE_TTL`]; run from a
    /// background interval loop alongside the other periodic sweeps.
    pub fn sweep_expired_oidc_state(&self) {
        let now = Instant::now();
        self.state_index.retain(|_, (_, inserted_at)| now.duration_since(*inserted_at) < OIDC_STATE_TTL);
    }

    /// Creates a fresh `sid`, stores `{authenticated:false}`, and returns a
    /// signed token carrying it.
    pub fn generate_unauthenticated(&self, now_unix: i64) -> Result<String> {
        let sid = Uuid::new_v4().to_string();
        self.set(&sid, Session::Unauthenticated { state: None, nonce: None })?;
        self.tokens.sign(&sid, now_unix)
    }

    /// Upgrades (or creates) `sid` to `{authenticated:true, uid}` and
    /// re-signs.
    pub fn generate_authenticated(&self, uid: &str, sid: &str, now_unix: i64) -> Result<String> {
        self.set(sid, Session::Authenticated { uid: uid.to_string() })?;
        self.tokens.sign(sid, now_unix)
    }

    /// Re-signs the session named by an already-verified token.
    pub fn renew(&self, sid: &str, now_unix: i64) -> Result<String> {
        self.tokens.sign(sid, now_unix)
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }
}

/// A fresh `state` nonce used to start an OIDC flow.
pub fn new_oidc_state() -> String {
    Uuid::new_v4().to_string()
}
