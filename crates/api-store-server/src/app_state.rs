//! Shared services handed to every axum handler, built once at startup and
//! cloned cheaply (every field is an `Arc`) per request.

use api_store_core::config::ServerConfig;
use api_store_core::cursor::CursorCodec;
use api_store_core::events::{EventBus, WsClients};
use api_store_core::kv::KVEngine;
use api_store_core::session_store::SessionStore;
use api_store_core::stores::app::AppStore;
use api_store_core::stores::bin::Bin;
use api_store_core::stores::contents::ProjectContentsStore;
use api_store_core::stores::files::Files;
use api_store_core::stores::history::History;
use api_store_core::stores::projects_cache::ProjectsCache;
use api_store_core::stores::revisions::Revisions;
use api_store_core::stores::shared_index::SharedIndex;
use api_store_core::stores::users::Users;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub kv: Arc<KVEngine>,
    pub sessions: Arc<SessionStore>,
    pub ws_clients: Arc<WsClients>,
    pub events: Arc<EventBus>,
    pub cursor: Arc<CursorCodec>,
    pub users: Arc<Users>,
    pub files: Arc<Files>,
    pub contents: Arc<ProjectContentsStore>,
    pub projects_cache: Arc<ProjectsCache>,
    pub revisions: Arc<Revisions>,
    pub bin: Arc<Bin>,
    pub shared: Arc<SharedIndex>,
    pub app_store: Arc<AppStore>,
    pub history: Arc<History>,
}
