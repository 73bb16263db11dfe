//! Route modules, one per resource, assembled into the router `main.rs`
//! mounts under the configured prefix.

pub mod backend;
pub mod files;
pub mod history;
pub mod sessions;
pub mod shared;
pub mod users;

use crate::app_state::AppState;
use crate::ws;
use axum::routing::{get, post};
use axum::Router;

/// WebSocket upgrades share the same `/files`, `/files/:id`, `/history`,
/// `/auth/login` path *names* for EventBus subscription matching, but are
/// mounted under a `/ws` prefix: axum routes on method + path, not on the
/// presence of an `Upgrade` header, so a GET to `/files` can't dispatch to
/// both the listing handler and the upgrade handler without extra
/// machinery that buys nothing here.
fn websocket_router() -> Router<AppState> {
    Router::new()
        .route("/files", get(ws::files_collection))
        .route("/files/:id", get(ws::files_item))
        .route("/history", get(ws::history))
        .route("/auth/login", get(ws::auth_login))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/backend", get(backend::get))
        .route("/sessions", post(sessions::create).delete(sessions::delete))
        .route("/sessions/renew", post(sessions::renew))
        .route("/users/me", get(users::me))
        .route("/files", get(files::list).post(files::create))
        .route("/files/:id", get(files::get).patch(files::patch).delete(files::delete))
        .route("/files/:id/users", get(files::get_access).patch(files::patch_access))
        .route("/files/:id/revisions", get(files::revisions))
        .route("/shared", get(shared::list))
        .route("/history", get(history::list))
        .nest("/ws", websocket_router())
}
