//! Entry point: parses the CLI, wires every store, and serves the HTTP +
//! WebSocket API until SIGINT requests a graceful shutdown.

mod app_state;
mod auth;
mod http_error;
mod routes;
mod ws;

use api_store_core::config::{AuthMode, OidcConfig, ServerConfig};
use api_store_core::cursor::CursorCodec;
use api_store_core::events::{EventBus, WsClients};
use api_store_core::kv::KVEngine;
use api_store_core::session_store::SessionStore;
use api_store_core::stores::app::AppStore;
use api_store_core::stores::bin::Bin;
use api_store_core::stores::contents::ProjectContentsStore;
use api_store_core::stores::files::Files;
use api_store_core::stores::history::History;
use api_store_core::stores::projects_cache::{gc_loop, ProjectsCache};
use api_store_core::stores::revisions::Revisions;
use api_store_core::stores::shared_index::SharedIndex;
use api_store_core::stores::users::Users;
use api_store_core::tokens::TokenCodec;
use app_state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const PROJECTS_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const PROJECTS_CACHE_GC_TICK: Duration = Duration::from_secs(60);

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).cloned()
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

/// Builds a `ServerConfig` from `ServerConfig::load()` plus CLI flags, which
/// take precedence over the file/env layers.
fn load_config(args: &[String]) -> Result<ServerConfig, String> {
    let mut config = ServerConfig::load().map_err(|e| format!("config load failed: {e}"))?;

    if let Some(mode) = args.get(1) {
        config.mode = match mode.as_str() {
            "single-user" => AuthMode::SingleUser,
            "multi-user" => AuthMode::MultiUser,
            other => return Err(format!("unknown mode '{other}', expected single-user or multi-user")),
        };
    }
    if let Some(port) = flag_value(args, "--port") {
        config.port = port.parse().map_err(|_| format!("invalid --port value '{port}'"))?;
    }
    if let Some(prefix) = flag_value(args, "--prefix") {
        config.prefix = prefix;
    }
    if let Some(data_path) = flag_value(args, "--data-path") {
        config.data_path = data_path;
    }
    if let Some(secret) = flag_value(args, "--session-secret") {
        config.session_secret = Some(secret);
    }
    if has_flag(args, "--auth-type") && flag_value(args, "--auth-type").as_deref() == Some("oidc") {
        config.oidc = Some(OidcConfig {
            issuer_uri: flag_value(args, "--oidc-issuer-uri").unwrap_or_default(),
            client_id: flag_value(args, "--oidc-client-id").unwrap_or_default(),
            client_secret: flag_value(args, "--oidc-client-secret").unwrap_or_default(),
            redirect_base: flag_value(args, "--oidc-redirect-base").unwrap_or_default(),
        });
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[api-store] .env not loaded: {e} (using system environment)");
    }

    let args: Vec<String> = std::env::args().collect();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[api-store] startup failed: {e}");
            std::process::exit(1);
        }
    };

    let kv = match KVEngine::open(&config.data_path) {
        Ok(kv) => Arc::new(kv),
        Err(e) => {
            eprintln!("[api-store] failed to open data store at '{}': {e}", config.data_path);
            std::process::exit(1);
        }
    };

    let session_secret = config.session_secret.clone().unwrap_or_else(|| "dev-insecure-session-secret".to_string());
    let tokens = TokenCodec::new(session_secret.into_bytes(), "api-store", "api-store-clients", 3600);
    let cursor = Arc::new(CursorCodec::new(b"api-store-cursor-secret"));
    let ws_clients = Arc::new(WsClients::new());
    let events = Arc::new(EventBus::new(Arc::clone(&ws_clients)));
    let sessions = Arc::new(SessionStore::new(Arc::clone(&kv), tokens));

    let bin = Arc::new(Bin::new(Arc::clone(&kv)));
    let revisions = Arc::new(Revisions::new(Arc::clone(&kv)));
    let shared = Arc::new(SharedIndex::new(Arc::clone(&kv)));
    let users = Arc::new(Users::new(Arc::clone(&kv)));
    let files = Arc::new(Files::new(
        Arc::clone(&kv),
        Arc::clone(&events),
        Arc::clone(&revisions),
        Arc::clone(&bin),
        Arc::clone(&shared),
        Arc::clone(&cursor),
    ));
    let contents = Arc::new(ProjectContentsStore::new(Arc::clone(&kv), Arc::clone(&events), Arc::clone(&revisions), Arc::clone(&bin)));
    let app_store = Arc::new(AppStore::new(Arc::clone(&kv)));
    let history = Arc::new(History::new(Arc::clone(&kv), Arc::clone(&cursor)));
    let projects_cache = Arc::new(ProjectsCache::new(Arc::clone(&contents), PROJECTS_CACHE_TTL));

    tokio::spawn(gc_loop(Arc::clone(&projects_cache), PROJECTS_CACHE_GC_TICK));

    let state = AppState {
        config: Arc::new(config.clone()),
        kv: Arc::clone(&kv),
        sessions,
        ws_clients: Arc::clone(&ws_clients),
        events,
        cursor,
        users,
        files,
        contents,
        projects_cache,
        revisions,
        bin,
        shared,
        app_store,
        history,
    };

    let mut app = routes::router().with_state(state);
    if !config.prefix.is_empty() && config.prefix != "/" {
        app = axum::Router::new().nest(&config.prefix, app);
    }

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("[api-store] failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(mode = ?config.mode, %addr, prefix = %config.prefix, "api-store listening");

    let kv_for_shutdown = Arc::clone(&kv);
    let ws_for_shutdown = Arc::clone(&ws_clients);
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("SIGINT received, shutting down");
        ws_for_shutdown.close_all();
        if let Err(e) = kv_for_shutdown.flush() {
            tracing::warn!(error = %e, "failed to flush data store on shutdown");
        }
    };

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        eprintln!("[api-store] server error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_store_core::model::User;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_config(mode: AuthMode) -> ServerConfig {
        ServerConfig {
            mode,
            port: 0,
            prefix: "/v1".to_string(),
            data_path: "./data".to_string(),
            session_secret: Some("test-secret".to_string()),
            oidc: None,
        }
    }

    fn test_state(mode: AuthMode) -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = Arc::new(KVEngine::open(dir.path()).expect("open kv"));
        let tokens = TokenCodec::new(b"test-secret".to_vec(), "api-store", "api-store-clients", 3600);
        let cursor = Arc::new(CursorCodec::new(b"test-cursor-secret"));
        let ws_clients = Arc::new(WsClients::new());
        let events = Arc::new(EventBus::new(Arc::clone(&ws_clients)));
        let sessions = Arc::new(SessionStore::new(Arc::clone(&kv), tokens));
        let bin = Arc::new(Bin::new(Arc::clone(&kv)));
        let revisions = Arc::new(Revisions::new(Arc::clone(&kv)));
        let shared = Arc::new(SharedIndex::new(Arc::clone(&kv)));
        let users = Arc::new(Users::new(Arc::clone(&kv)));
        let files = Arc::new(Files::new(
            Arc::clone(&kv),
            Arc::clone(&events),
            Arc::clone(&revisions),
            Arc::clone(&bin),
            Arc::clone(&shared),
            Arc::clone(&cursor),
        ));
        let contents = Arc::new(ProjectContentsStore::new(Arc::clone(&kv), Arc::clone(&events), Arc::clone(&revisions), Arc::clone(&bin)));
        let app_store = Arc::new(AppStore::new(Arc::clone(&kv)));
        let history = Arc::new(History::new(Arc::clone(&kv), Arc::clone(&cursor)));
        let projects_cache = Arc::new(ProjectsCache::new(Arc::clone(&contents), Duration::from_secs(300)));

        let state = AppState {
            config: Arc::new(test_config(mode)),
            kv,
            sessions,
            ws_clients,
            events,
            cursor,
            users,
            files,
            contents,
            projects_cache,
            revisions,
            bin,
            shared,
            app_store,
            history,
        };
        (state, dir)
    }

    fn test_app(state: AppState) -> Router {
        routes::router().with_state(state)
    }

    async fn request(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value, axum::http::HeaderMap) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };
        let req = builder.body(body).unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, value, headers)
    }

    /// A fresh `POST /sessions` in single-user mode is immediately
    /// authenticated as `default`, and the body is the bare signed token.
    #[tokio::test]
    async fn s1_single_user_login_and_profile() {
        let (state, _dir) = test_state(AuthMode::SingleUser);
        let app = test_app(state);

        let (status, body, _) = request(&app, "POST", "/sessions", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let token = body.as_str().expect("bare token string").to_string();

        let (status, me, _) = request(&app, "GET", "/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["key"], "default");
    }

    /// `POST /files` answers 204 with a `Location` header, never the file
    /// body; `PATCH` answers `{status:"OK", revert}` and the revert shows
    /// up newest-first in the revisions listing.
    #[tokio::test]
    async fn s2_create_patch_revisions_delete() {
        let (state, _dir) = test_state(AuthMode::SingleUser);
        let app = test_app(state);
        let (_, token, _) = request(&app, "POST", "/sessions", None, None).await;
        let token = token.as_str().unwrap().to_string();

        let (status, _, headers) = request(&app, "POST", "/files", Some(&token), Some(json!({"key": "F1", "kind": "Folder", "info": {}}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(headers.get("location").unwrap(), "/files/F1");

        let (status, file, _) = request(&app, "GET", "/files/F1", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(file["key"], "F1");

        let patch = json!([{"op": "add", "path": "/info/title", "value": "hello"}]);
        let (status, body, _) = request(&app, "PATCH", "/files/F1", Some(&token), Some(patch)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
        assert!(body["revert"].is_array());

        let (status, revisions, _) = request(&app, "GET", "/files/F1/revisions", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revisions["data"][0]["patch"], body["revert"]);

        let (status, _, _) = request(&app, "DELETE", "/files/F1", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        // invariant 5: a deleted file is a 404 to a subsequent read, not a
        // tombstoned body.
        let (status, _, _) = request(&app, "GET", "/files/F1", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Sharing grants the target user a role on the file without making
    /// them an owner; `/shared` surfaces it, and access beyond the granted
    /// role is still rejected.
    #[tokio::test]
    async fn s3_sharing_grants_limited_access() {
        let (state, _dir) = test_state(AuthMode::MultiUser);
        let now = chrono::Utc::now().timestamp();
        let owner_token = state.sessions.generate_authenticated("u1", "sid-owner", now).unwrap();
        let other_token = state.sessions.generate_authenticated("u2", "sid-other", now).unwrap();
        let app = test_app(state);

        let (status, _, _) = request(&app, "POST", "/files", Some(&owner_token), Some(json!({"key": "F1", "kind": "HttpProject"}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let access_ops = json!([{"op": "add", "type": "user", "id": "u2", "role": "reader"}]);
        let (status, _, _) = request(&app, "PATCH", "/files/F1/users", Some(&owner_token), Some(access_ops)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, shared, _) = request(&app, "GET", "/shared", Some(&other_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(shared.as_array().unwrap().len(), 1);
        assert_eq!(shared[0]["target_key"], "F1");

        let (status, _, _) = request(&app, "GET", "/files/F1", Some(&other_token), None).await;
        assert_eq!(status, StatusCode::OK);

        let patch = json!([{"op": "add", "path": "/info/x", "value": 1}]);
        let (status, _, _) = request(&app, "PATCH", "/files/F1", Some(&other_token), Some(patch)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    /// Patching a project's contents (`?alt=media`) invalidates the read
    /// cache and fans the patch out to subscribers of that exact URL.
    #[tokio::test]
    async fn s4_project_contents_patch_invalidates_cache_and_notifies() {
        let (state, _dir) = test_state(AuthMode::SingleUser);
        let (_, rx_token, _) = request(&test_app(state.clone()), "POST", "/sessions", None, None).await;
        let token = rx_token.as_str().unwrap().to_string();
        let app = test_app(state.clone());

        let (status, _, _) = request(&app, "POST", "/files", Some(&token), Some(json!({"key": "P1", "kind": "HttpProject"}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        state.ws_clients.register("/files/P1?alt=media".to_string(), Some("default".to_string()), None, tx);

        assert!(state.projects_cache.read("P1").unwrap().is_some());

        let patch = json!([{"op": "add", "path": "/requests", "value": [{"name": "req1"}]}]);
        let (status, body, _) = request(&app, "PATCH", "/files/P1?alt=media", Some(&token), Some(patch)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");

        let pushed = rx.try_recv().expect("subscriber received the patch event");
        let event: Value = serde_json::from_str(&pushed).unwrap();
        assert_eq!(event["operation"], "patch");
        assert_eq!(event["id"], "P1");
    }

    /// Listing completeness: 60 entries paginate as 25/25/10, with the
    /// final page carrying no cursor.
    #[tokio::test]
    async fn s5_history_pagination_is_complete() {
        let (state, _dir) = test_state(AuthMode::SingleUser);
        for i in 0..60 {
            state.history.add("default", json!({"i": i}), None, Some("P1"), None, None).unwrap();
        }
        let (_, token, _) = request(&test_app(state.clone()), "POST", "/sessions", None, None).await;
        let token = token.as_str().unwrap().to_string();
        let app = test_app(state);

        let mut seen = std::collections::HashSet::new();
        let mut cursor: Option<String> = None;
        for expected_len in [25, 25, 10] {
            let uri = match &cursor {
                Some(c) => format!("/history?type=project&id=P1&limit=25&cursor={c}"),
                None => "/history?type=project&id=P1&limit=25".to_string(),
            };
            let (status, page, _) = request(&app, "GET", &uri, Some(&token), None).await;
            assert_eq!(status, StatusCode::OK);
            let data = page["data"].as_array().unwrap();
            assert_eq!(data.len(), expected_len);
            for entry in data {
                seen.insert(entry["key"].as_str().unwrap().to_string());
            }
            cursor = page["cursor"].as_str().map(str::to_string);
        }
        assert!(cursor.is_none());
        assert_eq!(seen.len(), 60);
    }

    /// An expired token is rejected on any authenticated route, including
    /// the renew endpoint meant to refresh it.
    #[tokio::test]
    async fn s6_expired_token_is_rejected_everywhere() {
        let (state, _dir) = test_state(AuthMode::SingleUser);
        let already_expired = TokenCodec::new(b"test-secret".to_vec(), "api-store", "api-store-clients", -10);
        let now = chrono::Utc::now().timestamp();
        state.users.upsert(&User::default_singleton()).unwrap();
        state.sessions.set("sid-expired", api_store_core::model::Session::Authenticated { uid: "default".to_string() }).unwrap();
        let token = already_expired.sign("sid-expired", now).unwrap();
        let app = test_app(state);

        let (status, _, _) = request(&app, "GET", "/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) = request(&app, "POST", "/sessions/renew", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
