//! Upgrade handlers for the four WebSocket paths. A connection is
//! a pure event sink: the client's own `{operation, value}` frames are
//! logged but never answered directly, since all mutation happens over
//! HTTP and the socket only carries `EventBus` fan-out and errors back.

use crate::app_state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const WRITE_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

fn full_url(path: &str, alt: Option<&str>) -> String {
    match alt {
        Some(alt) => format!("{path}?alt={alt}"),
        None => path.to_string(),
    }
}

fn resolve_identity(state: &AppState, token: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(token) = token else { return (None, None) };
    let now = chrono::Utc::now().timestamp();
    let Ok(claims) = state.sessions.tokens().verify(token, now) else { return (None, None) };
    let Ok(Some(session)) = state.sessions.get(&claims.sid) else { return (None, None) };
    (Some(claims.sid), session.uid().map(str::to_string))
}

pub async fn files_collection(ws: WebSocketUpgrade, State(state): State<AppState>, Query(q): Query<WsQuery>) -> impl IntoResponse {
    upgrade(ws, state, "/files".to_string(), q)
}

pub async fn files_item(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    upgrade(ws, state, format!("/files/{id}"), q)
}

pub async fn history(ws: WebSocketUpgrade, State(state): State<AppState>, Query(q): Query<WsQuery>) -> impl IntoResponse {
    upgrade(ws, state, "/history".to_string(), q)
}

pub async fn auth_login(ws: WebSocketUpgrade, State(state): State<AppState>, Query(q): Query<WsQuery>) -> impl IntoResponse {
    upgrade(ws, state, "/auth/login".to_string(), q)
}

fn upgrade(ws: WebSocketUpgrade, state: AppState, path: String, q: WsQuery) -> axum::response::Response {
    let url = full_url(&path, q.alt.as_deref());
    let (sid, user) = resolve_identity(&state, q.token.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, state, url, sid, user))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, url: String, sid: Option<String>, user: Option<String>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let channel_id = state.ws_clients.register(url.clone(), user.clone(), sid.clone(), tx);

    loop {
        tokio::select! {
            pushed = rx.recv() => {
                let Some(payload) = pushed else { break };
                let send = socket.send(Message::Text(payload));
                if tokio::time::timeout(WRITE_DEADLINE, send).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(frame) = serde_json::from_str::<Value>(&text) {
                            tracing::debug!(url = %url, operation = ?frame.get("operation"), "ws client frame");
                        } else {
                            tracing::debug!(url = %url, "ws client sent non-json frame");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        let frame = error_frame(&e.to_string(), &url);
                        let _ = tokio::time::timeout(WRITE_DEADLINE, socket.send(Message::Text(frame.to_string()))).await;
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.ws_clients.unregister(&channel_id);
}

/// Error push shape: `{error:true, cause, time, path}`.
pub fn error_frame(cause: &str, path: &str) -> Value {
    json!({
        "error": true,
        "cause": cause,
        "time": chrono::Utc::now().to_rfc3339(),
        "path": path,
    })
}
