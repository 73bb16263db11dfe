//! `POST /sessions`, `POST /sessions/renew`, `DELETE /sessions`.

use crate::app_state::AppState;
use crate::auth::SessionCtx;
use crate::http_error::HttpError;
use api_store_core::config::AuthMode;
use api_store_core::model::User;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

/// In single-user mode there is no login step: the fresh session is
/// immediately authenticated as the `default` user. The response body
/// is the bare signed token, not a JSON envelope.
pub async fn create(State(state): State<AppState>) -> Result<Json<String>, HttpError> {
    let now = chrono::Utc::now().timestamp();
    let token = match state.config.mode {
        AuthMode::SingleUser => {
            state.users.upsert(&User::default_singleton()).map_err(HttpError::from)?;
            let sid = uuid::Uuid::new_v4().to_string();
            state.sessions.generate_authenticated("default", &sid, now).map_err(HttpError::from)?
        }
        AuthMode::MultiUser => state.sessions.generate_unauthenticated(now).map_err(HttpError::from)?,
    };
    Ok(Json(token))
}

pub async fn renew(State(state): State<AppState>, ctx: SessionCtx) -> Result<Json<String>, HttpError> {
    let now = chrono::Utc::now().timestamp();
    let token = state.sessions.renew(&ctx.sid, now).map_err(HttpError::from)?;
    Ok(Json(token))
}

pub async fn delete(State(state): State<AppState>, ctx: SessionCtx) -> Result<StatusCode, HttpError> {
    state.sessions.delete(&ctx.sid).map_err(HttpError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
