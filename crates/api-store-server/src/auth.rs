//! Axum extractors enforcing the "session" and "session+user" auth tiers of
//! the endpoint table below.

use crate::app_state::AppState;
use crate::http_error::HttpError;
use api_store_core::model::Session;
use api_store_core::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::header::AUTHORIZATION;
use async_trait::async_trait;

/// Any request carrying a token that verifies and names a live session,
/// authenticated or not. Used by `/sessions/renew` and `DELETE /sessions`.
pub struct SessionCtx {
    pub sid: String,
    pub session: Session,
}

fn bearer_token(parts: &Parts) -> Result<&str, HttpError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| HttpError(ApiError::InvalidToken))
}

#[async_trait]
impl FromRequestParts<AppState> for SessionCtx {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let now = chrono::Utc::now().timestamp();
        let claims = state.sessions.tokens().verify(token, now).map_err(HttpError::from)?;
        let session = state
            .sessions
            .get(&claims.sid)
            .map_err(HttpError::from)?
            .ok_or(ApiError::InvalidToken)
            .map_err(HttpError::from)?;
        Ok(SessionCtx { sid: claims.sid, session })
    }
}

/// A session that has completed authentication, carrying the resolved
/// user key. Used by every "session+user" endpoint.
pub struct UserCtx {
    pub sid: String,
    pub uid: String,
}

#[async_trait]
impl FromRequestParts<AppState> for UserCtx {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let ctx = SessionCtx::from_request_parts(parts, state).await?;
        match ctx.session.uid() {
            Some(uid) => Ok(UserCtx { sid: ctx.sid, uid: uid.to_string() }),
            None => Err(HttpError(ApiError::NotAuthorized)),
        }
    }
}
