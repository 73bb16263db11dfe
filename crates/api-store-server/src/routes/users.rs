//! `GET /users/me`.

use crate::app_state::AppState;
use crate::auth::UserCtx;
use crate::http_error::HttpError;
use api_store_core::ApiError;
use axum::extract::State;
use axum::Json;

pub async fn me(State(state): State<AppState>, ctx: UserCtx) -> Result<Json<api_store_core::model::User>, HttpError> {
    let user = state.users.read(&ctx.uid).map_err(HttpError::from)?.ok_or(ApiError::NotFound).map_err(HttpError::from)?;
    Ok(Json(user))
}
