//! `GET /shared`.

use crate::app_state::AppState;
use crate::auth::UserCtx;
use crate::http_error::HttpError;
use api_store_core::ApiError;
use axum::extract::State;
use axum::Json;
use serde_json::Value;

pub async fn list(State(state): State<AppState>, ctx: UserCtx) -> Result<Json<Value>, HttpError> {
    let entries = state.shared.list_for_user(&ctx.uid).map_err(HttpError::from)?;
    Ok(Json(serde_json::to_value(entries).map_err(ApiError::from).map_err(HttpError::from)?))
}
