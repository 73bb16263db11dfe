//! `GET /history?type=&id=&since=&cursor=`.

use crate::app_state::AppState;
use crate::auth::UserCtx;
use crate::http_error::HttpError;
use api_store_core::model::HistoryType;
use api_store_core::stores::ListOptions;
use api_store_core::ApiError;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "type")]
    pub history_type: HistoryType,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub options: ListOptions,
}

pub async fn list(State(state): State<AppState>, _ctx: UserCtx, Query(q): Query<HistoryQuery>) -> Result<Json<Value>, HttpError> {
    let page = state.history.list(q.history_type, q.id.as_deref(), &q.options).map_err(HttpError::from)?;
    Ok(Json(serde_json::to_value(page).map_err(ApiError::from).map_err(HttpError::from)?))
}
