//! `GET /backend`, unauthenticated.

use crate::app_state::AppState;
use api_store_core::backend_info::BackendInfo;
use axum::extract::State;
use axum::Json;

pub async fn get(State(state): State<AppState>) -> Json<BackendInfo> {
    Json(BackendInfo::from_config(&state.config))
}
