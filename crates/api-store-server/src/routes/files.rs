//! `/files` and `/files/:id` metadata, contents (`?alt=media`), sharing,
//! and revisions.

use crate::app_state::AppState;
use crate::auth::UserCtx;
use crate::http_error::HttpError;
use api_store_core::model::Role;
use api_store_core::stores::files::AccessOp;
use api_store_core::stores::ListOptions;
use api_store_core::ApiError;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct AltQuery {
    #[serde(default)]
    pub alt: Option<String>,
}

fn is_media(q: &AltQuery) -> bool {
    q.alt.as_deref() == Some("media")
}

#[derive(Debug, Deserialize)]
pub struct CreateFileBody {
    pub key: String,
    pub kind: String,
    #[serde(default)]
    pub info: Value,
    #[serde(default)]
    pub parent: Option<String>,
}

pub async fn list(State(state): State<AppState>, ctx: UserCtx, Query(options): Query<ListOptions>) -> Result<Json<Value>, HttpError> {
    let page = state.files.list(&ctx.uid, &options).map_err(HttpError::from)?;
    Ok(Json(serde_json::to_value(page).map_err(ApiError::from).map_err(HttpError::from)?))
}

pub async fn create(State(state): State<AppState>, ctx: UserCtx, Json(body): Json<CreateFileBody>) -> Result<Response, HttpError> {
    let file = state
        .files
        .add(&body.key, &body.kind, body.info, &ctx.uid, body.parent.as_deref())
        .map_err(HttpError::from)?;
    if body.kind == "HttpProject" {
        state.contents.add(&body.key, Value::Object(Default::default()), &ctx.uid).map_err(HttpError::from)?;
    }
    let location = format!("/files/{}", file.key);
    Ok((StatusCode::NO_CONTENT, [(header::LOCATION, location)]).into_response())
}

pub async fn get(
    State(state): State<AppState>,
    ctx: UserCtx,
    Path(id): Path<String>,
    Query(q): Query<AltQuery>,
) -> Result<Json<Value>, HttpError> {
    if is_media(&q) {
        state.files.ensure_role(&ctx.uid, &id, Role::Reader).map_err(HttpError::from)?;
        let contents = state.projects_cache.read(&id).map_err(HttpError::from)?.ok_or(ApiError::NotFound).map_err(HttpError::from)?;
        Ok(Json(serde_json::to_value(contents).map_err(ApiError::from).map_err(HttpError::from)?))
    } else {
        let file = state.files.read(&id, &ctx.uid).map_err(HttpError::from)?;
        Ok(Json(serde_json::to_value(file).map_err(ApiError::from).map_err(HttpError::from)?))
    }
}

pub async fn patch(
    State(state): State<AppState>,
    ctx: UserCtx,
    Path(id): Path<String>,
    Query(q): Query<AltQuery>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, HttpError> {
    let revert = if is_media(&q) {
        state.files.ensure_role(&ctx.uid, &id, Role::Writer).map_err(HttpError::from)?;
        let revert = state.contents.apply_patch(&id, &patch, &ctx.uid).map_err(HttpError::from)?;
        state.projects_cache.invalidate(&id);
        revert
    } else {
        state.files.apply_patch(&id, &patch, &ctx.uid).map_err(HttpError::from)?
    };
    Ok(Json(json!({ "status": "OK", "revert": revert })))
}

pub async fn delete(
    State(state): State<AppState>,
    ctx: UserCtx,
    Path(id): Path<String>,
    Query(q): Query<AltQuery>,
) -> Result<StatusCode, HttpError> {
    if is_media(&q) {
        state.files.ensure_role(&ctx.uid, &id, Role::Owner).map_err(HttpError::from)?;
        state.contents.delete(&id, &ctx.uid).map_err(HttpError::from)?;
        state.projects_cache.invalidate(&id);
    } else {
        state.files.delete(&id, &ctx.uid).map_err(HttpError::from)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_access(State(state): State<AppState>, ctx: UserCtx, Path(id): Path<String>) -> Result<Json<Value>, HttpError> {
    let file = state.files.ensure_role(&ctx.uid, &id, Role::Owner).map_err(HttpError::from)?;
    Ok(Json(serde_json::to_value(file.attached_permissions).map_err(ApiError::from).map_err(HttpError::from)?))
}

pub async fn patch_access(
    State(state): State<AppState>,
    ctx: UserCtx,
    Path(id): Path<String>,
    Json(ops): Json<Vec<AccessOp>>,
) -> Result<StatusCode, HttpError> {
    state.files.patch_access(&id, &ops, &ctx.uid).map_err(HttpError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn revisions(
    State(state): State<AppState>,
    ctx: UserCtx,
    Path(id): Path<String>,
    Query(options): Query<ListOptions>,
) -> Result<Json<Value>, HttpError> {
    let file = state.files.ensure_role(&ctx.uid, &id, Role::Reader).map_err(HttpError::from)?;
    let page = state.revisions.list(&file.kind, &id, &options).map_err(HttpError::from)?;
    Ok(Json(serde_json::to_value(page).map_err(ApiError::from).map_err(HttpError::from)?))
}
