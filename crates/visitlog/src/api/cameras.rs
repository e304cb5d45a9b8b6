//! Camera registry, start/stop and snapshots.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use super::extract::{AuthUser, JsonBody};
use super::AppState;
use crate::error::{Error, Result};
use crate::models::{Camera, CameraUpdate, NewCamera};
use crate::vision::ProcessedPhoto;

pub(super) async fn list(_auth: AuthUser, State(state): State<AppState>) -> Result<Json<Vec<Camera>>> {
    Ok(Json(state.storage.call(|s| s.list_cameras()).await?))
}

pub(super) async fn create(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(new): JsonBody<NewCamera>,
) -> Result<(StatusCode, Json<Camera>)> {
    auth.require_admin()?;
    new.validate()?;
    let camera = state.storage.call(move |s| s.insert_camera(&new)).await?;
    Ok((StatusCode::CREATED, Json(camera)))
}

pub(super) async fn get(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Camera>> {
    Ok(Json(
        state.storage.call(move |s| s.get_camera_required(id)).await?,
    ))
}

pub(super) async fn update(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(update): JsonBody<CameraUpdate>,
) -> Result<Json<Camera>> {
    auth.require_admin()?;
    let camera = state
        .storage
        .call(move |s| s.update_camera(id, update))
        .await?
        .ok_or_else(|| Error::not_found("camera", id))?;
    Ok(Json(camera))
}

pub(super) async fn delete(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    auth.require_admin()?;
    if state.storage.call(move |s| s.delete_camera(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("camera", id))
    }
}

pub(super) async fn start(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let status = if state.cameras.start(id).await? {
        "started"
    } else {
        "failed"
    };
    Ok(Json(json!({ "status": status })))
}

pub(super) async fn stop(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let status = if state.cameras.stop(id).await? {
        "stopped"
    } else {
        "failed"
    };
    Ok(Json(json!({ "status": status })))
}

pub(super) async fn snapshot(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProcessedPhoto>> {
    let frame = state.cameras.snapshot(id).await?;
    Ok(Json(state.photos.process(&frame, Utc::now()).await?))
}
