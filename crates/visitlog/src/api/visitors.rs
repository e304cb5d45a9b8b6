//! Visitors registered by operators.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use super::extract::{AuthUser, JsonBody};
use super::AppState;
use crate::error::{Error, Result};
use crate::models::{NewVisitor, Visitor};
use crate::storage::VisitorFilter;

#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    camera_id: Option<i64>,
    #[serde(default)]
    inside: bool,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateQuery {
    #[serde(default)]
    capture: bool,
}

pub(super) async fn list(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Visitor>>> {
    let filter = VisitorFilter {
        camera_id: query.camera_id,
        inside_only: query.inside,
        limit: query.limit.unwrap_or(VisitorFilter::default().limit),
    };
    Ok(Json(state.storage.call(move |s| s.list_visitors(filter)).await?))
}

pub(super) async fn create(
    AuthUser(operator): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<CreateQuery>,
    JsonBody(new): JsonBody<NewVisitor>,
) -> Result<(StatusCode, Json<Visitor>)> {
    new.validate()?;
    let now = Utc::now();

    let photo = if query.capture {
        match capture_photo(&state, new.camera_id).await {
            Ok(name) => Some(name),
            Err(e) if e.is_not_found() => return Err(e),
            Err(e) => {
                warn!("Registering visitor without photo: {e}");
                None
            }
        }
    } else {
        None
    };

    let login = operator.login;
    let visitor = state
        .storage
        .call(move |s| s.insert_visitor(&new, Some(&login), photo.as_deref(), now))
        .await?;

    info!(
        "Visitor {} registered at camera {} by {}",
        visitor.id,
        visitor.camera_id,
        visitor.operator.as_deref().unwrap_or("unknown")
    );
    Ok((StatusCode::CREATED, Json(visitor)))
}

async fn capture_photo(state: &AppState, camera_id: i64) -> Result<String> {
    let frame = state.cameras.snapshot(camera_id).await?;
    let photo = state.photos.process(&frame, Utc::now()).await?;
    Ok(photo.file_name)
}

pub(super) async fn get(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Visitor>> {
    Ok(Json(
        state.storage.call(move |s| s.get_visitor_required(id)).await?,
    ))
}

pub(super) async fn exit(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Visitor>> {
    let now = Utc::now();
    let visitor = state
        .storage
        .call(move |s| s.set_visitor_exit(id, now))
        .await?
        .ok_or_else(|| Error::not_found("visitor", id))?;
    Ok(Json(visitor))
}

pub(super) async fn upload_photo(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Visitor>> {
    state.storage.call(move |s| s.get_visitor_required(id)).await?;

    let photo = state.photos.process(&body, Utc::now()).await?;
    let file_name = photo.file_name.clone();
    let attached = state
        .storage
        .call(move |s| {
            s.set_visitor_photo(id, &file_name)?;
            s.get_visitor_required(id)
        })
        .await;
    if attached.is_err() {
        state.photos.store().discard(&photo.path);
    }
    Ok(Json(attached?))
}

pub(super) async fn delete(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    auth.require_admin()?;
    if state.storage.call(move |s| s.delete_visitor(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("visitor", id))
    }
}
