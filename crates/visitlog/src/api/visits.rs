//! Photo-driven visits.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use super::extract::AuthUser;
use super::AppState;
use crate::error::{Error, Result};
use crate::models::Visit;
use crate::visits::VisitOutcome;

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    #[serde(default)]
    open: bool,
    limit: Option<usize>,
}

pub(super) async fn list(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Visit>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let open = query.open;
    Ok(Json(
        state.storage.call(move |s| s.list_visits(limit, open)).await?,
    ))
}

pub(super) async fn get(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Visit>> {
    Ok(Json(
        state.storage.call(move |s| s.get_visit_required(id)).await?,
    ))
}

pub(super) async fn upload(
    _auth: AuthUser,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<VisitOutcome>> {
    if body.is_empty() {
        return Err(Error::validation("request body must contain an image"));
    }
    Ok(Json(state.visits.register(&body, Utc::now()).await?))
}

pub(super) async fn capture(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(camera_id): Path<i64>,
) -> Result<Json<VisitOutcome>> {
    Ok(Json(state.visits.capture(camera_id, Utc::now()).await?))
}

pub(super) async fn check_out(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Visit>> {
    Ok(Json(state.visits.check_out(id, Utc::now()).await?))
}

pub(super) async fn delete(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    auth.require_admin()?;
    if state.storage.call(move |s| s.delete_visit(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("visit", id))
    }
}
