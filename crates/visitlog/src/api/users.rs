//! Operator accounts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::extract::{AuthUser, JsonBody};
use super::AppState;
use crate::auth::hash_password;
use crate::error::{Error, Result};
use crate::models::{NewUser, User};

pub(super) async fn list(_auth: AuthUser, State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    let users = state.storage.call(|s| s.list_users()).await?;
    Ok(Json(users))
}

pub(super) async fn create(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(new): JsonBody<NewUser>,
) -> Result<(StatusCode, Json<User>)> {
    auth.require_admin()?;
    new.validate()?;

    let password = new.password.clone();
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| Error::internal(format!("password hashing task failed: {e}")))??;

    let user = state
        .storage
        .call(move |s| s.insert_user(&new.login, &hash, new.role, new.full_name.as_deref()))
        .await?;

    info!("{} created {} account {}", auth.0.login, user.role, user.login);
    Ok((StatusCode::CREATED, Json(user)))
}

pub(super) async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

pub(super) async fn get(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>> {
    let user = state
        .storage
        .call(move |s| s.get_user(id))
        .await?
        .ok_or_else(|| Error::not_found("user", id))?;
    Ok(Json(user))
}

pub(super) async fn delete(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    auth.require_admin()?;
    if auth.0.id == id {
        return Err(Error::validation("operators cannot delete their own account"));
    }

    if state.storage.call(move |s| s.delete_user(id)).await? {
        info!("{} deleted user {id}", auth.0.login);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("user", id))
    }
}
