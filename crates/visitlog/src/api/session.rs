//! Service info, health and login.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::info;

use super::extract::Credentials;
use super::AppState;
use crate::auth::{authenticate, AccessToken};
use crate::error::Result;

pub(super) async fn index() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub(super) async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(super) async fn token(
    State(state): State<AppState>,
    credentials: Credentials,
) -> Result<Json<AccessToken>> {
    let Credentials { login, password } = credentials;
    let user = authenticate(&state.storage, &login, &password).await?;

    info!("Operator {} logged in", user.login);
    Ok(Json(state.tokens.issue(&user)?))
}
