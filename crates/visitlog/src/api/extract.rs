//! Request extractors.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request::Parts,
    },
    Form, Json,
};
use serde::{de::DeserializeOwned, Deserialize};

use super::AppState;
use crate::auth::extract_bearer;
use crate::error::{Error, Result};
use crate::models::User;

/// The operator making the request, authenticated by bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    /// Fail unless the operator is an administrator.
    ///
    /// # Errors
    ///
    /// Returns a forbidden error for non-admin operators.
    pub fn require_admin(&self) -> Result<()> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(Error::forbidden("administrator role required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::unauthorized("missing bearer token"))?;
        let token =
            extract_bearer(header).ok_or_else(|| Error::unauthorized("missing bearer token"))?;
        let claims = state.tokens.verify(token)?;

        let uid = claims.uid;
        let user = state
            .storage
            .call(move |s| s.get_user(uid))
            .await?
            .filter(|user| user.is_active && user.login == claims.sub)
            .ok_or_else(|| Error::unauthorized("user no longer active"))?;
        Ok(Self(user))
    }
}

/// JSON body whose rejections use the API error format.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| Error::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[derive(Debug, Deserialize)]
struct JsonLogin {
    #[serde(alias = "username")]
    login: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct FormLogin {
    username: String,
    password: String,
}

/// Login credentials from a JSON body or an OAuth2-style form.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Operator login.
    pub login: String,
    /// Plain-text password.
    pub password: String,
}

#[async_trait]
impl<S> FromRequest<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(form) = Form::<FormLogin>::from_request(req, state)
                .await
                .map_err(|rejection| Error::validation(rejection.body_text()))?;
            Ok(Self {
                login: form.username,
                password: form.password,
            })
        } else {
            let JsonBody(body) = JsonBody::<JsonLogin>::from_request(req, state).await?;
            Ok(Self {
                login: body.login,
                password: body.password,
            })
        }
    }
}
