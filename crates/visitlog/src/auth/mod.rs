//! Operator authentication.
//!
//! Passwords are stored as Argon2id hashes and sessions are carried by
//! signed bearer tokens.

pub mod password;
pub mod token;

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::User;
use crate::storage::SharedStorage;

pub use password::{hash_password, verify_password};
pub use token::{extract_bearer, AccessToken, Claims, TokenIssuer};

const INVALID_CREDENTIALS: &str = "incorrect login or password";

/// Check a login and password against stored operators.
///
/// Unknown logins, wrong passwords and disabled accounts all fail with the
/// same message. The password hash is checked on its own blocking task, after
/// the storage lock has been released.
///
/// # Errors
///
/// Returns an unauthorized error if the credentials are not accepted.
pub async fn authenticate(storage: &SharedStorage, login: &str, password: &str) -> Result<User> {
    let lookup = login.to_string();
    let Some(user) = storage
        .call(move |s| s.get_user_by_login(&lookup))
        .await?
    else {
        debug!("Login attempt for unknown user {login}");
        return Err(Error::unauthorized(INVALID_CREDENTIALS));
    };

    let candidate = password.to_string();
    let hash = user.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || verify_password(&candidate, &hash))
        .await
        .map_err(|e| Error::internal(format!("password check task failed: {e}")))??;

    if !matches {
        debug!("Wrong password for {login}");
        return Err(Error::unauthorized(INVALID_CREDENTIALS));
    }

    if !user.is_active {
        debug!("Login attempt for disabled user {login}");
        return Err(Error::unauthorized(INVALID_CREDENTIALS));
    }

    Ok(user)
}
