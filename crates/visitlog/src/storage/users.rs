//! Operator accounts.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, warn};

use super::{format_timestamp, is_constraint_violation, parse_timestamp, Storage};
use crate::error::{Error, Result};
use crate::models::{Role, User};

const USER_COLUMNS: &str = "id, login, password_hash, full_name, role, is_active, created_at";

impl Storage {
    /// Insert an operator with an already-hashed password.
    ///
    /// # Errors
    ///
    /// Returns a conflict error if the login is taken.
    pub fn insert_user(
        &self,
        login: &str,
        password_hash: &str,
        role: Role,
        full_name: Option<&str>,
    ) -> Result<User> {
        let created_at = Utc::now();
        self.conn
            .execute(
                r"
                INSERT INTO users (login, password_hash, full_name, role, is_active, created_at)
                VALUES (?1, ?2, ?3, ?4, 1, ?5)
                ",
                params![
                    login,
                    password_hash,
                    full_name,
                    role.to_string(),
                    format_timestamp(created_at),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    Error::conflict(format!("login '{login}' is already registered"))
                } else {
                    e.into()
                }
            })?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted user {login} with id {id}");
        self.get_user(id)?
            .ok_or_else(|| Error::internal("inserted user vanished"))
    }

    /// Get an operator by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get an operator by login.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE login = ?1"),
                [login],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// List all operators ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Enable or disable an operator account.
    ///
    /// Returns `false` if the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_user_active(&self, id: i64, active: bool) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(affected > 0)
    }

    /// Delete an operator.
    ///
    /// Returns `true` if a user was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Count operator accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_users(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM users")
    }
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let role_str: String = row.get(4)?;
    let role = role_str.parse::<Role>().unwrap_or_else(|_| {
        warn!("Unknown role: {role_str}, defaulting to user");
        Role::User
    });
    let created_at: String = row.get(6)?;

    Ok(User {
        id: row.get(0)?,
        login: row.get(1)?,
        password_hash: row.get(2)?,
        full_name: row.get(3)?,
        role,
        is_active: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
    })
}
