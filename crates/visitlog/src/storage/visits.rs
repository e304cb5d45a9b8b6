//! Photo-driven visits.

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, OptionalExtension, Row};
use tracing::debug;

use super::{
    format_timestamp, parse_optional_timestamp, parse_timestamp, sql_limit, Storage,
};
use crate::error::{Error, Result};
use crate::models::Visit;

const VISIT_COLUMNS: &str =
    "id, photo_path, time_in, time_out, duration_seconds, person_data, image_hash, exited";

impl Storage {
    /// Open a visit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_visit(
        &self,
        photo_path: &str,
        time_in: DateTime<Utc>,
        image_hash: Option<&str>,
        person_data: Option<&serde_json::Value>,
    ) -> Result<Visit> {
        let person_data = person_data.map(serde_json::to_string).transpose()?;

        self.conn.execute(
            r"
            INSERT INTO visits (photo_path, time_in, person_data, image_hash, exited)
            VALUES (?1, ?2, ?3, ?4, 0)
            ",
            params![photo_path, format_timestamp(time_in), person_data, image_hash],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Opened visit {id} for {photo_path}");
        self.get_visit_required(id)
    }

    /// Get a visit by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_visit(&self, id: i64) -> Result<Option<Visit>> {
        let visit = self
            .conn
            .query_row(
                &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = ?1"),
                [id],
                row_to_visit,
            )
            .optional()?;
        Ok(visit)
    }

    /// Get a visit by id, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown id.
    pub fn get_visit_required(&self, id: i64) -> Result<Visit> {
        self.get_visit(id)?
            .ok_or_else(|| Error::not_found("visit", id))
    }

    /// List visits, most recent check-in first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_visits(&self, limit: usize, open_only: bool) -> Result<Vec<Visit>> {
        let filter = if open_only { "WHERE exited = 0" } else { "" };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits {filter} ORDER BY time_in DESC, id DESC LIMIT ?1"
        ))?;
        let visits = stmt
            .query_map([sql_limit(limit)], row_to_visit)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(visits)
    }

    /// All visits not yet checked out.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn open_visits(&self) -> Result<Vec<Visit>> {
        self.list_visits(usize::MAX, true)
    }

    /// Persist the check-out fields of a visit.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the visit no longer exists.
    pub fn update_visit_checkout(&self, visit: &Visit) -> Result<()> {
        let affected = self.conn.execute(
            r"
            UPDATE visits SET time_out = ?1, duration_seconds = ?2, exited = ?3
            WHERE id = ?4
            ",
            params![
                visit.time_out.map(format_timestamp),
                visit.duration_seconds,
                visit.exited,
                visit.id,
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("visit", visit.id));
        }
        Ok(())
    }

    /// Delete a visit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_visit(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM visits WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Count visits.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_visits(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM visits")
    }

    /// Count visits not yet checked out.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_open_visits(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM visits WHERE exited = 0")
    }
}

fn row_to_visit(row: &Row) -> rusqlite::Result<Visit> {
    let time_in: String = row.get(2)?;
    let person_data: Option<String> = row.get(5)?;
    let person_data = person_data
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Visit {
        id: row.get(0)?,
        photo_path: row.get(1)?,
        time_in: parse_timestamp(2, &time_in)?,
        time_out: parse_optional_timestamp(3, row.get(3)?)?,
        duration_seconds: row.get(4)?,
        person_data,
        image_hash: row.get(6)?,
        exited: row.get(7)?,
    })
}
