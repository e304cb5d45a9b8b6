//! Visitors registered by operators.

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Value, OptionalExtension, Row};
use tracing::debug;

use super::{
    format_timestamp, parse_optional_timestamp, parse_timestamp, sql_limit, Storage,
};
use crate::error::{Error, Result};
use crate::models::{NewVisitor, Visitor};

const VISITOR_COLUMNS: &str =
    "id, full_name, camera_id, notes, entry_time, exit_time, photo, operator, created_at";

/// Filter for [`Storage::list_visitors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitorFilter {
    /// Only visitors registered at this camera.
    pub camera_id: Option<i64>,
    /// Only visitors without an exit time.
    pub inside_only: bool,
    /// Maximum number of rows.
    pub limit: usize,
}

impl Default for VisitorFilter {
    fn default() -> Self {
        Self {
            camera_id: None,
            inside_only: false,
            limit: 100,
        }
    }
}

impl Storage {
    /// Register a visitor.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the camera does not exist.
    pub fn insert_visitor(
        &self,
        new: &NewVisitor,
        operator: Option<&str>,
        photo: Option<&str>,
        entry_time: DateTime<Utc>,
    ) -> Result<Visitor> {
        self.get_camera_required(new.camera_id)?;

        self.conn.execute(
            r"
            INSERT INTO visitors
                (full_name, camera_id, notes, entry_time, exit_time, photo, operator, created_at)
            VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7)
            ",
            params![
                new.full_name,
                new.camera_id,
                new.notes,
                format_timestamp(entry_time),
                photo,
                operator,
                format_timestamp(Utc::now()),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted visitor {id} at camera {}", new.camera_id);
        self.get_visitor_required(id)
    }

    /// Get a visitor by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_visitor(&self, id: i64) -> Result<Option<Visitor>> {
        let visitor = self
            .conn
            .query_row(
                &format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE id = ?1"),
                [id],
                row_to_visitor,
            )
            .optional()?;
        Ok(visitor)
    }

    /// Get a visitor by id, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown id.
    pub fn get_visitor_required(&self, id: i64) -> Result<Visitor> {
        self.get_visitor(id)?
            .ok_or_else(|| Error::not_found("visitor", id))
    }

    /// List visitors, most recent entry first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_visitors(&self, filter: VisitorFilter) -> Result<Vec<Visitor>> {
        let mut sql = format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE 1 = 1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(camera_id) = filter.camera_id {
            args.push(Value::Integer(camera_id));
            sql.push_str(&format!(" AND camera_id = ?{}", args.len()));
        }
        if filter.inside_only {
            sql.push_str(" AND exit_time IS NULL");
        }
        args.push(Value::Integer(sql_limit(filter.limit)));
        sql.push_str(&format!(
            " ORDER BY entry_time DESC, id DESC LIMIT ?{}",
            args.len()
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let visitors = stmt
            .query_map(rusqlite::params_from_iter(args), row_to_visitor)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(visitors)
    }

    /// Record a visitor's exit.
    ///
    /// Returns `None` if the visitor does not exist.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the visitor already left or `at`
    /// precedes the entry time.
    pub fn set_visitor_exit(&self, id: i64, at: DateTime<Utc>) -> Result<Option<Visitor>> {
        let Some(mut visitor) = self.get_visitor(id)? else {
            return Ok(None);
        };
        if !visitor.is_inside() {
            return Err(Error::validation(format!("visitor {id} has already left")));
        }
        if at < visitor.entry_time {
            return Err(Error::validation("exit time precedes entry time"));
        }

        self.conn.execute(
            "UPDATE visitors SET exit_time = ?1 WHERE id = ?2",
            params![format_timestamp(at), id],
        )?;
        visitor.exit_time = Some(parse_timestamp(0, &format_timestamp(at))?);
        Ok(Some(visitor))
    }

    /// Attach a photo to a visitor.
    ///
    /// Returns `false` if the visitor does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_visitor_photo(&self, id: i64, photo: &str) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE visitors SET photo = ?1 WHERE id = ?2",
            params![photo, id],
        )?;
        Ok(affected > 0)
    }

    /// Delete a visitor.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_visitor(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM visitors WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Count visitor records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_visitors(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM visitors")
    }

    /// Count visitors still on the premises.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_visitors_inside(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM visitors WHERE exit_time IS NULL")
    }
}

fn row_to_visitor(row: &Row) -> rusqlite::Result<Visitor> {
    let entry_time: String = row.get(4)?;
    let created_at: String = row.get(8)?;

    Ok(Visitor {
        id: row.get(0)?,
        full_name: row.get(1)?,
        camera_id: row.get(2)?,
        notes: row.get(3)?,
        entry_time: parse_timestamp(4, &entry_time)?,
        exit_time: parse_optional_timestamp(5, row.get(5)?)?,
        photo: row.get(6)?,
        operator: row.get(7)?,
        created_at: parse_timestamp(8, &created_at)?,
    })
}
