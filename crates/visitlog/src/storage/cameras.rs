//! Registered cameras.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, warn};

use super::{format_timestamp, parse_timestamp, Storage};
use crate::error::{Error, Result};
use crate::models::{Camera, CameraStatus, CameraType, CameraUpdate, NewCamera};

const CAMERA_COLUMNS: &str = "id, name, ip, camera_type, location, status, created_at";

impl Storage {
    /// Register a camera. New cameras start inactive.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_camera(&self, new: &NewCamera) -> Result<Camera> {
        self.conn.execute(
            r"
            INSERT INTO cameras (name, ip, camera_type, location, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                new.name,
                new.ip,
                new.camera_type.to_string(),
                new.location,
                CameraStatus::Inactive.to_string(),
                format_timestamp(Utc::now()),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted camera {} with id {id}", new.name);
        self.get_camera_required(id)
    }

    /// Get a camera by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_camera(&self, id: i64) -> Result<Option<Camera>> {
        let camera = self
            .conn
            .query_row(
                &format!("SELECT {CAMERA_COLUMNS} FROM cameras WHERE id = ?1"),
                [id],
                row_to_camera,
            )
            .optional()?;
        Ok(camera)
    }

    /// Get a camera by id, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown id.
    pub fn get_camera_required(&self, id: i64) -> Result<Camera> {
        self.get_camera(id)?
            .ok_or_else(|| Error::not_found("camera", id))
    }

    /// List all cameras ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_cameras(&self) -> Result<Vec<Camera>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CAMERA_COLUMNS} FROM cameras ORDER BY id"))?;
        let cameras = stmt
            .query_map([], row_to_camera)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cameras)
    }

    /// Apply a partial update to a camera.
    ///
    /// Returns `None` if the camera does not exist.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty fields, or a database error.
    pub fn update_camera(&self, id: i64, update: CameraUpdate) -> Result<Option<Camera>> {
        let Some(mut camera) = self.get_camera(id)? else {
            return Ok(None);
        };
        update.apply(&mut camera)?;

        self.conn.execute(
            "UPDATE cameras SET name = ?1, ip = ?2, camera_type = ?3, location = ?4 WHERE id = ?5",
            params![
                camera.name,
                camera.ip,
                camera.camera_type.to_string(),
                camera.location,
                id,
            ],
        )?;
        Ok(Some(camera))
    }

    /// Set a camera's status.
    ///
    /// Returns `false` if the camera does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_camera_status(&self, id: i64, status: CameraStatus) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE cameras SET status = ?1 WHERE id = ?2",
            params![status.to_string(), id],
        )?;
        Ok(affected > 0)
    }

    /// Delete a camera.
    ///
    /// Returns `true` if a camera was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns a conflict error while visitors still reference the camera.
    pub fn delete_camera(&self, id: i64) -> Result<bool> {
        let referencing: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM visitors WHERE camera_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        if referencing > 0 {
            return Err(Error::conflict(format!(
                "camera {id} is referenced by {referencing} visitor record(s)"
            )));
        }

        let affected = self.conn.execute("DELETE FROM cameras WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Count registered cameras.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_cameras(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM cameras")
    }
}

fn row_to_camera(row: &Row) -> rusqlite::Result<Camera> {
    let type_str: String = row.get(3)?;
    let camera_type = match type_str.as_str() {
        "ip" => CameraType::Ip,
        "cloud" => CameraType::Cloud,
        _ => {
            warn!("Unknown camera type: {type_str}, defaulting to ip");
            CameraType::Ip
        }
    };
    let status_str: String = row.get(5)?;
    let status = match status_str.as_str() {
        "active" => CameraStatus::Active,
        _ => CameraStatus::Inactive,
    };
    let created_at: String = row.get(6)?;

    Ok(Camera {
        id: row.get(0)?,
        name: row.get(1)?,
        ip: row.get(2)?,
        camera_type,
        location: row.get(4)?,
        status,
        created_at: parse_timestamp(6, &created_at)?,
    })
}
