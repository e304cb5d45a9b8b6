//! Core record types for visitlog.
//!
//! Operators (`User`), the cameras they manage, visitors registered at a
//! camera, and photo-driven visits that are checked in and out automatically.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Access level of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May manage users and cameras.
    Admin,
    /// May register visitors and read records.
    #[default]
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(Error::validation(format!("unknown role: {other}"))),
        }
    }
}

/// An operator account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Row id.
    pub id: i64,
    /// Unique login name.
    pub login: String,
    /// Argon2 PHC hash; never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name.
    pub full_name: Option<String>,
    /// Access level.
    pub role: Role,
    /// Disabled accounts cannot log in.
    pub is_active: bool,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this user has administrative rights.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Request to create an operator.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Unique login name.
    pub login: String,
    /// Plain-text password, hashed before storage.
    pub password: String,
    /// Access level.
    #[serde(default)]
    pub role: Role,
    /// Display name.
    #[serde(default)]
    pub full_name: Option<String>,
}

impl NewUser {
    /// Check the request before it reaches storage.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty login or a short password.
    pub fn validate(&self) -> Result<()> {
        if self.login.trim().is_empty() {
            return Err(Error::validation("login must not be empty"));
        }
        if self.login.chars().any(char::is_whitespace) {
            return Err(Error::validation("login must not contain whitespace"));
        }
        if self.password.chars().count() < 6 {
            return Err(Error::validation(
                "password must be at least 6 characters",
            ));
        }
        Ok(())
    }
}

/// How a camera delivers snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraType {
    /// Camera reachable over the local network.
    #[default]
    Ip,
    /// Camera managed by a cloud vendor; `ip` holds the device serial.
    Cloud,
}

impl std::fmt::Display for CameraType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ip => write!(f, "ip"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

/// Whether a camera is currently in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraStatus {
    /// Started by an operator.
    Active,
    /// Stopped, or never started.
    #[default]
    Inactive,
}

impl std::fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// A registered camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Camera {
    /// Row id.
    pub id: i64,
    /// Human-readable name.
    pub name: String,
    /// Network address, stream URL, or cloud device serial.
    pub ip: String,
    /// Snapshot transport.
    #[serde(rename = "type")]
    pub camera_type: CameraType,
    /// Where the camera is mounted.
    pub location: Option<String>,
    /// Current status.
    pub status: CameraStatus,
    /// When the camera was registered.
    pub created_at: DateTime<Utc>,
}

/// Request to register a camera.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCamera {
    /// Human-readable name.
    pub name: String,
    /// Network address, stream URL, or cloud device serial.
    pub ip: String,
    /// Snapshot transport.
    #[serde(rename = "type", default)]
    pub camera_type: CameraType,
    /// Where the camera is mounted.
    #[serde(default)]
    pub location: Option<String>,
}

impl NewCamera {
    /// Check the request before it reaches storage.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name or address.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("camera name must not be empty"));
        }
        if self.ip.trim().is_empty() {
            return Err(Error::validation("camera address must not be empty"));
        }
        Ok(())
    }
}

/// Partial camera update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CameraUpdate {
    /// New name.
    pub name: Option<String>,
    /// New address.
    pub ip: Option<String>,
    /// New transport.
    #[serde(rename = "type")]
    pub camera_type: Option<CameraType>,
    /// New location.
    pub location: Option<String>,
}

impl CameraUpdate {
    /// Apply this update to an existing camera.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a provided name or address is empty.
    pub fn apply(self, camera: &mut Camera) -> Result<()> {
        if let Some(name) = self.name {
            if name.trim().is_empty() {
                return Err(Error::validation("camera name must not be empty"));
            }
            camera.name = name;
        }
        if let Some(ip) = self.ip {
            if ip.trim().is_empty() {
                return Err(Error::validation("camera address must not be empty"));
            }
            camera.ip = ip;
        }
        if let Some(camera_type) = self.camera_type {
            camera.camera_type = camera_type;
        }
        if let Some(location) = self.location {
            camera.location = Some(location);
        }
        Ok(())
    }
}

/// A visitor registered by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Visitor {
    /// Row id.
    pub id: i64,
    /// Visitor's name.
    pub full_name: String,
    /// Camera at the entrance used.
    pub camera_id: i64,
    /// Free-form notes.
    pub notes: Option<String>,
    /// When the visitor came in.
    pub entry_time: DateTime<Utc>,
    /// When the visitor left.
    pub exit_time: Option<DateTime<Utc>>,
    /// Path of the stored photo.
    pub photo: Option<String>,
    /// Login of the operator who registered the visitor.
    pub operator: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl Visitor {
    /// Whether the visitor is still on the premises.
    #[must_use]
    pub fn is_inside(&self) -> bool {
        self.exit_time.is_none()
    }

    /// Time spent on the premises, once the visitor has left.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.exit_time.map(|exit| exit - self.entry_time)
    }
}

/// Request to register a visitor.
#[derive(Debug, Clone, Deserialize)]
pub struct NewVisitor {
    /// Visitor's name.
    pub full_name: String,
    /// Camera at the entrance used.
    pub camera_id: i64,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewVisitor {
    /// Check the request before it reaches storage.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name.
    pub fn validate(&self) -> Result<()> {
        if self.full_name.trim().is_empty() {
            return Err(Error::validation("full_name must not be empty"));
        }
        Ok(())
    }
}

/// A visit detected from a photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    /// Row id.
    pub id: i64,
    /// Path of the stored photo.
    pub photo_path: String,
    /// Check-in time.
    pub time_in: DateTime<Utc>,
    /// Check-out time.
    pub time_out: Option<DateTime<Utc>>,
    /// Whole seconds between check-in and check-out.
    pub duration_seconds: Option<i64>,
    /// Detection details recorded at check-in.
    pub person_data: Option<serde_json::Value>,
    /// Perceptual hash of the face photo, as hex.
    pub image_hash: Option<String>,
    /// Set once the visit is checked out.
    pub exited: bool,
}

impl Visit {
    /// Close this visit at `at`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the visit is already closed or `at`
    /// precedes the check-in.
    pub fn check_out(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.exited {
            return Err(Error::validation(format!(
                "visit {} is already checked out",
                self.id
            )));
        }
        if at < self.time_in {
            return Err(Error::validation(
                "check-out time precedes check-in time",
            ));
        }
        self.time_out = Some(at);
        self.duration_seconds = Some((at - self.time_in).num_seconds());
        self.exited = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_visit() -> Visit {
        Visit {
            id: 1,
            photo_path: "photos/visitor_20240101_090000.jpg".to_string(),
            time_in: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            time_out: None,
            duration_seconds: None,
            person_data: None,
            image_hash: None,
            exited: false,
        }
    }

    #[test]
    fn test_role_display_and_parse() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_default_is_user() {
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_user_password_hash_not_serialized() {
        let user = User {
            id: 1,
            login: "guard".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            full_name: None,
            role: Role::User,
            is_active: true,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_new_user_validate() {
        let mut new = NewUser {
            login: "guard".to_string(),
            password: "hunter22".to_string(),
            role: Role::User,
            full_name: None,
        };
        assert!(new.validate().is_ok());

        new.password = "abc".to_string();
        assert!(new.validate().is_err());

        new.password = "hunter22".to_string();
        new.login = "two words".to_string();
        assert!(new.validate().is_err());
    }

    #[test]
    fn test_camera_type_json_field_name() {
        let new: NewCamera =
            serde_json::from_str(r#"{"name": "Lobby", "ip": "10.0.0.5", "type": "cloud"}"#)
                .unwrap();
        assert_eq!(new.camera_type, CameraType::Cloud);

        let new: NewCamera = serde_json::from_str(r#"{"name": "Lobby", "ip": "10.0.0.5"}"#).unwrap();
        assert_eq!(new.camera_type, CameraType::Ip);
    }

    #[test]
    fn test_unknown_camera_type_rejected() {
        let result: std::result::Result<NewCamera, _> =
            serde_json::from_str(r#"{"name": "Lobby", "ip": "10.0.0.5", "type": "usb"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_camera_update_apply() {
        let mut camera = Camera {
            id: 3,
            name: "Lobby".to_string(),
            ip: "10.0.0.5".to_string(),
            camera_type: CameraType::Ip,
            location: None,
            status: CameraStatus::Inactive,
            created_at: Utc::now(),
        };
        let update = CameraUpdate {
            location: Some("Front desk".to_string()),
            ..CameraUpdate::default()
        };
        update.apply(&mut camera).unwrap();
        assert_eq!(camera.location.as_deref(), Some("Front desk"));
        assert_eq!(camera.name, "Lobby");

        let bad = CameraUpdate {
            name: Some("  ".to_string()),
            ..CameraUpdate::default()
        };
        assert!(bad.apply(&mut camera).is_err());
    }

    #[test]
    fn test_visitor_duration() {
        let entry = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let mut visitor = Visitor {
            id: 1,
            full_name: "Ada".to_string(),
            camera_id: 1,
            notes: None,
            entry_time: entry,
            exit_time: None,
            photo: None,
            operator: None,
            created_at: entry,
        };
        assert!(visitor.is_inside());
        assert!(visitor.duration().is_none());

        visitor.exit_time = Some(entry + Duration::minutes(45));
        assert!(!visitor.is_inside());
        assert_eq!(visitor.duration(), Some(Duration::minutes(45)));
    }

    #[test]
    fn test_visit_check_out() {
        let mut visit = sample_visit();
        let out = visit.time_in + Duration::seconds(3725);

        visit.check_out(out).unwrap();
        assert!(visit.exited);
        assert_eq!(visit.time_out, Some(out));
        assert_eq!(visit.duration_seconds, Some(3725));
    }

    #[test]
    fn test_visit_check_out_twice_fails() {
        let mut visit = sample_visit();
        let out = visit.time_in + Duration::seconds(10);
        visit.check_out(out).unwrap();

        let err = visit.check_out(out).unwrap_err();
        assert!(err.to_string().contains("already checked out"));
    }

    #[test]
    fn test_visit_check_out_before_check_in_fails() {
        let mut visit = sample_visit();
        let before = visit.time_in - Duration::seconds(1);
        assert!(visit.check_out(before).is_err());
        assert!(!visit.exited);
    }
}
