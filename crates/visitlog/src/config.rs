//! Configuration management for visitlog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "visitlog";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "visitlog.db";

/// Default photo directory name.
const PHOTO_DIR_NAME: &str = "photos";

/// Minimum accepted length of a token signing secret.
pub const MIN_SECRET_LEN: usize = 32;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. `PORT` and `SECRET_KEY` environment variables
/// 2. Environment variables prefixed with `VISITLOG_` (nested with `__`)
/// 3. TOML config file at `~/.config/visitlog/config.toml`
/// 4. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Camera configuration.
    pub camera: CameraConfig,
    /// Face detection and photo configuration.
    pub vision: VisionConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Allow cross-origin requests from any origin.
    pub cors_allow_any_origin: bool,
    /// Largest accepted request body (photo uploads).
    pub max_upload_bytes: usize,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/visitlog/visitlog.db`
    pub database_path: Option<PathBuf>,
    /// Directory where visitor photos are written.
    /// Defaults to `~/.local/share/visitlog/photos`
    pub photo_dir: Option<PathBuf>,
}

/// Authentication configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign access tokens.
    pub secret_key: Option<String>,
    /// Lifetime of an access token in minutes.
    pub token_expiry_minutes: u64,
}

/// Camera configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Timeout for a single snapshot request in seconds.
    pub snapshot_timeout_secs: u64,
    /// URL paths tried in order against `http://{ip}` for IP cameras.
    pub snapshot_paths: Vec<String>,
    /// Cloud vendor account, required for `cloud` cameras.
    pub cloud: Option<CloudConfig>,
}

/// Cloud camera vendor account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Base URL of the vendor open API.
    pub endpoint: String,
    /// Application key.
    pub app_key: String,
    /// Application secret.
    pub app_secret: String,
    /// Camera channel number.
    #[serde(default = "default_channel")]
    pub channel: u32,
}

/// Which face detector to run on incoming frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// No detection; full frames are stored.
    #[default]
    None,
    /// HTTP face detection service.
    Remote,
}

/// Face detection and photo configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Detector implementation.
    pub detector: DetectorKind,
    /// URL of the remote detector.
    pub detector_url: Option<String>,
    /// Maximum hash distance at which two photos are the same person.
    pub match_threshold: u32,
    /// JPEG quality for stored photos.
    pub jpeg_quality: u8,
}

fn default_channel() -> u32 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
            cors_allow_any_origin: true,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            token_expiry_minutes: 30,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            snapshot_timeout_secs: 10,
            snapshot_paths: vec![
                "/snapshot.jpg".to_string(),
                "/video".to_string(),
                "/".to_string(),
            ],
            cloud: None,
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::None,
            detector_url: None,
            match_threshold: 10,
            jpeg_quality: 90,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("VISITLOG_").split("__"))
            .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
            .merge(
                Env::raw()
                    .only(&["SECRET_KEY"])
                    .map(|_| "auth.secret_key".into()),
            );

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("port must be greater than 0"));
        }

        if self.auth.token_expiry_minutes == 0 {
            return Err(invalid("token_expiry_minutes must be greater than 0"));
        }

        if let Some(secret) = &self.auth.secret_key {
            if secret.len() < MIN_SECRET_LEN {
                return Err(invalid(format!(
                    "secret_key must be at least {MIN_SECRET_LEN} characters"
                )));
            }
        }

        if !(1..=100).contains(&self.vision.jpeg_quality) {
            return Err(invalid(format!(
                "jpeg_quality ({}) must be between 1 and 100",
                self.vision.jpeg_quality
            )));
        }

        if self.vision.match_threshold > 64 {
            return Err(invalid(format!(
                "match_threshold ({}) cannot exceed 64",
                self.vision.match_threshold
            )));
        }

        if self.vision.detector == DetectorKind::Remote && self.vision.detector_url.is_none() {
            return Err(invalid("detector_url is required for the remote detector"));
        }

        if self.camera.snapshot_timeout_secs == 0 {
            return Err(invalid("snapshot_timeout_secs must be greater than 0"));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the photo directory, resolving defaults if not set.
    #[must_use]
    pub fn photo_dir(&self) -> PathBuf {
        self.storage
            .photo_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(PHOTO_DIR_NAME))
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get the access token lifetime as a Duration.
    #[must_use]
    pub fn token_expiry(&self) -> Duration {
        Duration::from_secs(self.auth.token_expiry_minutes * 60)
    }

    /// Get the snapshot timeout as a Duration.
    #[must_use]
    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_secs(self.camera.snapshot_timeout_secs)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
