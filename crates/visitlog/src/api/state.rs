//! Shared application state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::TokenIssuer;
use crate::camera::CameraHub;
use crate::config::Config;
use crate::error::Result;
use crate::storage::{SharedStorage, Storage};
use crate::vision::{build_detector, PhotoPipeline, PhotoStore};
use crate::visits::VisitService;

/// Handles shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Database access.
    pub storage: SharedStorage,
    /// Access token issuer.
    pub tokens: TokenIssuer,
    /// Camera snapshots and status.
    pub cameras: CameraHub,
    /// Photo processing.
    pub photos: PhotoPipeline,
    /// Photo-driven visits.
    pub visits: VisitService,
    /// Loaded configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire up every service from configuration and an opened database.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret key is invalid, the photo directory
    /// cannot be created, or an HTTP client cannot be built.
    pub fn from_config(config: Config, storage: Storage) -> Result<Self> {
        let tokens = match config.auth.secret_key.as_deref() {
            Some(secret) => TokenIssuer::new(secret, config.token_expiry())?,
            None => {
                warn!("No secret_key configured; using the development signing key");
                TokenIssuer::new_dev(config.token_expiry())
            }
        };

        let storage = SharedStorage::new(storage);
        let cameras = CameraHub::from_config(storage.clone(), &config.camera)?;

        let store = PhotoStore::new(config.photo_dir(), config.vision.jpeg_quality);
        store.ensure_dir()?;
        info!("Storing photos in {}", store.dir().display());

        let detector = build_detector(&config.vision, config.snapshot_timeout())?;
        let photos = PhotoPipeline::new(detector, store);
        let visits = VisitService::new(
            storage.clone(),
            photos.clone(),
            cameras.clone(),
            config.vision.match_threshold,
        );

        Ok(Self {
            storage,
            tokens,
            cameras,
            photos,
            visits,
            config: Arc::new(config),
        })
    }
}
