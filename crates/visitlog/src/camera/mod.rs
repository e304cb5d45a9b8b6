//! Camera snapshots.
//!
//! Each [`CameraType`] has a [`SnapshotSource`] that turns a registered
//! [`Camera`] into one encoded still image. [`CameraHub`] picks the right
//! source and tracks which cameras operators have started.

mod cloud;
mod ip;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::CameraConfig;
use crate::error::{Error, Result};
use crate::models::{Camera, CameraStatus, CameraType};
use crate::storage::SharedStorage;

pub use cloud::CloudSnapshotSource;
pub use ip::IpSnapshotSource;

/// Something that can take a still picture from a camera.
#[async_trait]
pub trait SnapshotSource: Send + Sync + std::fmt::Debug {
    /// Grab one encoded frame from `camera`.
    async fn snapshot(&self, camera: &Camera) -> Result<Vec<u8>>;
}

/// Routes snapshot requests to the source matching each camera's type.
#[derive(Debug, Clone)]
pub struct CameraHub {
    storage: SharedStorage,
    ip: Arc<dyn SnapshotSource>,
    cloud: Option<Arc<dyn SnapshotSource>>,
}

impl CameraHub {
    /// Create a hub from explicit sources.
    #[must_use]
    pub fn new(
        storage: SharedStorage,
        ip: Arc<dyn SnapshotSource>,
        cloud: Option<Arc<dyn SnapshotSource>>,
    ) -> Self {
        Self { storage, ip, cloud }
    }

    /// Create a hub with the HTTP sources described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(storage: SharedStorage, config: &CameraConfig) -> Result<Self> {
        let timeout = std::time::Duration::from_secs(config.snapshot_timeout_secs);
        let ip: Arc<dyn SnapshotSource> =
            Arc::new(IpSnapshotSource::new(timeout, config.snapshot_paths.clone())?);
        let cloud = match &config.cloud {
            Some(cloud) => {
                let source: Arc<dyn SnapshotSource> =
                    Arc::new(CloudSnapshotSource::new(cloud.clone(), timeout)?);
                Some(source)
            }
            None => None,
        };
        Ok(Self::new(storage, ip, cloud))
    }

    /// Mark a camera as started.
    ///
    /// Returns `false` if the camera does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn start(&self, id: i64) -> Result<bool> {
        let found = self
            .storage
            .call(move |s| s.set_camera_status(id, CameraStatus::Active))
            .await?;
        if found {
            info!("Camera {id} started");
        }
        Ok(found)
    }

    /// Mark a camera as stopped.
    ///
    /// Returns `false` if the camera does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn stop(&self, id: i64) -> Result<bool> {
        let found = self
            .storage
            .call(move |s| s.set_camera_status(id, CameraStatus::Inactive))
            .await?;
        if found {
            info!("Camera {id} stopped");
        }
        Ok(found)
    }

    /// Take a snapshot from a registered camera.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown camera, or a camera error if
    /// no frame could be obtained.
    pub async fn snapshot(&self, id: i64) -> Result<Vec<u8>> {
        let camera = self
            .storage
            .call(move |s| s.get_camera_required(id))
            .await?;
        self.snapshot_camera(&camera).await
    }

    /// Take a snapshot from an already loaded camera record.
    ///
    /// # Errors
    ///
    /// Returns a camera error if no frame could be obtained.
    pub async fn snapshot_camera(&self, camera: &Camera) -> Result<Vec<u8>> {
        debug!("Snapshot from camera {} ({})", camera.id, camera.camera_type);
        let frame = self.source_for(camera.camera_type)?.snapshot(camera).await?;
        debug!("Camera {} returned {} bytes", camera.id, frame.len());
        Ok(frame)
    }

    fn source_for(&self, camera_type: CameraType) -> Result<&dyn SnapshotSource> {
        match camera_type {
            CameraType::Ip => Ok(self.ip.as_ref()),
            CameraType::Cloud => self
                .cloud
                .as_deref()
                .ok_or_else(|| Error::camera("cloud camera access is not configured")),
        }
    }
}
