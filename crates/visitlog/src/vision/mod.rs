//! Face detection, perceptual hashing and photo storage.

pub mod face;
pub mod hash;
pub mod photo;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DetectorKind, VisionConfig};
use crate::error::{Error, Result};

pub use face::{crop_first_face, FaceBox, FaceDetector, NoFaceDetector, RemoteFaceDetector};
pub use hash::{perceptual_hash, ImageHash};
pub use photo::{PhotoPipeline, PhotoStore, ProcessedPhoto};

/// Build the configured face detector.
///
/// # Errors
///
/// Returns a configuration error if the remote detector has no URL, or an
/// error if its HTTP client cannot be built.
pub fn build_detector(config: &VisionConfig, timeout: Duration) -> Result<Arc<dyn FaceDetector>> {
    match config.detector {
        DetectorKind::None => Ok(Arc::new(NoFaceDetector)),
        DetectorKind::Remote => {
            let url = config
                .detector_url
                .as_deref()
                .ok_or_else(|| Error::ConfigValidation {
                    message: "vision.detector_url is required for the remote detector".to_string(),
                })?;
            Ok(Arc::new(RemoteFaceDetector::new(url, timeout)?))
        }
    }
}
