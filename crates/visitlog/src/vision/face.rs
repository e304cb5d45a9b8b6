//! Face locations and detectors.

use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// A face bounding box in pixel coordinates.
///
/// Edges are ordered `top, right, bottom, left`; `right` and `bottom` are
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    /// First row of the face.
    pub top: u32,
    /// One past the last column.
    pub right: u32,
    /// One past the last row.
    pub bottom: u32,
    /// First column of the face.
    pub left: u32,
}

impl FaceBox {
    /// Width in pixels; zero for an inverted box.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height in pixels; zero for an inverted box.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Area in pixels.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Restrict the box to a `width` x `height` image.
    #[must_use]
    pub fn clamp(&self, width: u32, height: u32) -> Self {
        Self {
            top: self.top.min(height),
            right: self.right.min(width),
            bottom: self.bottom.min(height),
            left: self.left.min(width),
        }
    }
}

/// Finds faces in an encoded image.
#[async_trait]
pub trait FaceDetector: Send + Sync + std::fmt::Debug {
    /// Detect faces in `image`, whose decoded size is `width` x `height`.
    async fn detect(&self, image: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>>;
}

/// Detector that never finds a face, so full frames are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaceDetector;

#[async_trait]
impl FaceDetector for NoFaceDetector {
    async fn detect(&self, _image: &[u8], _width: u32, _height: u32) -> Result<Vec<FaceBox>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    faces: Vec<FaceBox>,
}

/// Detector backed by an HTTP face detection service.
///
/// The raw image is POSTed as `application/octet-stream` and the service
/// answers with `{"faces": [{"top", "right", "bottom", "left"}]}`.
#[derive(Debug, Clone)]
pub struct RemoteFaceDetector {
    client: reqwest::Client,
    url: String,
}

impl RemoteFaceDetector {
    /// Create a detector that calls `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FaceDetector for RemoteFaceDetector {
    async fn detect(&self, image: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::internal(format!(
                "face detector returned {status}: {body}"
            )));
        }

        let parsed: DetectResponse = response.json().await?;
        debug!(
            "Detector found {} face(s) in {width}x{height} image",
            parsed.faces.len()
        );
        Ok(parsed.faces)
    }
}

/// The first detected face, clamped to the image, if it has any area.
#[must_use]
pub fn first_face_region(faces: &[FaceBox], width: u32, height: u32) -> Option<FaceBox> {
    faces
        .first()
        .map(|face| face.clamp(width, height))
        .filter(|face| face.area() > 0)
}

/// Crop the first detected face, or return the whole image.
#[must_use]
pub fn crop_first_face(img: &DynamicImage, faces: &[FaceBox]) -> DynamicImage {
    match first_face_region(faces, img.width(), img.height()) {
        Some(face) => img.crop_imm(face.left, face.top, face.width(), face.height()),
        None => img.clone(),
    }
}
