//! Stored visitor photos and the capture pipeline.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::{codecs::jpeg::JpegEncoder, DynamicImage};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::face::{first_face_region, FaceBox, FaceDetector};
use super::hash::{perceptual_hash, ImageHash};
use crate::error::{Error, Result};

/// Directory of JPEG photos named after their capture time.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
    jpeg_quality: u8,
}

impl PhotoStore {
    /// Create a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        Self {
            dir: dir.into(),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the photo directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
            path: self.dir.clone(),
            source,
        })
    }

    /// Encode `img` as JPEG under `visitor_%Y%m%d_%H%M%S.jpg`.
    ///
    /// A numeric suffix is appended when a photo with the same second
    /// already exists. Returns the full path of the written file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or encoded.
    pub fn save(&self, img: &DynamicImage, at: DateTime<Utc>) -> Result<PathBuf> {
        self.ensure_dir()?;
        let stem = at.format("visitor_%Y%m%d_%H%M%S").to_string();

        let mut attempt = 0u32;
        let (path, file) = loop {
            let name = if attempt == 0 {
                format!("{stem}.jpg")
            } else {
                format!("{stem}_{attempt}.jpg")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = self.write_jpeg(file, img) {
            self.discard(&path);
            return Err(e);
        }

        debug!("Saved photo {}", path.display());
        Ok(path)
    }

    fn write_jpeg(&self, file: File, img: &DynamicImage) -> Result<()> {
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
            .encode_image(&img.to_rgb8())?;
        writer.flush()?;
        Ok(())
    }

    /// Remove a stored photo that no record refers to.
    ///
    /// Failures are logged rather than returned.
    pub fn discard(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed photo {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove photo {}: {e}", path.display()),
        }
    }

    /// Path of a stored photo by file name.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `name` is not a plain file name.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(file)), None) => Ok(self.dir.join(file)),
            _ => Err(Error::validation(format!("invalid photo name: {name}"))),
        }
    }
}

/// Outcome of running a frame through [`PhotoPipeline::process`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedPhoto {
    /// Full path of the stored photo.
    pub path: PathBuf,
    /// File name inside the photo directory.
    pub file_name: String,
    /// Perceptual hash of the stored photo.
    pub hash: ImageHash,
    /// Faces found in the original frame.
    pub faces: Vec<FaceBox>,
    /// Whether the stored photo is a face crop rather than the full frame.
    pub cropped: bool,
}

impl ProcessedPhoto {
    /// Detection summary recorded alongside a visit.
    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "faces": self.faces.len(),
            "cropped": self.cropped,
            "face": self.faces.first(),
        })
    }
}

/// Decode, detect, crop, hash and store incoming frames.
#[derive(Debug, Clone)]
pub struct PhotoPipeline {
    detector: Arc<dyn FaceDetector>,
    store: PhotoStore,
}

impl PhotoPipeline {
    /// Create a pipeline from a detector and a store.
    #[must_use]
    pub fn new(detector: Arc<dyn FaceDetector>, store: PhotoStore) -> Self {
        Self { detector, store }
    }

    /// The underlying photo store.
    #[must_use]
    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    /// Process an encoded frame captured at `at`.
    ///
    /// Detector failures are logged and treated as "no faces"; the full
    /// frame is stored when no usable face is found.
    ///
    /// # Errors
    ///
    /// Returns an image error if the frame cannot be decoded, or an I/O
    /// error if the photo cannot be written.
    pub async fn process(&self, bytes: &[u8], at: DateTime<Utc>) -> Result<ProcessedPhoto> {
        let owned = bytes.to_vec();
        let img = blocking(move || Ok(image::load_from_memory(&owned)?)).await?;
        let (width, height) = (img.width(), img.height());

        let faces = match self.detector.detect(bytes, width, height).await {
            Ok(faces) => faces,
            Err(e) => {
                warn!("Face detection failed, keeping full frame: {e}");
                Vec::new()
            }
        };
        let region = first_face_region(&faces, width, height);

        let store = self.store.clone();
        let (path, hash) = blocking(move || {
            let photo = match region {
                Some(face) => img.crop_imm(face.left, face.top, face.width(), face.height()),
                None => img,
            };
            let hash = perceptual_hash(&photo);
            let path = store.save(&photo, at)?;
            Ok((path, hash))
        })
        .await?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(
            "Stored {file_name} ({} face(s), hash {hash})",
            faces.len()
        );

        Ok(ProcessedPhoto {
            path,
            file_name,
            hash,
            faces,
            cropped: region.is_some(),
        })
    }
}

async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("image task failed: {e}")))?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::vision::face::NoFaceDetector;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Detector that reports the same faces for every frame.
    #[derive(Debug)]
    pub(crate) struct FixedDetector(pub Vec<FaceBox>);

    #[async_trait]
    impl FaceDetector for FixedDetector {
        async fn detect(&self, _image: &[u8], _w: u32, _h: u32) -> Result<Vec<FaceBox>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug)]
    struct FailingDetector;

    #[async_trait]
    impl FaceDetector for FailingDetector {
        async fn detect(&self, _image: &[u8], _w: u32, _h: u32) -> Result<Vec<FaceBox>> {
            Err(Error::internal("detector offline"))
        }
    }

    pub(crate) fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "visitlog-{name}-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// A small JPEG with a horizontal gradient.
    pub(crate) fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let v = u8::try_from((x * 255) / width.max(1)).unwrap();
            let w = u8::try_from((y * 255) / height.max(1)).unwrap();
            Rgb([v, w, 128])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 15).unwrap()
    }

    #[test]
    fn test_save_names_and_suffixes() {
        let dir = temp_dir("photo-save");
        let store = PhotoStore::new(&dir, 90);
        let img = DynamicImage::new_rgb8(16, 16);

        let first = store.save(&img, fixed_time()).unwrap();
        let second = store.save(&img, fixed_time()).unwrap();
        let third = store.save(&img, fixed_time()).unwrap();

        assert_eq!(first, dir.join("visitor_20240301_093015.jpg"));
        assert_eq!(second, dir.join("visitor_20240301_093015_1.jpg"));
        assert_eq!(third, dir.join("visitor_20240301_093015_2.jpg"));
        assert!(image::open(&first).is_ok());

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_failed_encode_leaves_no_file() {
        let dir = temp_dir("photo-encode");
        let store = PhotoStore::new(&dir, 90);
        let too_wide = DynamicImage::new_rgb8(u32::from(u16::MAX) + 1, 1);

        assert!(store.save(&too_wide, fixed_time()).is_err());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        let path = store.save(&DynamicImage::new_rgb8(8, 8), fixed_time()).unwrap();
        assert_eq!(path, dir.join("visitor_20240301_093015.jpg"));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_discard_removes_photo() {
        let dir = temp_dir("photo-discard");
        let store = PhotoStore::new(&dir, 90);
        let path = store.save(&DynamicImage::new_rgb8(8, 8), fixed_time()).unwrap();

        store.discard(&path);
        assert!(!path.exists());
        store.discard(&path);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = PhotoStore::new("/var/lib/visitlog/photos", 90);

        assert_eq!(
            store.resolve("visitor_1.jpg").unwrap(),
            PathBuf::from("/var/lib/visitlog/photos/visitor_1.jpg")
        );
        assert!(store.resolve("../visitlog.db").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("a/b.jpg").is_err());
        assert!(store.resolve("").is_err());
    }

    #[tokio::test]
    async fn test_process_without_faces_keeps_full_frame() {
        let dir = temp_dir("photo-full");
        let pipeline = PhotoPipeline::new(Arc::new(NoFaceDetector), PhotoStore::new(&dir, 90));

        let photo = pipeline
            .process(&sample_jpeg(64, 48), fixed_time())
            .await
            .unwrap();

        assert!(!photo.cropped);
        assert!(photo.faces.is_empty());
        assert_eq!(photo.file_name, "visitor_20240301_093015.jpg");
        let stored = image::open(&photo.path).unwrap();
        assert_eq!((stored.width(), stored.height()), (64, 48));

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_process_crops_first_face() {
        let dir = temp_dir("photo-crop");
        let face = FaceBox {
            top: 8,
            right: 40,
            bottom: 32,
            left: 16,
        };
        let pipeline = PhotoPipeline::new(
            Arc::new(FixedDetector(vec![face])),
            PhotoStore::new(&dir, 90),
        );

        let photo = pipeline
            .process(&sample_jpeg(64, 48), fixed_time())
            .await
            .unwrap();

        assert!(photo.cropped);
        assert_eq!(photo.faces, vec![face]);
        let stored = image::open(&photo.path).unwrap();
        assert_eq!((stored.width(), stored.height()), (24, 24));
        assert_eq!(photo.summary()["faces"], 1);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_process_survives_detector_failure() {
        let dir = temp_dir("photo-fail");
        let pipeline = PhotoPipeline::new(Arc::new(FailingDetector), PhotoStore::new(&dir, 90));

        let photo = pipeline
            .process(&sample_jpeg(32, 32), fixed_time())
            .await
            .unwrap();
        assert!(!photo.cropped);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_process_rejects_garbage() {
        let dir = temp_dir("photo-garbage");
        let pipeline = PhotoPipeline::new(Arc::new(NoFaceDetector), PhotoStore::new(&dir, 90));

        let err = pipeline
            .process(b"definitely not an image", fixed_time())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Image(_)));

        std::fs::remove_dir_all(dir).ok();
    }
}
