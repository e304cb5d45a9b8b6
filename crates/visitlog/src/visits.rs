//! Automatic check-in and check-out from photos.
//!
//! A photo whose face hash is close to an open visit closes that visit;
//! any other photo opens a new one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::camera::CameraHub;
use crate::error::Result;
use crate::models::Visit;
use crate::storage::{SharedStorage, Storage};
use crate::vision::{ImageHash, PhotoPipeline, ProcessedPhoto};

/// What [`VisitService::register`] did with a photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VisitOutcome {
    /// A new visit was opened.
    CheckedIn {
        /// The new visit.
        visit: Visit,
        /// The stored photo.
        photo: ProcessedPhoto,
    },
    /// A matching open visit was closed.
    CheckedOut {
        /// The closed visit.
        visit: Visit,
        /// Hash distance to the photo taken at check-in.
        distance: u32,
        /// The stored photo.
        photo: ProcessedPhoto,
    },
}

impl VisitOutcome {
    /// The visit that was opened or closed.
    #[must_use]
    pub fn visit(&self) -> &Visit {
        match self {
            Self::CheckedIn { visit, .. } | Self::CheckedOut { visit, .. } => visit,
        }
    }
}

/// Matches photos against open visits.
#[derive(Debug, Clone)]
pub struct VisitService {
    storage: SharedStorage,
    photos: PhotoPipeline,
    cameras: CameraHub,
    match_threshold: u32,
}

impl VisitService {
    /// Create a service.
    #[must_use]
    pub fn new(
        storage: SharedStorage,
        photos: PhotoPipeline,
        cameras: CameraHub,
        match_threshold: u32,
    ) -> Self {
        Self {
            storage,
            photos,
            cameras,
            match_threshold,
        }
    }

    /// Register a photo taken at `at`.
    ///
    /// The stored photo is removed again if no visit ends up recording it.
    ///
    /// # Errors
    ///
    /// Returns an error if the photo cannot be processed or the database
    /// operation fails.
    pub async fn register(&self, bytes: &[u8], at: DateTime<Utc>) -> Result<VisitOutcome> {
        let photo = self.photos.process(bytes, at).await?;
        let hash = photo.hash;
        let threshold = self.match_threshold;
        let file_name = photo.file_name.clone();
        let summary = photo.summary();

        let matched = self
            .storage
            .call(move |storage| {
                match nearest_open_visit(storage, hash)? {
                    Some((mut visit, distance)) if distance <= threshold => {
                        visit.check_out(at)?;
                        storage.update_visit_checkout(&visit)?;
                        Ok((visit, Some(distance)))
                    }
                    _ => {
                        let hex = hash.to_string();
                        let visit =
                            storage.insert_visit(&file_name, at, Some(&hex), Some(&summary))?;
                        Ok((visit, None))
                    }
                }
            })
            .await;
        let (visit, distance) = match matched {
            Ok(matched) => matched,
            Err(e) => {
                self.photos.store().discard(&photo.path);
                return Err(e);
            }
        };

        Ok(match distance {
            Some(distance) => {
                info!(
                    "Visit {} checked out after {}s (distance {distance})",
                    visit.id,
                    visit.duration_seconds.unwrap_or_default()
                );
                VisitOutcome::CheckedOut {
                    visit,
                    distance,
                    photo,
                }
            }
            None => {
                info!("Visit {} checked in", visit.id);
                VisitOutcome::CheckedIn { visit, photo }
            }
        })
    }

    /// Take a snapshot from a camera and register it.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown camera, a camera error if no
    /// frame is available, or any error from [`Self::register`].
    pub async fn capture(&self, camera_id: i64, at: DateTime<Utc>) -> Result<VisitOutcome> {
        let frame = self.cameras.snapshot(camera_id).await?;
        self.register(&frame, at).await
    }

    /// Close a visit explicitly.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown visit, or a validation error
    /// if it is already closed or `at` precedes check-in.
    pub async fn check_out(&self, id: i64, at: DateTime<Utc>) -> Result<Visit> {
        self.storage
            .call(move |storage| {
                let mut visit = storage.get_visit_required(id)?;
                visit.check_out(at)?;
                storage.update_visit_checkout(&visit)?;
                Ok(visit)
            })
            .await
    }
}

/// The open visit whose stored hash is closest to `hash`.
fn nearest_open_visit(storage: &Storage, hash: ImageHash) -> Result<Option<(Visit, u32)>> {
    let mut best: Option<(Visit, u32)> = None;
    for visit in storage.open_visits()? {
        let Some(stored) = visit.image_hash.as_deref() else {
            continue;
        };
        let stored: ImageHash = match stored.parse() {
            Ok(stored) => stored,
            Err(e) => {
                debug!("Skipping visit {} with unreadable hash: {e}", visit.id);
                continue;
            }
        };
        let distance = stored.distance(hash);
        if best.as_ref().map_or(true, |(_, d)| distance < *d) {
            best = Some((visit, distance));
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::tests::StaticSource;
    use crate::error::Error;
    use crate::vision::photo::tests::{sample_jpeg, temp_dir};
    use crate::vision::{NoFaceDetector, PhotoStore};
    use chrono::Duration;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn service(threshold: u32) -> (VisitService, PathBuf) {
        let dir = temp_dir("visits");
        let storage = SharedStorage::new(Storage::open_in_memory().unwrap());
        let photos = PhotoPipeline::new(Arc::new(NoFaceDetector), PhotoStore::new(&dir, 90));
        let cameras = CameraHub::new(
            storage.clone(),
            Arc::new(StaticSource(sample_jpeg(48, 48))),
            None,
        );
        (
            VisitService::new(storage, photos, cameras, threshold),
            dir,
        )
    }

    /// Vertical stripes whose direction flips the whole hash.
    fn striped_jpeg(ascending: bool) -> Vec<u8> {
        let img = GrayImage::from_fn(90, 80, |x, _| {
            let level = u8::try_from(x * 2).unwrap();
            Luma([if ascending { level } else { 255 - level }])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_same_face_checks_in_then_out() {
        let (service, dir) = service(10);
        let t0 = Utc::now();
        let frame = sample_jpeg(64, 64);

        let first = service.register(&frame, t0).await.unwrap();
        let VisitOutcome::CheckedIn { visit, .. } = &first else {
            panic!("expected check-in, got {first:?}");
        };
        assert!(!visit.exited);
        assert!(visit.image_hash.is_some());

        let second = service
            .register(&frame, t0 + Duration::minutes(42))
            .await
            .unwrap();
        let VisitOutcome::CheckedOut {
            visit: closed,
            distance,
            ..
        } = &second
        else {
            panic!("expected check-out, got {second:?}");
        };
        assert_eq!(closed.id, visit.id);
        assert_eq!(*distance, 0);
        assert!(closed.exited);
        assert_eq!(closed.duration_seconds, Some(42 * 60));

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_failed_check_out_removes_photo() {
        let (service, dir) = service(10);
        let t0 = Utc::now();
        let frame = sample_jpeg(64, 64);
        service.register(&frame, t0).await.unwrap();

        let err = service
            .register(&frame, t0 - Duration::minutes(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);

        let open = service.storage.call(|s| s.open_visits()).await.unwrap();
        assert_eq!(open.len(), 1);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_different_faces_open_separate_visits() {
        let (service, dir) = service(10);
        let t0 = Utc::now();

        let a = service.register(&striped_jpeg(true), t0).await.unwrap();
        let b = service
            .register(&striped_jpeg(false), t0 + Duration::seconds(5))
            .await
            .unwrap();

        assert!(matches!(a, VisitOutcome::CheckedIn { .. }));
        assert!(matches!(b, VisitOutcome::CheckedIn { .. }));
        assert_ne!(a.visit().id, b.visit().id);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_capture_uses_camera_snapshot() {
        let (service, dir) = service(10);
        let camera_id = service
            .storage
            .call(|s| {
                s.insert_camera(&crate::models::NewCamera {
                    name: "Gate".to_string(),
                    ip: "10.0.0.2".to_string(),
                    camera_type: crate::models::CameraType::Ip,
                    location: None,
                })
            })
            .await
            .unwrap()
            .id;

        let outcome = service.capture(camera_id, Utc::now()).await.unwrap();
        assert!(matches!(outcome, VisitOutcome::CheckedIn { .. }));
        assert!(service.capture(999, Utc::now()).await.unwrap_err().is_not_found());

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_explicit_check_out() {
        let (service, dir) = service(10);
        let t0 = Utc::now();
        let outcome = service.register(&sample_jpeg(32, 32), t0).await.unwrap();
        let id = outcome.visit().id;

        let closed = service
            .check_out(id, t0 + Duration::seconds(90))
            .await
            .unwrap();
        assert_eq!(closed.duration_seconds, Some(90));

        let again = service.check_out(id, t0 + Duration::seconds(120)).await;
        assert!(matches!(again, Err(Error::Validation(_))));
        assert!(service.check_out(999, t0).await.unwrap_err().is_not_found());

        std::fs::remove_dir_all(dir).ok();
    }
}
