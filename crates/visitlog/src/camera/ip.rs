//! Snapshots from cameras on the local network.
//!
//! Most IP cameras (and phone webcam apps) expose a still image or an MJPEG
//! stream over plain HTTP. The configured paths are tried in order.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Url};
use tracing::debug;

use super::SnapshotSource;
use crate::error::{Error, Result};
use crate::models::Camera;

/// Upper bound on bytes read from a camera, still or stream.
const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Fetches stills from HTTP cameras.
#[derive(Debug, Clone)]
pub struct IpSnapshotSource {
    client: reqwest::Client,
    paths: Vec<String>,
    max_bytes: usize,
}

impl IpSnapshotSource {
    /// Create a source that tries `paths` in order with the given timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration, paths: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            paths,
            max_bytes: MAX_RESPONSE_BYTES,
        })
    }

    /// Limit how many bytes are read from a single response.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// URLs to try for a camera address, in order.
    ///
    /// A full `http(s)://` address is tried as-is before the configured
    /// paths are resolved against its origin.
    ///
    /// # Errors
    ///
    /// Returns a camera error if the address is not a valid host or URL.
    pub fn candidate_urls(&self, address: &str) -> Result<Vec<Url>> {
        let address = address.trim();

        let mut urls = Vec::new();
        let base = if address.starts_with("http://") || address.starts_with("https://") {
            let url = Url::parse(address).map_err(|e| invalid_address(address, e))?;
            urls.push(url.clone());
            url
        } else {
            let url = format!("http://{}/", address.trim_end_matches('/'));
            Url::parse(&url).map_err(|e| invalid_address(address, e))?
        };

        for path in &self.paths {
            let url = base.join(path).map_err(|e| invalid_address(address, e))?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }

    async fn fetch(&self, url: Url) -> Result<Vec<u8>> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/"));
        let too_large = || Error::camera(format!("response exceeds {} bytes", self.max_bytes));
        let limit = u64::try_from(self.max_bytes).unwrap_or(u64::MAX);
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(too_large());
        }

        let mut buf = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            buf.extend_from_slice(&chunk);
            if is_stream {
                if let Some(frame) = first_jpeg_frame(&buf) {
                    return Ok(frame.to_vec());
                }
            }
            if buf.len() > self.max_bytes {
                return Err(too_large());
            }
        }

        if is_stream {
            Err(Error::camera("no JPEG frame found in stream"))
        } else {
            Ok(buf)
        }
    }
}

#[async_trait]
impl SnapshotSource for IpSnapshotSource {
    async fn snapshot(&self, camera: &Camera) -> Result<Vec<u8>> {
        for url in self.candidate_urls(&camera.ip)? {
            match self.fetch(url.clone()).await {
                Ok(frame) if !frame.is_empty() => return Ok(frame),
                Ok(_) => debug!("Empty response from {url}"),
                Err(e) => debug!("Snapshot from {url} failed: {e}"),
            }
        }
        Err(Error::camera(format!(
            "could not connect to camera {}",
            camera.ip
        )))
    }
}

fn invalid_address(address: &str, err: impl std::fmt::Display) -> Error {
    Error::camera(format!("invalid camera address {address}: {err}"))
}

/// Locate the first complete JPEG image in a byte buffer.
fn first_jpeg_frame(buf: &[u8]) -> Option<&[u8]> {
    let start = buf.windows(2).position(|w| w == JPEG_SOI)?;
    let len = buf[start + 2..].windows(2).position(|w| w == JPEG_EOI)?;
    Some(&buf[start..start + 2 + len + 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::tests::serve_router;
    use crate::models::{CameraStatus, CameraType};
    use axum::{http::header, routing::get, Router};
    use chrono::Utc;

    const FRAME: [u8; 6] = [0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9];

    fn source() -> IpSnapshotSource {
        IpSnapshotSource::new(
            Duration::from_secs(2),
            vec!["/snapshot.jpg".to_string(), "/video".to_string(), "/".to_string()],
        )
        .unwrap()
    }

    fn camera(ip: &str) -> Camera {
        Camera {
            id: 1,
            name: "Gate".to_string(),
            ip: ip.to_string(),
            camera_type: CameraType::Ip,
            location: None,
            status: CameraStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_candidate_urls_for_bare_address() {
        let urls: Vec<String> = source()
            .candidate_urls("192.168.1.20:8080")
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://192.168.1.20:8080/snapshot.jpg",
                "http://192.168.1.20:8080/video",
                "http://192.168.1.20:8080/",
            ]
        );
    }

    #[test]
    fn test_candidate_urls_for_full_url() {
        let urls: Vec<String> = source()
            .candidate_urls("http://cam.local/live/stream.mjpg")
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(urls[0], "http://cam.local/live/stream.mjpg");
        assert_eq!(urls[1], "http://cam.local/snapshot.jpg");
        assert_eq!(urls.len(), 4);
    }

    #[test]
    fn test_first_jpeg_frame() {
        let mut buf = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        buf.extend_from_slice(&FRAME);
        buf.extend_from_slice(b"\r\n--frame\r\n");

        assert_eq!(first_jpeg_frame(&buf), Some(&FRAME[..]));
        assert_eq!(first_jpeg_frame(&FRAME[..4]), None);
        assert_eq!(first_jpeg_frame(b"no image here"), None);
    }

    #[tokio::test]
    async fn test_snapshot_falls_through_paths() {
        let router = Router::new().route(
            "/video",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], FRAME.to_vec()) }),
        );
        let addr = serve_router(router).await;

        let frame = source().snapshot(&camera(&addr)).await.unwrap();
        assert_eq!(frame, FRAME);
    }

    #[tokio::test]
    async fn test_snapshot_from_mjpeg_stream() {
        let router = Router::new().route(
            "/snapshot.jpg",
            get(|| async {
                let mut body = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
                body.extend_from_slice(&FRAME);
                body.extend_from_slice(b"\r\n");
                (
                    [(
                        header::CONTENT_TYPE,
                        "multipart/x-mixed-replace; boundary=frame",
                    )],
                    body,
                )
            }),
        );
        let addr = serve_router(router).await;

        let frame = source().snapshot(&camera(&addr)).await.unwrap();
        assert_eq!(frame, FRAME);
    }

    #[tokio::test]
    async fn test_oversized_still_rejected() {
        let router = Router::new().route(
            "/snapshot.jpg",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xAB_u8; 4096]) }),
        );
        let addr = serve_router(router).await;
        let url = Url::parse(&format!("http://{addr}/snapshot.jpg")).unwrap();

        let err = source().with_max_bytes(1024).fetch(url.clone()).await.unwrap_err();
        assert!(err.to_string().contains("exceeds 1024 bytes"));

        let frame = source().fetch(url).await.unwrap();
        assert_eq!(frame.len(), 4096);
    }

    #[tokio::test]
    async fn test_snapshot_unreachable_camera() {
        let err = source().snapshot(&camera("127.0.0.1:1")).await.unwrap_err();
        assert!(err.to_string().contains("could not connect to camera 127.0.0.1:1"));
    }
}
