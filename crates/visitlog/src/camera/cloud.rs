//! Snapshots through a cloud camera vendor's open API.
//!
//! The vendor issues an access token for an application key/secret pair and
//! captures a picture on request, returning a URL to download it from. For
//! cloud cameras, `Camera::ip` holds the vendor device serial.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::SnapshotSource;
use crate::config::CloudConfig;
use crate::error::{Error, Result};
use crate::models::Camera;

const TOKEN_PATH: &str = "/api/lapp/token/get";
const CAPTURE_PATH: &str = "/api/lapp/device/capture";
const SUCCESS_CODE: &str = "200";

/// Tokens are refreshed this many seconds before the vendor says they expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Envelope of every vendor response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: serde_json::Value,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_data(self, action: &str) -> Result<T> {
        let code = match &self.code {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if code != SUCCESS_CODE {
            return Err(Error::camera(format!(
                "{action} failed with code {code}: {}",
                self.msg
            )));
        }
        self.data
            .ok_or_else(|| Error::camera(format!("{action} returned no data")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    access_token: String,
    /// Expiry as Unix milliseconds.
    expire_time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureData {
    pic_url: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: DateTime<Utc>,
}

/// Captures pictures from vendor-hosted cameras.
#[derive(Debug)]
pub struct CloudSnapshotSource {
    client: reqwest::Client,
    config: CloudConfig,
    token: Mutex<Option<CachedToken>>,
}

impl CloudSnapshotSource {
    /// Create a source for the given vendor account.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: CloudConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.endpoint.trim_end_matches('/'))
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
        action: &str,
    ) -> Result<T> {
        let response: ApiResponse<T> = self
            .client
            .post(self.url(path))
            .form(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.into_data(action)
    }

    /// Return a valid access token, requesting a new one when needed.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Utc::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting cloud access token");
        let data: TokenData = self
            .post_form(
                TOKEN_PATH,
                &[
                    ("appKey", self.config.app_key.as_str()),
                    ("appSecret", self.config.app_secret.as_str()),
                ],
                "token request",
            )
            .await?;

        let expires_at = DateTime::from_timestamp_millis(data.expire_time)
            .ok_or_else(|| Error::camera("token request returned an invalid expiry"))?;
        info!("Obtained cloud access token valid until {expires_at}");

        *cached = Some(CachedToken {
            value: data.access_token.clone(),
            refresh_at: expires_at - TimeDelta::seconds(TOKEN_REFRESH_MARGIN_SECS),
        });
        Ok(data.access_token)
    }
}

#[async_trait]
impl SnapshotSource for CloudSnapshotSource {
    async fn snapshot(&self, camera: &Camera) -> Result<Vec<u8>> {
        let token = self.access_token().await?;
        let channel = self.config.channel.to_string();

        let data: CaptureData = self
            .post_form(
                CAPTURE_PATH,
                &[
                    ("accessToken", token.as_str()),
                    ("deviceSerial", camera.ip.as_str()),
                    ("channelNo", channel.as_str()),
                ],
                "capture",
            )
            .await?;

        debug!("Downloading cloud capture for {}", camera.ip);
        let bytes = self
            .client
            .get(&data.pic_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}
