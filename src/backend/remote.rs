//! Remote conversion API backend (cobalt-compatible).
//!
//! The API is asked for a download link; the link is then fetched server-side
//! and relayed. The API never reports real source quality, so `/info` offers
//! every format once the API accepts the URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Extractor, MediaInfo, MediaSource};
use crate::{
    error::ApiError,
    formats::{self, FormatCode},
    validate::detect_platform,
};

const API_TIMEOUT_SECONDS: u64 = 30;
const MEDIA_CONNECT_TIMEOUT_SECONDS: u64 = 15;
const MEDIA_READ_TIMEOUT_SECONDS: u64 = 120;
const BROWSER_USER_AGENT: &str = "Mozilla/5.0";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CobaltRequest<'a> {
    url: &'a str,
    video_quality: &'static str,
    audio_format: &'static str,
    download_mode: &'static str,
    filename_style: &'static str,
}

impl<'a> CobaltRequest<'a> {
    fn new(url: &'a str, format: FormatCode) -> Self {
        Self {
            url,
            video_quality: match format {
                FormatCode::Mp4FullHd => "1080",
                FormatCode::Mp4Hd | FormatCode::Mp3 => "720",
            },
            audio_format: "mp3",
            download_mode: if format.is_audio() { "audio" } else { "auto" },
            filename_style: "basic",
        }
    }
}

#[derive(Debug, Deserialize)]
struct CobaltReply {
    #[serde(default)]
    status: String,
    url: Option<String>,
    filename: Option<String>,
    error: Option<serde_json::Value>,
}

/// Parsed answer of the conversion API.
#[derive(Debug, Clone, PartialEq)]
pub enum CobaltOutcome {
    /// `tunnel`, `redirect`, `stream` and friends: all carry a fetchable `url`.
    Ready {
        status: String,
        url: Option<String>,
        filename: Option<String>,
        /// The reply as received, quoted when no link can be used.
        raw: String,
    },
    Failed {
        message: String,
    },
}

impl CobaltOutcome {
    pub fn from_body(body: &[u8]) -> Self {
        let reply: CobaltReply = match serde_json::from_slice(body) {
            Ok(reply) => reply,
            Err(error) => {
                return Self::Failed {
                    message: error.to_string(),
                };
            }
        };

        if reply.status == "error" {
            return Self::Failed {
                message: render_error(reply.error.as_ref()),
            };
        }

        Self::Ready {
            status: reply.status,
            url: reply.url.filter(|url| !url.trim().is_empty()),
            filename: reply.filename,
            raw: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

fn render_error(error: Option<&serde_json::Value>) -> String {
    match error {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(value) => value
            .get("code")
            .and_then(|code| code.as_str())
            .map(ToString::to_string)
            .unwrap_or_else(|| value.to_string()),
    }
}

pub struct RemoteExtractor {
    endpoint: String,
    api_client: reqwest::Client,
    media_client: reqwest::Client,
}

impl RemoteExtractor {
    pub fn new(endpoint: &str) -> Result<Self, ApiError> {
        let api_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECONDS))
            .build()
            .map_err(|error| ApiError::internal(format!("Could not build HTTP client: {error}")))?;
        let media_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(MEDIA_CONNECT_TIMEOUT_SECONDS))
            .read_timeout(Duration::from_secs(MEDIA_READ_TIMEOUT_SECONDS))
            .build()
            .map_err(|error| ApiError::internal(format!("Could not build HTTP client: {error}")))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            api_client,
            media_client,
        })
    }

    async fn request(&self, url: &str, format: FormatCode) -> CobaltOutcome {
        let response = self
            .api_client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .json(&CobaltRequest::new(url, format))
            .send()
            .await;

        let body = match response {
            Ok(response) => response.bytes().await,
            Err(error) => Err(error),
        };

        match body {
            Ok(body) => CobaltOutcome::from_body(&body),
            Err(error) => {
                warn!("Conversion API request for {url:?} failed: {error}");
                CobaltOutcome::Failed {
                    message: error.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl Extractor for RemoteExtractor {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn probe(&self, url: &str) -> Result<MediaInfo, ApiError> {
        let filename = match self.request(url, FormatCode::Mp4Hd).await {
            CobaltOutcome::Failed { message } => {
                return Err(ApiError::backend_failure(format!("Video bulunamadı: {message}")));
            }
            CobaltOutcome::Ready { filename, .. } => filename,
        };

        Ok(MediaInfo {
            title: formats::title_from_filename(filename.as_deref().unwrap_or("Video")),
            thumbnail: None,
            duration: None,
            platform: Some(detect_platform(url).to_string()),
            formats: formats::full_menu(),
        })
    }

    async fn fetch(&self, url: &str, format: FormatCode) -> Result<MediaSource, ApiError> {
        let (status, download_url) = match self.request(url, format).await {
            CobaltOutcome::Failed { message } => {
                return Err(ApiError::backend_failure(format!("İndirme başarısız: {message}")));
            }
            CobaltOutcome::Ready { url: None, raw, .. } => {
                return Err(ApiError::transfer_failure(format!(
                    "İndirme linki alınamadı. Cobalt yanıtı: {}",
                    raw.trim()
                )));
            }
            CobaltOutcome::Ready {
                status,
                url: Some(download_url),
                ..
            } => (status, download_url),
        };

        // The link is fetched as given; its host is not matched against the allow-list.
        debug!("Fetching {status} link for {url:?}");
        let response = self
            .media_client
            .get(&download_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|error| ApiError::transfer_failure(format!("Dosya aktarım hatası: {error}")))?;

        if !response.status().is_success() {
            return Err(ApiError::transfer_failure(format!(
                "Dosya aktarım hatası: HTTP {}",
                response.status()
            )));
        }

        Ok(MediaSource::Remote(response))
    }
}
