//! Extraction backends.
//!
//! A backend turns a validated source URL into either a format menu
//! ([`Extractor::probe`]) or a fetchable media source ([`Extractor::fetch`]).
//! Exactly one backend is active per process, chosen by configuration.

pub mod local;
pub mod remote;

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::{BackendKind, RelayConfig},
    error::ApiError,
    formats::{FormatCode, FormatOption},
};

pub use local::LocalExtractor;
pub use remote::RemoteExtractor;

/// Metadata and format menu returned by `/info`.
#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub formats: Vec<FormatOption>,
}

/// Where the bytes of a download come from.
pub enum MediaSource {
    /// An upstream HTTP response whose body has not been read yet.
    Remote(reqwest::Response),
    /// A file inside a job directory that is removed once the source is dropped.
    Local { job: TempJob, path: PathBuf },
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(response) => f.debug_tuple("Remote").field(&response.url()).finish(),
            Self::Local { path, .. } => f.debug_struct("Local").field("path", path).finish(),
        }
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn probe(&self, url: &str) -> Result<MediaInfo, ApiError>;

    async fn fetch(&self, url: &str, format: FormatCode) -> Result<MediaSource, ApiError>;
}

pub fn from_config(config: &RelayConfig) -> Result<Arc<dyn Extractor>, ApiError> {
    match config.backend {
        BackendKind::Remote => Ok(Arc::new(RemoteExtractor::new(&config.cobalt_api_url)?)),
        BackendKind::Local => Ok(Arc::new(LocalExtractor::new(
            &config.yt_dlp_bin,
            &config.transfer_dir,
        ))),
    }
}

/// A per-download scratch directory, deleted on drop.
#[derive(Debug)]
pub struct TempJob {
    dir: PathBuf,
}

impl TempJob {
    pub async fn create(root: &Path) -> Result<Self, ApiError> {
        let dir = root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await.map_err(|error| {
            ApiError::transfer_failure(format!("Geçici indirme klasörü hazırlanamadı: {error}"))
        })?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for TempJob {
    fn drop(&mut self) {
        let remove = || match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!("Removed job directory {:?}", self.dir),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!("Could not remove job directory {:?}: {error}", self.dir),
        };

        // Drop has no await point, so on a multi-threaded runtime the worker
        // hands its other tasks off while the directory is deleted.
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(remove)
            }
            _ => remove(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn temp_job_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let job = TempJob::create(root.path()).await.unwrap();
        let dir = job.dir().to_path_buf();
        tokio::fs::write(dir.join("videosnap.mp4"), b"data")
            .await
            .unwrap();
        assert!(dir.is_dir());

        drop(job);
        assert!(!dir.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn temp_job_is_removed_on_drop_inside_worker_thread() {
        let root = tempfile::tempdir().unwrap();
        let job = TempJob::create(root.path()).await.unwrap();
        let dir = job.dir().to_path_buf();
        tokio::fs::write(dir.join("videosnap.mp3"), vec![0u8; 64 * 1024])
            .await
            .unwrap();

        tokio::spawn(async move { drop(job) }).await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn temp_jobs_get_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let first = TempJob::create(root.path()).await.unwrap();
        let second = TempJob::create(root.path()).await.unwrap();
        assert_ne!(first.dir(), second.dir());
        assert!(first.dir().starts_with(root.path()));
    }

    #[test]
    fn media_info_keeps_null_fields_and_omits_missing_platform() {
        let info = MediaInfo {
            title: "Clip".to_string(),
            thumbnail: None,
            duration: None,
            platform: None,
            formats: crate::formats::full_menu(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert!(json["thumbnail"].is_null());
        assert!(json.get("thumbnail").is_some());
        assert!(json.get("duration").is_some());
        assert!(json.get("platform").is_none());
        assert_eq!(json["formats"][1]["code"], "mp4-1080");
        assert_eq!(json["formats"][2]["label"], "MP3 — Sadece Ses");
    }
}
