//! Local extraction through the `yt-dlp` command line tool.
//!
//! Probing reads the real stream heights, so `/info` only offers 1080p when the
//! source has it. Downloads land in a private job directory that lives as long
//! as the returned [`MediaSource`].

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Output,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    process::Command,
    time::{Duration, timeout},
};
use tracing::{info, warn};

use super::{Extractor, MediaInfo, MediaSource, TempJob};
use crate::{
    error::ApiError,
    formats::{self, FormatCode},
};

const PROBE_TIMEOUT_SECONDS: u64 = 60;
const DOWNLOAD_TIMEOUT_SECONDS: u64 = 120;
pub const STALE_JOB_SECONDS: u64 = 2 * 60 * 60;
const OUTPUT_STEM: &str = "videosnap";

#[derive(Debug, Deserialize)]
struct YtDlpVideoInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    #[serde(rename = "_filename")]
    filename: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    vcodec: Option<String>,
    height: Option<u32>,
}

impl YtDlpVideoInfo {
    fn max_video_height(&self) -> Option<u32> {
        self.formats
            .iter()
            .filter(|format| !matches!(format.vcodec.as_deref(), Some("none")))
            .filter_map(|format| format.height)
            .max()
    }

    fn display_title(&self) -> String {
        let filename = self
            .filename
            .as_deref()
            .and_then(|value| Path::new(value).file_name())
            .and_then(|name| name.to_str())
            .filter(|name| !name.trim().is_empty());

        match (filename, self.title.as_deref()) {
            (Some(filename), _) => formats::title_from_filename(filename),
            (None, Some(title)) if !title.trim().is_empty() => formats::clamp_title(title.trim()),
            _ => "Video".to_string(),
        }
    }
}

pub struct LocalExtractor {
    binary: String,
    transfer_dir: PathBuf,
}

impl LocalExtractor {
    pub fn new(binary: &str, transfer_dir: &Path) -> Self {
        Self {
            binary: binary.to_string(),
            transfer_dir: transfer_dir.to_path_buf(),
        }
    }

    async fn run(&self, args: Vec<String>, limit_seconds: u64) -> Result<Output, String> {
        let command_future = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();
        let output = timeout(Duration::from_secs(limit_seconds), command_future)
            .await
            .map_err(|_| format!("{} did not finish within {limit_seconds} seconds", self.binary))?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    format!("{} is not installed on this server", self.binary)
                } else {
                    format!("could not run {}: {error}", self.binary)
                }
            })?;

        if !output.status.success() {
            return Err(run_error_message(&output.stderr));
        }

        Ok(output)
    }
}

#[async_trait]
impl Extractor for LocalExtractor {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn probe(&self, url: &str) -> Result<MediaInfo, ApiError> {
        let args = vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ];
        let output = self
            .run(args, PROBE_TIMEOUT_SECONDS)
            .await
            .map_err(|message| ApiError::backend_failure(format!("Video bulunamadı: {message}")))?;

        let info: YtDlpVideoInfo = serde_json::from_slice(&output.stdout).map_err(|error| {
            ApiError::backend_failure(format!("Video bulunamadı: {error}"))
        })?;

        Ok(MediaInfo {
            title: info.display_title(),
            thumbnail: info.thumbnail.clone(),
            duration: info.duration,
            platform: None,
            formats: formats::probed_menu(info.max_video_height()),
        })
    }

    async fn fetch(&self, url: &str, format: FormatCode) -> Result<MediaSource, ApiError> {
        let job = TempJob::create(&self.transfer_dir).await?;
        let output_template = format!("{}/{OUTPUT_STEM}.%(ext)s", job.dir().to_string_lossy());

        info!("Extracting {format} for {url:?} into {:?}", job.dir());
        let output = self
            .run(download_args(format, output_template, url), DOWNLOAD_TIMEOUT_SECONDS)
            .await
            .map_err(|message| ApiError::backend_failure(format!("İndirme başarısız: {message}")))?;

        let printed_path = extract_printed_path(&output.stdout);
        let path = locate_output(job.dir(), printed_path.as_deref(), format.extension()).await?;

        Ok(MediaSource::Local { job, path })
    }
}

fn download_args(format: FormatCode, output_template: String, url: &str) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--newline".to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "-o".to_string(),
        output_template,
    ];

    match format.max_height() {
        Some(height) => {
            args.push("-f".to_string());
            args.push(format!(
                "best[height<={height}][ext=mp4]/bestvideo[height<={height}]+bestaudio/best[height<={height}]"
            ));
            args.push("--merge-output-format".to_string());
            args.push("mp4".to_string());
        }
        None => {
            args.push("-f".to_string());
            args.push("bestaudio/best".to_string());
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push("mp3".to_string());
            args.push("--audio-quality".to_string());
            args.push("0".to_string());
        }
    }

    args.push(url.to_string());
    args
}

fn run_error_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the operation")
        .to_string()
}

fn extract_printed_path(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
}

/// Finds the finished file in a job directory.
///
/// Order: the path printed by the tool, then `videosnap.<ext>`, then the first
/// (lexicographic) sibling named `videosnap.*` that is not a partial download.
async fn locate_output(
    job_dir: &Path,
    printed_path: Option<&str>,
    expected_ext: &str,
) -> Result<PathBuf, ApiError> {
    let job_root = tokio::fs::canonicalize(job_dir).await.map_err(|error| {
        ApiError::transfer_failure(format!("Geçici klasör çözümlenemedi: {error}"))
    })?;

    if let Some(path_value) = printed_path
        && let Some(valid_path) =
            contained_file(&job_root, Path::new(path_value)).await?
    {
        return Ok(valid_path);
    }

    let expected = job_dir.join(format!("{OUTPUT_STEM}.{expected_ext}"));
    if let Some(valid_path) = contained_file(&job_root, &expected).await? {
        return Ok(valid_path);
    }

    let mut entries = tokio::fs::read_dir(job_dir).await.map_err(|error| {
        ApiError::transfer_failure(format!("Geçici klasör açılamadı: {error}"))
    })?;
    let mut siblings = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|error| {
        ApiError::transfer_failure(format!("Geçici dosyalar okunamadı: {error}"))
    })? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&format!("{OUTPUT_STEM}.")) && !is_partial_download(&name) {
            siblings.push(name);
        }
    }
    siblings.sort();

    for name in siblings {
        if let Some(valid_path) = contained_file(&job_root, &job_dir.join(&name)).await? {
            warn!("Expected {OUTPUT_STEM}.{expected_ext} was missing, relaying {name} instead");
            return Ok(valid_path);
        }
    }

    Err(ApiError::transfer_failure("İndirilen dosya bulunamadı."))
}

/// Canonical path of `candidate` if it is a regular file under `job_root`.
async fn contained_file(job_root: &Path, candidate: &Path) -> Result<Option<PathBuf>, ApiError> {
    let resolved = match tokio::fs::canonicalize(candidate).await {
        Ok(resolved) => resolved,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(ApiError::transfer_failure(format!(
                "İndirilen dosya yolu çözümlenemedi: {error}"
            )));
        }
    };

    if !resolved.starts_with(job_root) {
        warn!("Ignoring {:?}: outside the job directory", resolved);
        return Ok(None);
    }

    let is_file = tokio::fs::metadata(&resolved)
        .await
        .map(|metadata| metadata.is_file())
        .map_err(|error| ApiError::transfer_failure(format!("İndirilen dosya okunamadı: {error}")))?;

    Ok(is_file.then_some(resolved))
}

fn is_partial_download(name: &str) -> bool {
    name.ends_with(".part") || name.ends_with(".ytdl") || name.contains(".part-Frag")
}

/// Removes job directories left behind by an earlier process.
pub async fn sweep_stale_jobs(transfer_dir: &Path, older_than_secs: u64) {
    let mut entries = match tokio::fs::read_dir(transfer_dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("Could not open {:?} for cleanup: {error}", transfer_dir);
            }
            return;
        }
    };

    let max_age = Duration::from_secs(older_than_secs);
    let now = std::time::SystemTime::now();

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                warn!("Could not iterate {:?} for cleanup: {error}", transfer_dir);
                break;
            }
        };

        let path = entry.path();
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age || !metadata.is_dir() {
            continue;
        }

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => info!("Removed stale job directory {:?}", path),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!("Could not remove stale job directory {:?}: {error}", path),
        }
    }
}
