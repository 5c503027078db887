#[cfg(all(test, unix))]
pub(crate) mod fake_bin;
mod library;
mod process;
mod transcode;
mod ytdlp;

use std::path::PathBuf;
use std::time::Duration;

use lazy_regex::{regex_captures, regex_is_match};
use poem::async_trait;
use serde::{Deserialize, Serialize};

pub use library::LibraryExtractor;
pub use transcode::transcode_mp3;
pub use ytdlp::YtDlpExtractor;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with an error: {stderr}")]
    Failed { program: String, stderr: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed metadata: {0}")]
    Json(#[from] serde_json::Error),
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("download returned HTTP {0}")]
    HttpStatus(u16),
    #[error("no audio format available")]
    NoAudioFormat,
    #[error("no output file produced")]
    NoOutput,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Video metadata as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration: Option<u64>,
    pub duration_text: Option<String>,
    pub thumbnail: String,
    pub uploader: Option<String>,
}

impl VideoInfo {
    pub fn new(
        id: String,
        title: Option<String>,
        duration: Option<f64>,
        thumbnail: Option<String>,
        uploader: Option<String>,
    ) -> Self {
        let duration = duration.filter(|d| d.is_finite() && *d >= 0.0);
        Self {
            url: watch_url(&id),
            thumbnail: thumbnail.unwrap_or_else(|| thumbnail_url(&id)),
            title: title.unwrap_or_else(|| "Unknown title".to_string()),
            duration: duration.map(|d| d as u64),
            duration_text: duration.map(format_duration),
            uploader,
            id,
        }
    }
}

/// An audio file extracted into the temp directory.
#[derive(Debug, Clone)]
pub struct Track {
    pub info: VideoInfo,
    pub path: PathBuf,
}

impl Track {
    pub fn filename(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// Where a fetched track should be written: `<dir>/<stem>.<ext>`.
#[derive(Debug, Clone)]
pub struct AudioTarget {
    pub dir: PathBuf,
    pub stem: String,
}

impl AudioTarget {
    pub fn path_with_extension(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, ext))
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        query: &str,
        limit: usize,
        user_agent: &str,
    ) -> Result<Vec<VideoInfo>, ExtractError>;

    async fn fetch_audio(
        &self,
        video_id: &str,
        target: &AudioTarget,
        user_agent: &str,
    ) -> Result<Track, ExtractError>;
}

pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if regex_is_match!(r"^[A-Za-z0-9_-]{11}$", input) {
        return Some(input.to_string());
    }

    regex_captures!(
        r"^(?:https?://)?(?:(?:www|m|music)\.)?(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|embed/|shorts/|live/|v/)|youtu\.be/)([A-Za-z0-9_-]{11})(?:[?&#/].*)?$",
        input
    )
    .map(|(_, id)| id.to_string())
}

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

pub fn thumbnail_url(id: &str) -> String {
    format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg")
}

pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
