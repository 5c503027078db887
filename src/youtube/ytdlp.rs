use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use poem::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{process, AudioTarget, ExtractError, Extractor, Track, VideoInfo};

/// Fields yt-dlp prints for both flat search entries and resolved videos.
#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
}

impl Entry {
    fn into_info(self) -> VideoInfo {
        VideoInfo::new(
            self.id,
            self.title,
            self.duration,
            self.thumbnail,
            self.uploader.or(self.channel),
        )
    }
}

/// Shells out to the yt-dlp binary for both search and download.
pub struct YtDlpExtractor {
    ytdlp_path: String,
    socket_timeout: u64,
    process_timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(ytdlp_path: impl Into<String>, socket_timeout: u64, process_timeout: Duration) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            socket_timeout,
            process_timeout,
        }
    }

    fn command(&self, user_agent: &str) -> Command {
        let mut cmd = Command::new(&self.ytdlp_path);
        cmd.arg("--no-warnings")
            .arg("--no-progress")
            .arg("--socket-timeout")
            .arg(self.socket_timeout.to_string())
            .arg("--user-agent")
            .arg(user_agent);
        cmd
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "ytdlp"
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        user_agent: &str,
    ) -> Result<Vec<VideoInfo>, ExtractError> {
        let mut cmd = self.command(user_agent);
        cmd.arg("--flat-playlist")
            .arg("--dump-json")
            .arg(format!("ytsearch{limit}:{query}"));

        let stdout = process::run(&self.ytdlp_path, cmd, self.process_timeout).await?;
        let results = parse_search_output(&stdout, limit);
        debug!("yt-dlp search for {query:?} returned {} results", results.len());
        Ok(results)
    }

    async fn fetch_audio(
        &self,
        video_id: &str,
        target: &AudioTarget,
        user_agent: &str,
    ) -> Result<Track, ExtractError> {
        let template = target.dir.join(format!("{}.%(ext)s", target.stem));

        let mut cmd = self.command(user_agent);
        cmd.arg("--no-playlist")
            .arg("--no-part")
            .arg("--no-mtime")
            .arg("--no-simulate")
            .arg("-f")
            .arg("bestaudio/best")
            .arg("-o")
            .arg(template)
            .arg("--print")
            .arg("%(.{id,title,duration,thumbnail,uploader,channel})j")
            .arg("--print")
            .arg("after_move:filepath")
            .arg("--")
            .arg(video_id);

        let stdout = process::run(&self.ytdlp_path, cmd, self.process_timeout).await?;
        let (entry, path) = parse_fetch_output(&stdout)?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ExtractError::NoOutput);
        }

        Ok(Track {
            info: entry.into_info(),
            path,
        })
    }
}

// One JSON object per line; lines that don't parse (e.g. stray warnings) are skipped.
fn parse_search_output(stdout: &str, limit: usize) -> Vec<VideoInfo> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<Entry>(line.trim()).ok())
        .map(Entry::into_info)
        .take(limit)
        .collect()
}

fn parse_fetch_output(stdout: &str) -> Result<(Entry, PathBuf), ExtractError> {
    let mut entry = None;
    let mut path = None;

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with('{') {
            entry = Some(serde_json::from_str::<Entry>(line)?);
        } else {
            path = Some(PathBuf::from(line));
        }
    }

    match (entry, path) {
        (Some(entry), Some(path)) => Ok((entry, path)),
        _ => Err(ExtractError::NoOutput),
    }
}
