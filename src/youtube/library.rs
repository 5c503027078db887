use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use poem::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use youtube_dl::{Playlist, SingleVideo, YoutubeDlOutput};

use super::{process, watch_url, AudioTarget, ExtractError, Extractor, Track, VideoInfo};

// Opus and AAC fallbacks when nothing declares itself audio-only.
const FALLBACK_FORMAT_IDS: [&str; 2] = ["251", "140"];

/// Reads metadata and stream URLs from yt-dlp's JSON dump into the
/// `youtube_dl` crate's types, then downloads the chosen audio stream directly.
pub struct LibraryExtractor {
    ytdlp_path: String,
    socket_timeout: u64,
    process_timeout: Duration,
    client: Client,
}

impl LibraryExtractor {
    pub fn new(
        ytdlp_path: impl Into<String>,
        socket_timeout: u64,
        process_timeout: Duration,
    ) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(socket_timeout.max(1)))
            .timeout(process_timeout)
            .build()?;

        Ok(Self {
            ytdlp_path: ytdlp_path.into(),
            socket_timeout,
            process_timeout,
            client,
        })
    }

    // Same invocation the youtube_dl crate builds, spawned through
    // `process::run` so a timed out yt-dlp is killed.
    async fn resolve(
        &self,
        url: String,
        flat: bool,
        user_agent: &str,
    ) -> Result<YoutubeDlOutput, ExtractError> {
        let mut cmd = Command::new(&self.ytdlp_path);
        cmd.arg("--no-warnings")
            .arg("--dump-single-json")
            .arg("--socket-timeout")
            .arg(self.socket_timeout.to_string())
            .arg("--user-agent")
            .arg(user_agent);
        if flat {
            cmd.arg("--flat-playlist");
        }
        cmd.arg("--").arg(url);

        let stdout = process::run(&self.ytdlp_path, cmd, self.process_timeout).await?;
        parse_output(&stdout)
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        user_agent: &str,
    ) -> Result<(), ExtractError> {
        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExtractError::HttpStatus(response.status().as_u16()));
        }

        let partial = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&partial).await?;

        let written = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<_, ExtractError>(())
        }
        .await;

        if let Err(why) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                warn!("Failed to remove partial download {}: {cleanup}", partial.display());
            }
            return Err(why);
        }

        tokio::fs::rename(&partial, dest).await?;
        Ok(())
    }
}

#[async_trait]
impl Extractor for LibraryExtractor {
    fn name(&self) -> &'static str {
        "library"
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        user_agent: &str,
    ) -> Result<Vec<VideoInfo>, ExtractError> {
        let output = self
            .resolve(format!("ytsearch{limit}:{query}"), true, user_agent)
            .await?;

        let entries = match output.into_playlist() {
            Some(playlist) => playlist.entries.unwrap_or_default(),
            None => vec![],
        };

        debug!("youtube_dl search for {query:?} returned {} results", entries.len());

        Ok(entries.into_iter().take(limit).map(video_info).collect())
    }

    async fn fetch_audio(
        &self,
        video_id: &str,
        target: &AudioTarget,
        user_agent: &str,
    ) -> Result<Track, ExtractError> {
        let video = self
            .resolve(watch_url(video_id), false, user_agent)
            .await?
            .into_single_video()
            .ok_or(ExtractError::NoOutput)?;

        let candidates: Vec<AudioCandidate> = video
            .formats
            .iter()
            .flatten()
            .filter_map(AudioCandidate::from_format)
            .collect();
        let format = pick_audio_format(&candidates).ok_or(ExtractError::NoAudioFormat)?;

        debug!("downloading format {} ({}) for {video_id}", format.format_id, format.ext);

        let path = target.path_with_extension(&format.ext);
        self.download(&format.url, &path, user_agent).await?;

        Ok(Track {
            info: video_info(video),
            path,
        })
    }
}

fn parse_output(stdout: &str) -> Result<YoutubeDlOutput, ExtractError> {
    let value: Value = serde_json::from_str(stdout.trim())?;
    let output = if value.get("_type").and_then(Value::as_str) == Some("playlist") {
        YoutubeDlOutput::Playlist(Box::new(serde_json::from_value::<Playlist>(value)?))
    } else {
        YoutubeDlOutput::SingleVideo(Box::new(serde_json::from_value::<SingleVideo>(value)?))
    };
    Ok(output)
}

fn video_info(video: SingleVideo) -> VideoInfo {
    let duration = video.duration.as_ref().and_then(duration_secs);
    VideoInfo::new(
        video.id,
        video.title,
        duration,
        video.thumbnail,
        video.uploader,
    )
}

fn duration_secs(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[derive(Debug, Clone, PartialEq)]
struct AudioCandidate {
    format_id: String,
    url: String,
    ext: String,
    abr: f64,
    audio_only: bool,
}

impl AudioCandidate {
    fn from_format(format: &youtube_dl::Format) -> Option<Self> {
        let is_none = |codec: &Option<String>| codec.as_deref() == Some("none");
        if is_none(&format.acodec) {
            return None;
        }

        Some(Self {
            format_id: format.format_id.clone()?,
            url: format.url.clone()?,
            ext: format.ext.clone().unwrap_or_else(|| "webm".to_string()),
            abr: format.abr.unwrap_or(0.0),
            audio_only: is_none(&format.vcodec),
        })
    }
}

fn pick_audio_format(candidates: &[AudioCandidate]) -> Option<&AudioCandidate> {
    let best = candidates
        .iter()
        .filter(|c| c.audio_only)
        .max_by(|a, b| a.abr.total_cmp(&b.abr));

    best.or_else(|| {
        FALLBACK_FORMAT_IDS
            .iter()
            .find_map(|id| candidates.iter().find(|c| c.format_id == *id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(format_id: &str, abr: f64, audio_only: bool) -> AudioCandidate {
        AudioCandidate {
            format_id: format_id.to_string(),
            url: format!("https://example.com/{format_id}"),
            ext: "webm".to_string(),
            abr,
            audio_only,
        }
    }

    #[test]
    fn prefers_highest_bitrate_audio_only() {
        let candidates = vec![
            candidate("249", 50.0, true),
            candidate("18", 96.0, false),
            candidate("251", 160.0, true),
            candidate("140", 128.0, true),
        ];
        assert_eq!(pick_audio_format(&candidates).unwrap().format_id, "251");
    }

    #[test]
    fn falls_back_to_known_itags() {
        let candidates = vec![candidate("18", 96.0, false), candidate("140", 0.0, false)];
        assert_eq!(pick_audio_format(&candidates).unwrap().format_id, "140");

        let candidates = vec![candidate("18", 96.0, false)];
        assert!(pick_audio_format(&candidates).is_none());
    }

    #[test]
    fn single_video_and_playlist_output() {
        let video = parse_output(r#"{"id":"dQw4w9WgXcQ","title":"Never","formats":[]}"#)
            .unwrap()
            .into_single_video()
            .unwrap();
        assert_eq!(video.id, "dQw4w9WgXcQ");

        let playlist = parse_output(r#"{"_type":"playlist","entries":[{"id":"a"},null,{"id":"b"}]}"#)
            .unwrap()
            .into_playlist()
            .unwrap();
        assert_eq!(playlist.entries.unwrap().len(), 2);

        assert!(matches!(parse_output("ERROR: nope"), Err(ExtractError::Json(_))));
    }

    #[test]
    fn durations_from_json() {
        assert_eq!(duration_secs(&serde_json::json!(212)), Some(212.0));
        assert_eq!(duration_secs(&serde_json::json!(212.5)), Some(212.5));
        assert_eq!(duration_secs(&serde_json::json!("61")), Some(61.0));
        assert_eq!(duration_secs(&serde_json::json!(null)), None);
    }

    #[cfg(unix)]
    mod with_fake_ytdlp {
        use super::*;
        use crate::youtube::fake_bin;

        #[tokio::test]
        async fn search_reads_the_dumped_playlist() {
            let dir = tempfile::tempdir().unwrap();
            let args = dir.path().join("args");
            let body = format!(
                r#"printf '%s\n' "$@" > '{}'
cat <<'JSON'
{{"_type":"playlist","id":"rick","entries":[
  {{"_type":"url","id":"dQw4w9WgXcQ","title":"Never Gonna Give You Up","duration":212.0,"uploader":"Rick Astley"}},
  {{"_type":"url","id":"yPYZpwSpKmA","title":"Together Forever","duration":null}}
]}}
JSON"#,
                args.display()
            );
            let ytdlp = fake_bin::script(dir.path(), "yt-dlp", &body);

            let extractor =
                LibraryExtractor::new(ytdlp.to_str().unwrap(), 7, Duration::from_secs(5)).unwrap();
            let results = extractor.search("rick", 2, "ua-test").await.unwrap();

            assert_eq!(results.len(), 2);
            assert_eq!(results[0].id, "dQw4w9WgXcQ");
            assert_eq!(results[0].duration_text.as_deref(), Some("3:32"));
            assert_eq!(results[0].uploader.as_deref(), Some("Rick Astley"));
            assert_eq!(results[1].duration, None);

            let args = std::fs::read_to_string(args).unwrap();
            let args: Vec<&str> = args.lines().collect();
            assert!(args.contains(&"--flat-playlist"));
            assert!(args.windows(2).any(|w| w == ["--user-agent", "ua-test"]));
            assert!(args.windows(2).any(|w| w == ["--socket-timeout", "7"]));
            assert_eq!(args.last(), Some(&"ytsearch2:rick"));
        }

        #[cfg(target_os = "linux")]
        #[tokio::test]
        async fn timed_out_ytdlp_is_killed() {
            let dir = tempfile::tempdir().unwrap();
            let (ytdlp, pid_file) = fake_bin::hanging(dir.path(), "yt-dlp");

            let extractor =
                LibraryExtractor::new(ytdlp.to_str().unwrap(), 5, Duration::from_secs(1)).unwrap();
            let err = extractor.search("x", 1, "ua").await.unwrap_err();
            assert!(matches!(err, ExtractError::Timeout(_)), "{err}");

            let pid = fake_bin::read_pid(&pid_file);
            assert!(fake_bin::exited(pid).await, "yt-dlp {pid} still running after the timeout");
        }
    }

    mod download {
        use poem::listener::{Acceptor, Listener, TcpListener};
        use poem::{get, handler, Body, Route, Server};
        use tokio::io::AsyncWriteExt;

        use super::*;

        const AUDIO: &[u8] = b"not really opus but close enough";

        #[handler]
        fn audio() -> Vec<u8> {
            AUDIO.to_vec()
        }

        // Sends a few bytes, then never finishes the body.
        #[handler]
        fn stall() -> Body {
            let (mut tx, rx) = tokio::io::duplex(64);
            tokio::spawn(async move {
                let _ = tx.write_all(b"partial").await;
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(tx);
            });
            Body::from_async_read(rx)
        }

        async fn serve() -> String {
            let app = Route::new().at("/audio", get(audio)).at("/stall", get(stall));
            let acceptor = TcpListener::bind("127.0.0.1:0").into_acceptor().await.unwrap();
            let addr = *acceptor.local_addr()[0].as_socket_addr().unwrap();
            tokio::spawn(Server::new_with_acceptor(acceptor).run(app));
            format!("http://{addr}")
        }

        fn extractor(timeout: Duration) -> LibraryExtractor {
            LibraryExtractor::new("yt-dlp", 5, timeout).unwrap()
        }

        fn leftovers(dir: &Path) -> Vec<String> {
            std::fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        }

        #[tokio::test]
        async fn writes_part_file_then_renames() {
            let base = serve().await;
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("dQw4w9WgXcQ-0badf00d.webm");

            extractor(Duration::from_secs(5))
                .download(&format!("{base}/audio"), &dest, "ua")
                .await
                .unwrap();

            assert_eq!(std::fs::read(&dest).unwrap(), AUDIO);
            assert_eq!(leftovers(dir.path()), ["dQw4w9WgXcQ-0badf00d.webm"]);
        }

        #[tokio::test]
        async fn http_errors_leave_nothing_behind() {
            let base = serve().await;
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("x.webm");

            let err = extractor(Duration::from_secs(5))
                .download(&format!("{base}/missing"), &dest, "ua")
                .await
                .unwrap_err();
            assert!(matches!(err, ExtractError::HttpStatus(404)), "{err}");
            assert!(leftovers(dir.path()).is_empty());
        }

        #[tokio::test]
        async fn interrupted_body_removes_part_file() {
            let base = serve().await;
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("x.webm");

            let err = extractor(Duration::from_millis(500))
                .download(&format!("{base}/stall"), &dest, "ua")
                .await
                .unwrap_err();
            assert!(matches!(err, ExtractError::Http(_)), "{err}");
            assert!(leftovers(dir.path()).is_empty());
        }
    }
}
