use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cache::{play_key, search_key, Cache};
use crate::config::{Config, Transcode};
use crate::errors::ApiError;
use crate::retry::{retry_async, RetryOptions};
use crate::storage::Storage;
use crate::user_agent::UserAgents;
use crate::youtube::{transcode_mp3, ExtractError, Extractor, Track, VideoInfo};

/// What `/play` hands back: the video's metadata plus where to stream it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayedTrack {
    #[serde(flatten)]
    pub info: VideoInfo,
    pub filename: String,
    pub stream_url: String,
    pub cached: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub extractor: Arc<dyn Extractor>,
    pub cache: Cache,
    pub storage: Storage,
    pub agents: UserAgents,
}

impl AppState {
    fn retry_options(&self) -> RetryOptions {
        RetryOptions::new()
            .with_max_retries(self.config.retries)
            .with_policy(self.config.retry_policy())
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoInfo>, ApiError> {
        let key = search_key(query, limit);
        if let Some(results) = self.cache.get_json::<Vec<VideoInfo>>(&key).await {
            debug!("search cache hit for {query:?}");
            return Ok(results);
        }

        let results = retry_async(self.retry_options(), "search failed", |_| {
            let user_agent = self.agents.rotate().to_string();
            async move { self.extractor.search(query, limit, &user_agent).await }
        })
        .await
        .map_err(ApiError::Search)?;

        self.cache.set_json(&key, &results).await;
        Ok(results)
    }

    pub async fn play(&self, video_id: &str) -> Result<PlayedTrack, ApiError> {
        let key = play_key(video_id);
        if let Some(mut played) = self.cache.get_json::<PlayedTrack>(&key).await {
            if self.storage.resolve(&played.filename).await.is_ok() {
                debug!("play cache hit for {video_id}");
                played.cached = true;
                return Ok(played);
            }
            debug!("cached file for {video_id} is gone, extracting again");
            self.cache.remove(&key).await;
        }

        let msg = format!("extraction of {video_id} failed");
        let mut track = retry_async(self.retry_options(), &msg, |_| {
            let target = self.storage.new_target(video_id);
            let user_agent = self.agents.rotate().to_string();
            async move { self.extractor.fetch_audio(video_id, &target, &user_agent).await }
        })
        .await
        .map_err(ApiError::Extraction)?;

        if !self.storage.contains(&track.path).await {
            warn!("{} produced a file outside of storage: {}", self.extractor.name(), track.path.display());
            return Err(ApiError::Extraction(ExtractError::NoOutput));
        }

        if self.config.transcode == Transcode::Mp3 {
            self.transcode(&mut track).await;
        }

        let filename = track
            .filename()
            .ok_or(ApiError::Extraction(ExtractError::NoOutput))?
            .to_string();
        info!("extracted {video_id} to {filename}");

        let played = PlayedTrack {
            stream_url: format!("/stream/{filename}"),
            info: track.info,
            filename,
            cached: false,
        };
        self.cache.set_json(&key, &played).await;
        Ok(played)
    }

    // A failed transcode still leaves a playable source file, so serve that.
    async fn transcode(&self, track: &mut Track) {
        let config = &self.config;
        match transcode_mp3(&config.ffmpeg_path, &track.path, config.process_timeout).await {
            Ok(path) => track.path = path,
            Err(why) => warn!("Transcoding {} failed, serving original: {why}", track.path.display()),
        }
    }
}
