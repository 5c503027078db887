use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use lazy_regex::regex_is_match;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::cache::Cache;
use crate::errors::ApiError;
use crate::youtube::AudioTarget;

/// The temp directory extracted audio is written to and streamed from.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: Arc<PathBuf>,
}

impl Storage {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let dir = std::fs::canonicalize(dir)?;
        Ok(Self { dir: Arc::new(dir) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A fresh `<video id>-<8 hex chars>` stem so concurrent extractions of
    /// the same video never collide.
    pub fn new_target(&self, video_id: &str) -> AudioTarget {
        let suffix = Uuid::new_v4().simple().to_string();
        AudioTarget {
            dir: self.dir.to_path_buf(),
            stem: format!("{video_id}-{}", &suffix[..8]),
        }
    }

    /// Maps a client-supplied filename to a file inside the directory.
    pub async fn resolve(&self, filename: &str) -> Result<PathBuf, ApiError> {
        if !is_valid_filename(filename) {
            return Err(ApiError::InvalidFilename);
        }

        let path = self.dir.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(ApiError::NotFound),
            Err(why) if why.kind() == io::ErrorKind::NotFound => Err(ApiError::NotFound),
            Err(why) => Err(why.into()),
        }
    }

    /// Whether `path` names a regular file directly inside the directory,
    /// however the extractor spelled it.
    pub async fn contains(&self, path: &Path) -> bool {
        let path = match tokio::fs::canonicalize(path).await {
            Ok(path) => path,
            Err(_) => return false,
        };
        path.parent() == Some(self.dir.as_path())
            && tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false)
    }

    /// Deletes regular files last modified more than `max_age` ago.
    pub async fn cleanup(&self, max_age: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(self.dir.as_path()).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(why) => {
                    warn!("Failed to stat {}: {why}", path.display());
                    continue;
                }
            };

            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Removed {} ({}s old)", path.display(), age.as_secs());
                    removed += 1;
                }
                Err(why) => warn!("Failed to remove {}: {why}", path.display()),
            }
        }

        Ok(removed)
    }
}

pub fn is_valid_filename(filename: &str) -> bool {
    regex_is_match!(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9]{1,5}$", filename)
}

/// Periodically sweeps old files out of `storage` and expired entries out of `cache`.
pub fn spawn_cleanup(
    storage: Storage,
    cache: Cache,
    interval: Duration,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match storage.cleanup(max_age).await {
                Ok(0) => {}
                Ok(removed) => info!("Cleanup removed {removed} old audio files"),
                Err(why) => warn!("Cleanup of {} failed: {why}", storage.dir().display()),
            }

            let purged = cache.purge_expired().await;
            if purged > 0 {
                debug!("Purged {purged} expired cache entries");
            }
        }
    })
}
