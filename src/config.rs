use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;

use crate::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    /// Shells out to the yt-dlp binary for everything.
    YtDlp,
    /// Resolves formats through the youtube_dl crate and downloads them directly.
    Library,
}

impl FromStr for ExtractorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ytdlp" | "yt-dlp" => Ok(Self::YtDlp),
            "library" | "lib" => Ok(Self::Library),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transcode {
    None,
    Mp3,
}

impl FromStr for Transcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Ok(Self::None),
            "mp3" => Ok(Self::Mp3),
            _ => Err(()),
        }
    }
}

/// How the wait between retries grows, scaled by `RETRY_DELAY_MS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Immediate,
    Fixed,
    Exponential,
}

impl FromStr for Backoff {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" | "none" => Ok(Self::Immediate),
            "fixed" | "delay" => Ok(Self::Fixed),
            "exponential" | "exp" => Ok(Self::Exponential),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub temp_dir: PathBuf,
    pub extractor: ExtractorKind,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    pub transcode: Transcode,
    pub search_limit: usize,
    pub max_search_limit: usize,
    pub socket_timeout: u64,
    pub process_timeout: Duration,
    pub retries: usize,
    pub retry_delay: Duration,
    pub retry_backoff: Backoff,
    pub cache_ttl: Duration,
    pub file_max_age: Duration,
    pub cleanup_interval: Duration,
    pub redis_url: Option<String>,
    pub user_agents: Vec<String>,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let temp_dir = get("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("audio-relay"));

        let user_agents = get("USER_AGENTS")
            .map(|v| {
                v.split('|')
                    .map(str::trim)
                    .filter(|ua| !ua.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let max_search_limit: usize = parse(&get, "MAX_SEARCH_LIMIT", 25)?;

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse(&get, "PORT", 3000)?,
            temp_dir,
            extractor: parse(&get, "EXTRACTOR", ExtractorKind::YtDlp)?,
            ytdlp_path: get("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            ffmpeg_path: get("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            transcode: parse(&get, "TRANSCODE", Transcode::None)?,
            search_limit: parse::<usize, _>(&get, "SEARCH_LIMIT", 10)?.clamp(1, max_search_limit.max(1)),
            max_search_limit: max_search_limit.max(1),
            socket_timeout: parse(&get, "SOCKET_TIMEOUT", 15)?,
            process_timeout: Duration::from_secs(parse(&get, "PROCESS_TIMEOUT", 300)?),
            retries: parse(&get, "RETRIES", 3)?,
            retry_delay: Duration::from_millis(parse(&get, "RETRY_DELAY_MS", 500)?),
            retry_backoff: parse(&get, "RETRY_BACKOFF", Backoff::Exponential)?,
            cache_ttl: Duration::from_secs(parse(&get, "CACHE_TTL", 3600)?),
            file_max_age: Duration::from_secs(parse(&get, "FILE_MAX_AGE", 3600)?),
            cleanup_interval: Duration::from_secs(parse::<u64, _>(&get, "CLEANUP_INTERVAL", 600)?.max(1)),
            redis_url: get("REDIS"),
            user_agents,
            log_level: parse(&get, "LOG_LEVEL", LevelFilter::Info)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self.retry_backoff {
            Backoff::Immediate => RetryPolicy::Immediate,
            Backoff::Fixed => RetryPolicy::Delay(self.retry_delay),
            Backoff::Exponential => RetryPolicy::Exponential(self.retry_delay),
        }
    }
}

fn parse<T, F>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
