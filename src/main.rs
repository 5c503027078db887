mod cache;
mod config;
mod errors;
mod range;
mod retry;
mod routes;
mod state;
mod storage;
mod user_agent;
mod youtube;

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use dotenvy::dotenv;
use fern::colors::{Color, ColoredLevelConfig};
use log::{error, info, LevelFilter};
use poem::{listener::TcpListener, Server};

use crate::cache::Cache;
use crate::config::{Config, ExtractorKind};
use crate::state::AppState;
use crate::storage::{spawn_cleanup, Storage};
use crate::user_agent::UserAgents;
use crate::youtube::{Extractor, LibraryExtractor, YtDlpExtractor};

fn setup_logger(level: LevelFilter) -> Result<(), fern::InitError> {
    let colors = ColoredLevelConfig::new()
        .debug(Color::BrightBlue)
        .warn(Color::Yellow)
        .error(Color::Red);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let date = Local::now();

            out.finish(format_args!(
                "{}[{} {} {}] {}\x1B[0m",
                format_args!(
                    "\x1B[{}m",
                    colors.get_color(&record.level()).to_fg_str()
                ),
                date.format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message,
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

fn build_extractor(config: &Config) -> Result<Arc<dyn Extractor>, youtube::ExtractError> {
    let extractor: Arc<dyn Extractor> = match config.extractor {
        ExtractorKind::YtDlp => Arc::new(YtDlpExtractor::new(
            &config.ytdlp_path,
            config.socket_timeout,
            config.process_timeout,
        )),
        ExtractorKind::Library => Arc::new(LibraryExtractor::new(
            &config.ytdlp_path,
            config.socket_timeout,
            config.process_timeout,
        )?),
    };
    Ok(extractor)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(why) => {
                error!("Failed to listen for SIGTERM: {why}");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    let _ = ctrl_c.await;

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(why) => {
            eprintln!("Failed to load config: {why}");
            return;
        }
    };

    if let Err(why) = setup_logger(config.log_level) {
        eprintln!("Failed to setup logger: {why}");
    }

    let storage = match Storage::new(&config.temp_dir) {
        Ok(storage) => storage,
        Err(why) => {
            error!("Failed to create {}: {why}", config.temp_dir.display());
            return;
        }
    };

    let cache = match &config.redis_url {
        Some(url) => match Cache::redis(url, config.cache_ttl).await {
            Ok(cache) => {
                info!("Connected to Redis");
                cache
            }
            Err(why) => {
                error!("Failed to connect to Redis: {why}");
                return;
            }
        },
        None => Cache::memory(config.cache_ttl),
    };

    let extractor = match build_extractor(&config) {
        Ok(extractor) => extractor,
        Err(why) => {
            error!("Failed to set up extractor: {why}");
            return;
        }
    };

    spawn_cleanup(
        storage.clone(),
        cache.clone(),
        config.cleanup_interval,
        config.file_max_age,
    );

    info!(
        "Serving audio from {} using the {} extractor and {} cache",
        storage.dir().display(),
        extractor.name(),
        cache.backend_name(),
    );

    let addr = config.bind_addr();
    let state = AppState {
        agents: UserAgents::new(config.user_agents.clone()),
        config: Arc::new(config),
        extractor,
        cache,
        storage,
    };

    let server = Server::new(TcpListener::bind(addr))
        .run_with_graceful_shutdown(
            routes::app(state),
            shutdown_signal(),
            Some(Duration::from_secs(10)),
        )
        .await;

    if let Err(why) = server {
        error!("Failed to start API: {why}");
    }
}
