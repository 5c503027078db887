use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use tokio::process::Command;

use super::{process, ExtractError};

/// Re-encodes `input` to mp3 next to it and removes the source file.
pub async fn transcode_mp3(
    ffmpeg: &str,
    input: &Path,
    timeout: Duration,
) -> Result<PathBuf, ExtractError> {
    let output = input.with_extension("mp3");
    if output == input {
        return Ok(output);
    }

    debug!("transcoding {} -> {}", input.display(), output.display());

    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-y")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(input)
        .arg("-vn")
        .arg("-codec:a")
        .arg("libmp3lame")
        .arg("-q:a")
        .arg("2")
        .arg(&output);

    if let Err(why) = process::run(ffmpeg, cmd, timeout).await {
        let _ = tokio::fs::remove_file(&output).await;
        return Err(why);
    }

    if let Err(why) = tokio::fs::remove_file(input).await {
        warn!("Failed to remove {} after transcoding: {why}", input.display());
    }

    Ok(output)
}
