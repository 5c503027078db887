use std::process::Stdio;
use std::time::Duration;

use log::trace;
use tokio::process::Command;

use super::ExtractError;

/// Runs `cmd` to completion, returning stdout. A non-zero exit status is
/// reported with the process' stderr. The child is killed if it outlives
/// `timeout`.
pub async fn run(program: &str, mut cmd: Command, timeout: Duration) -> Result<String, ExtractError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    trace!("running {program}: {cmd:?}");

    let child = cmd.spawn().map_err(|source| ExtractError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ExtractError::Timeout(timeout))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::Failed {
            program: program.to_string(),
            stderr: last_lines(&stderr, 5),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// yt-dlp and ffmpeg are chatty; only the tail explains the failure.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
