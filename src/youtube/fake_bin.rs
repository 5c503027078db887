//! Stand-in executables for yt-dlp and ffmpeg in tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes an executable `/bin/sh` script named `name` into `dir`.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A script that records its pid in `<dir>/pid` and then hangs.
pub fn hanging(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    let pid_file = dir.join("pid");
    let body = format!("echo $$ > '{}'\nexec sleep 30", pid_file.display());
    (script(dir, name, &body), pid_file)
}

/// Whether `pid` is still a live (non-zombie) process.
#[cfg(target_os = "linux")]
pub fn is_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // state follows the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Waits up to two seconds for `pid` to exit.
#[cfg(target_os = "linux")]
pub async fn exited(pid: u32) -> bool {
    for _ in 0..40 {
        if !is_running(pid) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    false
}

pub fn read_pid(pid_file: &Path) -> u32 {
    std::fs::read_to_string(pid_file).unwrap().trim().parse().unwrap()
}
