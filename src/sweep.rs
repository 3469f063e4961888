#![forbid(unsafe_code)]

//! Removes everything but finished videos from a topic folder: `.part` files
//! of interrupted downloads, subtitles, thumbnails and other side artifacts.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Container extensions that count as a downloaded video.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm"];

/// True when `name` ends in one of [`VIDEO_EXTENSIONS`] (ASCII case-insensitive).
pub fn is_video_file_name(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        VIDEO_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
    })
}

/// Deletes every file in `folder` that is not a video and returns how many
/// were removed. Subdirectories are left untouched.
pub fn sweep(folder: &Path) -> Result<usize> {
    let mut removed = Vec::new();
    for entry in fs::read_dir(folder).with_context(|| format!("reading {}", folder.display()))? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("inspecting {}", path.display()))?;
        if file_type.is_dir() {
            tracing::debug!(path = %path.display(), "leaving subdirectory in place");
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_video_file_name(&name) {
            continue;
        }
        fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))?;
        removed.push(name);
    }

    if !removed.is_empty() {
        removed.sort();
        tracing::info!(folder = %folder.display(), files = ?removed, "deleted {} non-video files", removed.len());
    }
    Ok(removed.len())
}
