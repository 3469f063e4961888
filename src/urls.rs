#![forbid(unsafe_code)]

//! Plain-text URL list files shared by the downloader and the extractor.
//!
//! One entry per line. Blank lines and lines starting with `#` are skipped,
//! `channel <url>` lines name a channel to expand.

use crate::channel::resolve_channel;
use crate::layout::write_json_atomic;
use crate::ytdlp::MediaBackend;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const CHANNEL_PREFIX: &str = "channel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlEntry {
    Video(String),
    Channel(String),
}

pub fn parse_url_list(raw: &str) -> Vec<UrlEntry> {
    let mut entries = Vec::new();
    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some(prefix), Some(url), None) if prefix.eq_ignore_ascii_case(CHANNEL_PREFIX) => {
                entries.push(UrlEntry::Channel(url.to_string()));
            }
            (Some(url), None, None) => entries.push(UrlEntry::Video(url.to_string())),
            _ => tracing::warn!(line_number = number + 1, "unknown line: {line}"),
        }
    }
    entries
}

pub fn read_url_list(path: &Path) -> Result<Vec<UrlEntry>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_url_list(&raw))
}

/// Video URLs of `entries`, with every channel replaced by its videos.
pub fn expand_entries(
    entries: Vec<UrlEntry>,
    backend: &dyn MediaBackend,
    max_videos: Option<usize>,
) -> Vec<String> {
    let mut urls = Vec::new();
    for entry in entries {
        match entry {
            UrlEntry::Video(url) => urls.push(url),
            UrlEntry::Channel(channel) => urls.extend(resolve_channel(backend, &channel, max_videos)),
        }
    }
    urls
}

/// Only the plain URLs of a list, for files that cannot hold channels.
pub fn plain_urls(entries: Vec<UrlEntry>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| match entry {
            UrlEntry::Video(url) | UrlEntry::Channel(url) => url,
        })
        .collect()
}

/// Writes one URL per line, preceded by `header` as `#` comments.
pub fn write_url_list(path: &Path, urls: &[String], header: &[&str]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut body = String::new();
    for line in header {
        body.push_str("# ");
        body.push_str(line);
        body.push('\n');
    }
    if !header.is_empty() {
        body.push('\n');
    }
    for url in urls {
        body.push_str(url);
        body.push('\n');
    }
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ExtractionInfo {
    pub total_channels: usize,
    pub total_videos: usize,
    pub successful_channels: usize,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ChannelResult {
    pub video_count: usize,
    pub urls: Vec<String>,
}

/// JSON document written by `extract_channel --json-file`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ExtractionReport {
    pub extraction_info: ExtractionInfo,
    pub channels: BTreeMap<String, ChannelResult>,
}

impl ExtractionReport {
    pub fn from_results(results: &[(String, Vec<String>)]) -> Self {
        let channels: BTreeMap<String, ChannelResult> = results
            .iter()
            .map(|(channel, urls)| {
                (
                    channel.clone(),
                    ChannelResult {
                        video_count: urls.len(),
                        urls: urls.clone(),
                    },
                )
            })
            .collect();
        Self {
            extraction_info: ExtractionInfo {
                total_channels: channels.len(),
                total_videos: channels.values().map(|result| result.video_count).sum(),
                successful_channels: channels.values().filter(|result| result.video_count > 0).count(),
            },
            channels,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}
