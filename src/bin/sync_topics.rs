#![forbid(unsafe_code)]

//! Brings every topic folder under the data root in line with
//! `configs/main.yaml`, downloading only the videos that are missing.
//!
//! With `--add-topic-url "topic|url"` it records a new URL in the catalog
//! instead and exits without downloading anything.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use topictube_tools::catalog::{append_url, load_catalog, parse_topic_url, prepare_catalog};
use topictube_tools::config::{RuntimeOverrides, resolve_runtime_settings};
use topictube_tools::dispatch::DownloadOptions;
use topictube_tools::formats::FormatPresets;
use topictube_tools::layout::DataLayout;
use topictube_tools::logging;
use topictube_tools::sync::{SyncOptions, sync_catalog};
use topictube_tools::ytdlp::YtDlp;

#[derive(Debug, Parser)]
#[command(name = "sync_topics")]
#[command(about = "Download the catalog videos missing from each topic folder")]
#[command(version)]
struct Cli {
    /// Root folder holding `configs/` and one folder per topic
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Named format preset (best, 360p, 720p, ...); audio-only presets are refused
    #[arg(short, long)]
    format: Option<String>,

    /// Raw yt-dlp format selector, overrides --format
    #[arg(long)]
    format_id: Option<String>,

    /// Failed attempts after which a URL is skipped
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Videos taken from each `channel` entry (0 for all)
    #[arg(long)]
    max_channel_videos: Option<usize>,

    /// Append a URL to a topic instead of syncing, as "topic|url"
    #[arg(long, alias = "add_topic_url", value_name = "TOPIC|URL")]
    add_topic_url: Option<String>,

    /// Alternative `.env` file
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            data_root: self.data_root.clone(),
            format_preset: self.format.clone(),
            max_channel_videos: self.max_channel_videos,
            max_attempts: self.max_attempts,
            gemini_model: None,
            env_path: self.env_file.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    tracing::debug!(?cli, "parsed arguments");

    let settings = resolve_runtime_settings(cli.overrides())?;
    let layout = DataLayout::new(&settings.data_root);
    layout.prepare()?;
    if prepare_catalog(&layout.catalog)? {
        println!("Created catalog at {}", layout.catalog.display());
    }

    if let Some(raw) = &cli.add_topic_url {
        let (topic, url) = parse_topic_url(raw)?;
        append_url(&layout.catalog, &topic, &url)
            .with_context(|| format!("adding {url} to topic {topic:?}"))?;
        println!("Added {url} to topic {topic}");
        return Ok(());
    }

    let presets = FormatPresets::load(&layout.formats)?;
    let selector = presets.resolve_video(cli.format_id.as_deref(), &settings.format_preset)?;

    let backend = YtDlp::new(&settings.yt_dlp);
    backend.ensure_available()?;

    let options = SyncOptions {
        download: DownloadOptions::new(selector)?,
        max_attempts: settings.max_attempts,
    };

    println!("===================================");
    println!("Topic sync");
    println!("===================================");
    println!("Data root: {}", layout.root.display());
    println!("Catalog: {}", layout.catalog.display());
    println!("Format: {}", options.download.format_selector());
    println!();

    let catalog = load_catalog(&layout.catalog, &backend, settings.max_channel_videos);
    if catalog.is_empty() {
        println!("Catalog has no topics, nothing to do.");
        return Ok(());
    }
    println!("Topics to sync: {}", catalog.len());

    let report = sync_catalog(&layout, &catalog, &backend, &options);
    report.print_summary();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_topic_url_in_both_spellings() {
        for flag in ["--add-topic-url", "--add_topic_url"] {
            let cli = Cli::parse_from(["sync_topics", flag, "cooking|https://e.com/watch?v=1"]);
            assert_eq!(
                cli.add_topic_url.as_deref(),
                Some("cooking|https://e.com/watch?v=1")
            );
        }
    }

    #[test]
    fn flags_become_overrides() {
        let cli = Cli::parse_from([
            "sync_topics",
            "--data-root",
            "/data",
            "-f",
            "720p",
            "--max-attempts",
            "5",
            "--max-channel-videos",
            "0",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.data_root, Some(PathBuf::from("/data")));
        assert_eq!(overrides.format_preset.as_deref(), Some("720p"));
        assert_eq!(overrides.max_attempts, Some(5));
        assert_eq!(overrides.max_channel_videos, Some(0));
        assert!(!cli.verbose);
    }
}
