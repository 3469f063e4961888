#![forbid(unsafe_code)]

//! Lists the video URLs of one or more channels and writes them to a URL list
//! that `download_videos -i` can consume.

use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use topictube_tools::channel::resolve_channels;
use topictube_tools::config::load_runtime_settings;
use topictube_tools::logging;
use topictube_tools::urls::{ExtractionReport, plain_urls, read_url_list, write_url_list};
use topictube_tools::ytdlp::YtDlp;

const URL_LIST_HEADER: &[&str] = &[
    "Video URLs extracted from channel",
    "Generated by extract_channel",
];

#[derive(Debug, Parser)]
#[command(name = "extract_channel")]
#[command(about = "Extract all video URLs from channels")]
#[command(version)]
struct Cli {
    /// Channel URLs to extract from
    channels: Vec<String>,

    /// File containing channel URLs (one per line)
    #[arg(short, long)]
    input_file: Option<PathBuf>,

    /// Output file for URLs, relative to --output-dir
    #[arg(short, long, default_value = "channel_urls.txt")]
    output_file: PathBuf,

    /// Output JSON file for detailed results, relative to --output-dir
    #[arg(short, long)]
    json_file: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'd', long, default_value = "extracted_urls")]
    output_dir: PathBuf,

    /// Maximum number of videos to extract per channel
    #[arg(short, long)]
    max_videos: Option<usize>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    tracing::debug!(?cli, "parsed arguments");

    let mut channels = Vec::new();
    if let Some(path) = &cli.input_file {
        channels.extend(plain_urls(read_url_list(path)?));
    }
    channels.extend(cli.channels.iter().cloned());
    if channels.is_empty() {
        bail!("no channel URLs provided; use -i/--input-file or pass URLs as arguments");
    }

    let settings = load_runtime_settings()?;
    let backend = YtDlp::new(&settings.yt_dlp);
    backend.ensure_available()?;

    let max_videos = cli.max_videos.filter(|max| *max > 0);
    let results = resolve_channels(&backend, &channels, max_videos);
    let all_urls: Vec<String> = results
        .iter()
        .flat_map(|(_, urls)| urls.iter().cloned())
        .collect();

    let url_file = cli.output_dir.join(&cli.output_file);
    write_url_list(&url_file, &all_urls, URL_LIST_HEADER)?;
    println!("URLs saved to: {}", url_file.display());

    if let Some(json_file) = &cli.json_file {
        let json_path = cli.output_dir.join(json_file);
        ExtractionReport::from_results(&results).save(&json_path)?;
        println!("Results saved to: {}", json_path.display());
    }

    println!();
    println!("Ready to download! Use these commands:");
    println!("download_videos -i {}", url_file.display());
    println!("download_videos -i {} -f 720p", url_file.display());
    println!("download_videos -i {} -f mp4 -o downloads", url_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extractor_flags() {
        let cli = Cli::parse_from([
            "extract_channel",
            "-m",
            "10",
            "-o",
            "my_urls.txt",
            "-j",
            "results.json",
            "https://www.youtube.com/@example",
        ]);
        assert_eq!(cli.channels, vec!["https://www.youtube.com/@example"]);
        assert_eq!(cli.max_videos, Some(10));
        assert_eq!(cli.output_file, PathBuf::from("my_urls.txt"));
        assert_eq!(cli.json_file, Some(PathBuf::from("results.json")));
        assert_eq!(cli.output_dir, PathBuf::from("extracted_urls"));
    }

    #[test]
    fn output_dir_has_a_short_flag() {
        let cli = Cli::parse_from(["extract_channel", "-d", "out", "-i", "channels.txt"]);
        assert_eq!(cli.output_dir, PathBuf::from("out"));
        assert_eq!(cli.input_file, Some(PathBuf::from("channels.txt")));
        assert!(cli.channels.is_empty());
    }
}
