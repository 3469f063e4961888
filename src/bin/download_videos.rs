#![forbid(unsafe_code)]

//! Ad-hoc downloader: fetches the given URLs (or the URLs of a list file) into
//! a single folder, outside of the topic catalog.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use topictube_tools::catalog::{append_url, parse_topic_url, prepare_catalog};
use topictube_tools::config::{RuntimeOverrides, resolve_runtime_settings};
use topictube_tools::dispatch::{DEFAULT_FILENAME_TEMPLATE, DownloadOptions, download_all};
use topictube_tools::formats::FormatPresets;
use topictube_tools::layout::DataLayout;
use topictube_tools::logging;
use topictube_tools::urls::{expand_entries, read_url_list, write_url_list};
use topictube_tools::ytdlp::{FormatInfo, MediaBackend, YtDlp};

#[derive(Debug, Parser)]
#[command(name = "download_videos")]
#[command(about = "Download videos by URL into one folder")]
#[command(version)]
struct Cli {
    /// Video URLs to download
    urls: Vec<String>,

    /// File with one URL per line (`#` comments, `channel <url>` lines)
    #[arg(short, long)]
    input_file: Option<PathBuf>,

    /// Destination folder
    #[arg(short, long, default_value = "downloads")]
    output_dir: PathBuf,

    /// Named format preset
    #[arg(short, long, default_value = "best")]
    format: String,

    /// Raw yt-dlp format selector, overrides --format
    #[arg(long)]
    format_id: Option<String>,

    /// Print the muxed formats of each URL instead of downloading
    #[arg(short, long)]
    list_formats: bool,

    /// Also write the collected URLs to this file
    #[arg(long)]
    save_urls: Option<PathBuf>,

    /// Append a URL to a catalog topic, as "topic|url"
    #[arg(long, alias = "add_topic_url", value_name = "TOPIC|URL")]
    add_topic_url: Option<String>,

    /// Subtitle languages to fetch alongside the video (e.g. en,de)
    #[arg(long, value_delimiter = ',')]
    sub_langs: Vec<String>,

    /// Save the thumbnail next to the video
    #[arg(long)]
    write_thumbnail: bool,

    /// Container used when audio and video are merged
    #[arg(long, default_value = "mp4")]
    merge_format: String,

    /// File name pattern; `{id}` is the video id, `%(...)s` fields are yt-dlp's
    #[arg(long, default_value = DEFAULT_FILENAME_TEMPLATE)]
    output_template: String,

    /// Root folder holding `configs/`, for presets and the catalog
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    tracing::debug!(?cli, "parsed arguments");

    let settings = resolve_runtime_settings(RuntimeOverrides {
        data_root: cli.data_root.clone(),
        ..RuntimeOverrides::default()
    })?;
    let layout = DataLayout::new(&settings.data_root);

    if let Some(raw) = &cli.add_topic_url {
        let (topic, url) = parse_topic_url(raw)?;
        layout.prepare()?;
        prepare_catalog(&layout.catalog)?;
        append_url(&layout.catalog, &topic, &url)
            .with_context(|| format!("adding {url} to topic {topic:?}"))?;
        println!("Added {url} to topic {topic}");
        if cli.urls.is_empty() && cli.input_file.is_none() {
            return Ok(());
        }
    }

    let backend = YtDlp::new(&settings.yt_dlp);
    backend.ensure_available()?;

    let urls = collect_urls(
        &cli.urls,
        cli.input_file.as_deref(),
        &backend,
        settings.max_channel_videos,
    )?;

    if let Some(path) = &cli.save_urls {
        write_url_list(path, &urls, &[])?;
        println!("URLs saved to {}", path.display());
    }

    if cli.list_formats {
        for url in &urls {
            print_formats(&backend, url);
        }
        return Ok(());
    }

    let presets = FormatPresets::load(&layout.formats)?;
    if cli.format_id.is_none() && presets.get(&cli.format).is_none() {
        let names: Vec<_> = presets.names().collect();
        println!("Unknown format {:?}; known presets: {}", cli.format, names.join(", "));
    }
    let selector = presets.resolve(cli.format_id.as_deref(), &cli.format);
    let options = DownloadOptions::new(selector)?
        .with_merge_format(&cli.merge_format)?
        .with_filename_template(&cli.output_template)?
        .with_subtitles(cli.sub_langs.clone())
        .with_thumbnail(cli.write_thumbnail);

    fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("creating {}", cli.output_dir.display()))?;
    println!("Format preference: {}", cli.format);
    download_all(&backend, &urls, &cli.output_dir, &options);
    Ok(())
}

/// URLs of the list file (channels expanded) followed by the positional ones.
/// Fails when both are empty.
fn collect_urls(
    positional: &[String],
    input_file: Option<&Path>,
    backend: &dyn MediaBackend,
    max_channel_videos: Option<usize>,
) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    if let Some(path) = input_file {
        let entries = read_url_list(path)?;
        urls.extend(expand_entries(entries, backend, max_channel_videos));
    }
    urls.extend(positional.iter().cloned());
    if urls.is_empty() {
        bail!("no URLs provided; pass them as arguments or with -i/--input-file");
    }
    Ok(urls)
}

fn print_formats(backend: &dyn MediaBackend, url: &str) {
    println!();
    println!("Available formats for: {url}");
    println!("{}", "-".repeat(60));
    match backend.formats(url) {
        Ok(formats) => {
            for format in formats.iter().filter(|format| format.is_muxed()) {
                println!("  {}", format_line(format));
            }
        }
        Err(err) => println!("Error getting formats: {err:#}"),
    }
}

fn format_line(format: &FormatInfo) -> String {
    let height = format
        .height
        .map(|height| format!("{height}p"))
        .unwrap_or_else(|| "N/A".to_string());
    let size = format
        .filesize
        .or(format.filesize_approx)
        .map(|bytes| format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0)))
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "{} | {} | {} | {}",
        format.format_id,
        height,
        format.ext.as_deref().unwrap_or("N/A"),
        size
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_downloader_flags() {
        let cli = Cli::parse_from([
            "download_videos",
            "-i",
            "urls.txt",
            "-o",
            "out",
            "-f",
            "720p",
            "--sub-langs",
            "en,de",
            "https://e.com/watch?v=1",
        ]);
        assert_eq!(cli.urls, vec!["https://e.com/watch?v=1"]);
        assert_eq!(cli.input_file, Some(PathBuf::from("urls.txt")));
        assert_eq!(cli.output_dir, PathBuf::from("out"));
        assert_eq!(cli.format, "720p");
        assert_eq!(cli.sub_langs, vec!["en", "de"]);
        assert!(!cli.list_formats);
    }

    #[test]
    fn defaults_match_the_plain_downloader() {
        let cli = Cli::parse_from(["download_videos"]);
        assert!(cli.urls.is_empty());
        assert_eq!(cli.output_dir, PathBuf::from("downloads"));
        assert_eq!(cli.format, "best");
        assert_eq!(cli.merge_format, "mp4");
        assert_eq!(cli.output_template, "%(title)s_{id}.%(ext)s");
    }

    #[test]
    fn format_line_shows_size_in_megabytes() {
        let format = FormatInfo {
            format_id: "18".into(),
            ext: Some("mp4".into()),
            height: Some(360),
            vcodec: Some("avc1".into()),
            acodec: Some("mp4a".into()),
            filesize: Some(5 * 1024 * 1024),
            filesize_approx: None,
        };
        assert_eq!(format_line(&format), "18 | 360p | mp4 | 5.0MB");

        let unknown = FormatInfo {
            height: None,
            filesize: None,
            ..format
        };
        assert_eq!(format_line(&unknown), "18 | N/A | mp4 | N/A");
    }

    #[test]
    fn missing_urls_are_an_error() -> Result<()> {
        let backend = YtDlp::new("/definitely/not/here/yt-dlp");
        let err = collect_urls(&[], None, &backend, None).unwrap_err();
        assert!(err.to_string().contains("no URLs provided"));

        let dir = tempdir()?;
        let list = dir.path().join("urls.txt");
        fs::write(&list, "# nothing yet\n\n")?;
        assert!(collect_urls(&[], Some(&list), &backend, None).is_err());
        assert!(collect_urls(&[], Some(&dir.path().join("absent.txt")), &backend, None).is_err());
        Ok(())
    }

    #[test]
    fn list_file_urls_come_first() -> Result<()> {
        let dir = tempdir()?;
        let list = dir.path().join("urls.txt");
        fs::write(&list, "https://e.com/watch?v=1\n")?;
        let backend = YtDlp::new("/definitely/not/here/yt-dlp");
        let urls = collect_urls(
            &["https://e.com/watch?v=2".to_string()],
            Some(&list),
            &backend,
            None,
        )?;
        assert_eq!(urls, vec!["https://e.com/watch?v=1", "https://e.com/watch?v=2"]);
        Ok(())
    }
}
