#![forbid(unsafe_code)]

//! Sequential download of a batch of URLs into one folder.
//!
//! Every URL is fetched independently: a failure is recorded in the returned
//! [`BatchReport`] and the loop moves on. Retrying is left to the next run.

use crate::identifier::identifier_from_url;
use crate::sweep::VIDEO_EXTENSIONS;
use crate::ytdlp::{FetchRequest, MediaBackend};
use anyhow::{Result, bail};
use std::path::Path;

pub const DEFAULT_MERGE_FORMAT: &str = "mp4";

/// File name pattern inside the destination folder. `{id}` is replaced by the
/// video identifier, the `%(...)s` fields are filled in by yt-dlp.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "%(title)s_{id}.%(ext)s";

const ID_PLACEHOLDER: &str = "{id}";
const EXT_FIELD: &str = "%(ext)s";
/// Used in place of `{id}` when the URL carries no identifier.
const YTDLP_ID_FIELD: &str = "%(id)s";

/// Validated knobs for a download batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    format_selector: String,
    filename_template: String,
    merge_format: String,
    subtitle_languages: Vec<String>,
    write_thumbnail: bool,
}

impl DownloadOptions {
    pub fn new(format_selector: impl Into<String>) -> Result<Self> {
        let format_selector = format_selector.into().trim().to_string();
        if format_selector.is_empty() {
            bail!("format selector must not be empty");
        }
        Ok(Self {
            format_selector,
            filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
            merge_format: DEFAULT_MERGE_FORMAT.to_string(),
            subtitle_languages: Vec::new(),
            write_thumbnail: false,
        })
    }

    pub fn with_merge_format(mut self, container: &str) -> Result<Self> {
        let container = container.trim().trim_start_matches('.').to_ascii_lowercase();
        if !VIDEO_EXTENSIONS.contains(&container.as_str()) {
            bail!(
                "merge container {container:?} is not one of {}",
                VIDEO_EXTENSIONS.join(", ")
            );
        }
        self.merge_format = container;
        Ok(self)
    }

    pub fn with_filename_template(mut self, template: &str) -> Result<Self> {
        if !template.contains(EXT_FIELD) {
            bail!("output template {template:?} must contain {EXT_FIELD}");
        }
        if template.contains(['/', '\\']) {
            bail!("output template {template:?} must be a plain file name");
        }
        if !template.contains(ID_PLACEHOLDER) {
            tracing::warn!(
                template,
                "output template has no {ID_PLACEHOLDER}; downloads will not be recognized on the next run"
            );
        }
        self.filename_template = template.to_string();
        Ok(self)
    }

    pub fn with_subtitles(mut self, languages: Vec<String>) -> Self {
        self.subtitle_languages = languages
            .into_iter()
            .map(|language| language.trim().to_string())
            .filter(|language| !language.is_empty())
            .collect();
        self
    }

    pub fn with_thumbnail(mut self, enabled: bool) -> Self {
        self.write_thumbnail = enabled;
        self
    }

    pub fn format_selector(&self) -> &str {
        &self.format_selector
    }

    pub fn merge_format(&self) -> &str {
        &self.merge_format
    }

    pub fn subtitle_languages(&self) -> &[String] {
        &self.subtitle_languages
    }

    pub fn write_thumbnail(&self) -> bool {
        self.write_thumbnail
    }

    /// Full yt-dlp output template for a video saved into `destination`.
    pub fn output_template(&self, destination: &Path, identifier: Option<&str>) -> String {
        let file_name = self
            .filename_template
            .replace(ID_PLACEHOLDER, identifier.unwrap_or(YTDLP_ID_FIELD));
        destination.join(file_name).to_string_lossy().into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloaded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub url: String,
    pub status: DownloadStatus,
}

impl DownloadOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == DownloadStatus::Downloaded
    }
}

/// Per-URL outcomes of one batch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<DownloadOutcome>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.succeeded()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.status {
            DownloadStatus::Failed(reason) => Some((outcome.url.as_str(), reason.as_str())),
            DownloadStatus::Downloaded => None,
        })
    }

    pub fn print_summary(&self) {
        let failed: Vec<(&str, &str)> = self.failed().collect();
        println!();
        println!("==================================================");
        println!("DOWNLOAD SUMMARY");
        println!("==================================================");
        println!("Total videos: {}", self.total());
        println!("Successful: {}", self.successful());
        println!("Failed: {}", failed.len());
        if !failed.is_empty() {
            println!();
            println!("Failed downloads:");
            for (url, reason) in failed {
                println!("  - {url} ({reason})");
            }
        }
    }
}

/// Downloads a single URL into `destination`. Never retries.
pub fn download_one(
    backend: &dyn MediaBackend,
    url: &str,
    destination: &Path,
    options: &DownloadOptions,
) -> DownloadOutcome {
    let identifier = identifier_from_url(url);
    let template = options.output_template(destination, identifier.as_deref());
    let request = FetchRequest {
        url,
        format_selector: options.format_selector(),
        output_template: &template,
        merge_output_format: options.merge_format(),
        subtitle_languages: options.subtitle_languages(),
        write_thumbnail: options.write_thumbnail(),
    };

    println!("Downloading: {url}");
    println!("Format: {}", options.format_selector());
    let status = match backend.fetch(&request) {
        Ok(()) => {
            println!("Video downloaded successfully and saved in: {}", destination.display());
            DownloadStatus::Downloaded
        }
        Err(err) => {
            tracing::warn!(url, "download failed: {err:#}");
            println!("Download failed: {err}");
            DownloadStatus::Failed(format!("{err:#}"))
        }
    };
    DownloadOutcome {
        url: url.to_string(),
        status,
    }
}

/// Downloads every URL in order and prints a summary.
pub fn download_all(
    backend: &dyn MediaBackend,
    urls: &[String],
    destination: &Path,
    options: &DownloadOptions,
) -> BatchReport {
    println!("Starting batch download of {} videos...", urls.len());
    println!("Output directory: {}", destination.display());

    let mut report = BatchReport::default();
    for (index, url) in urls.iter().enumerate() {
        println!();
        println!("[{}/{}] Processing: {}", index + 1, urls.len(), url);
        report
            .outcomes
            .push(download_one(backend, url, destination, options));
    }
    report.print_summary();
    report
}
