#![forbid(unsafe_code)]

//! Thin adapter over the `yt-dlp` executable.
//!
//! Everything network-related (extraction, format negotiation, muxing) is left
//! to yt-dlp. The rest of the crate talks to it through [`MediaBackend`] so the
//! reconciliation logic can be exercised without the real program.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

/// One entry of a flat channel or playlist listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelVideo {
    pub url: String,
    pub title: Option<String>,
}

/// A channel listing as returned by a flat extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelListing {
    pub title: Option<String>,
    pub entries: Vec<ChannelVideo>,
}

/// A single downloadable stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FormatInfo {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub filesize: Option<i64>,
    #[serde(default)]
    pub filesize_approx: Option<i64>,
}

impl FormatInfo {
    /// Streams carrying both audio and video.
    pub fn is_muxed(&self) -> bool {
        let has = |codec: &Option<String>| {
            codec
                .as_deref()
                .is_some_and(|codec| !codec.eq_ignore_ascii_case("none"))
        };
        has(&self.vcodec) && has(&self.acodec)
    }
}

/// What to pass to a single `fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub format_selector: &'a str,
    pub output_template: &'a str,
    pub merge_output_format: &'a str,
    pub subtitle_languages: &'a [String],
    pub write_thumbnail: bool,
}

/// The external download capability consumed by the core.
pub trait MediaBackend {
    /// Enumerates a channel without downloading anything.
    fn list_channel(&self, channel_url: &str, max_videos: Option<usize>)
    -> Result<ChannelListing>;

    /// Downloads one video according to `request`.
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<()>;

    /// Lists the formats offered for a video.
    fn formats(&self, url: &str) -> Result<Vec<FormatInfo>>;
}

#[derive(Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
}

#[derive(Deserialize)]
struct FlatEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct VideoFormats {
    #[serde(default)]
    formats: Vec<FormatInfo>,
}

/// `yt-dlp` invoked as a subprocess.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    /// Runs `<program> --version` to fail loudly when yt-dlp is missing.
    pub fn ensure_available(&self) -> Result<()> {
        let status = self
            .command()
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(_) => bail!(
                "{} is installed but returned a failure status",
                self.program.display()
            ),
            Err(err) => bail!(
                "{} is not installed or not in PATH: {}",
                self.program.display(),
                err
            ),
        }
    }

    fn execute(&self, mut command: Command, what: &str) -> Result<Output> {
        tracing::debug!(?command, "running yt-dlp");
        command
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("{what}: could not execute {}", self.program.display()))
    }

    fn run(&self, command: Command, what: &str) -> Result<Output> {
        let output = self.execute(command, what)?;
        if !output.status.success() {
            bail!("{}", failure_message(what, &output));
        }
        Ok(output)
    }
}

impl MediaBackend for YtDlp {
    fn list_channel(
        &self,
        channel_url: &str,
        max_videos: Option<usize>,
    ) -> Result<ChannelListing> {
        let mut command = self.command();
        command
            .arg("--flat-playlist")
            .arg("--dump-single-json")
            .arg("--ignore-errors")
            .arg("--no-warnings")
            .arg("--quiet");
        if let Some(max) = max_videos {
            command.arg("--playlist-end").arg(max.to_string());
        }
        command.arg(channel_url);

        // With --ignore-errors yt-dlp still exits non-zero after skipping a
        // broken entry, so a parseable listing is kept regardless of status.
        let what = format!("listing {channel_url}");
        let output = self.execute(command, &what)?;
        match parse_flat_playlist(&output.stdout) {
            Ok(listing) => {
                if !output.status.success() {
                    tracing::warn!(
                        channel = channel_url,
                        entries = listing.entries.len(),
                        "keeping partial listing: {}",
                        last_error_line(&output.stderr)
                    );
                }
                Ok(listing)
            }
            Err(err) if output.status.success() => {
                Err(err).with_context(|| format!("parsing channel listing for {channel_url}"))
            }
            Err(_) => bail!("{}", failure_message(&what, &output)),
        }
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<()> {
        let mut command = self.command();
        command
            .arg("--format")
            .arg(request.format_selector)
            .arg("--output")
            .arg(request.output_template)
            .arg("--merge-output-format")
            .arg(request.merge_output_format)
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("--no-warnings");
        if !request.subtitle_languages.is_empty() {
            command
                .arg("--write-subs")
                .arg("--write-auto-subs")
                .arg("--sub-langs")
                .arg(request.subtitle_languages.join(","));
        }
        if request.write_thumbnail {
            command.arg("--write-thumbnail");
        }
        command.arg(request.url);

        self.run(command, &format!("downloading {}", request.url))?;
        Ok(())
    }

    fn formats(&self, url: &str) -> Result<Vec<FormatInfo>> {
        let mut command = self.command();
        command
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg(url);

        let output = self.run(command, &format!("fetching formats for {url}"))?;
        let info: VideoFormats =
            serde_json::from_slice(&output.stdout).context("deserializing format listing")?;
        Ok(info.formats)
    }
}

/// Watch URL for a bare video id, used when a flat entry lacks its own URL.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

fn parse_flat_playlist(raw: &[u8]) -> Result<ChannelListing> {
    let playlist: FlatPlaylist = serde_json::from_slice(raw)?;
    let entries = playlist
        .entries
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let url = entry
                .url
                .filter(|url| !url.trim().is_empty())
                .or_else(|| entry.id.as_deref().map(watch_url))?;
            Some(ChannelVideo {
                url,
                title: entry.title,
            })
        })
        .collect();
    Ok(ChannelListing {
        title: playlist.title,
        entries,
    })
}

fn failure_message(what: &str, output: &Output) -> String {
    format!(
        "{what} failed (status {}): {}",
        output.status,
        last_error_line(&output.stderr)
    )
}

fn last_error_line(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no error output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use std::fs;
    #[cfg(unix)]
    use std::path::Path;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;
    #[cfg(unix)]
    use tempfile::tempdir;

    #[test]
    fn parses_flat_listing_and_fills_missing_urls() -> Result<()> {
        let raw = br#"{
            "title": "Some Channel - Videos",
            "entries": [
                {"id": "a1", "url": "https://www.youtube.com/watch?v=a1", "title": "First"},
                null,
                {"id": "b2", "title": "Second"},
                {"title": "Broken"}
            ]
        }"#;
        let listing = parse_flat_playlist(raw)?;
        assert_eq!(listing.title.as_deref(), Some("Some Channel - Videos"));
        assert_eq!(
            listing.entries,
            vec![
                ChannelVideo {
                    url: "https://www.youtube.com/watch?v=a1".into(),
                    title: Some("First".into()),
                },
                ChannelVideo {
                    url: "https://www.youtube.com/watch?v=b2".into(),
                    title: Some("Second".into()),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn muxed_formats_need_both_codecs() {
        let format = |vcodec: &str, acodec: &str| FormatInfo {
            format_id: "x".into(),
            ext: Some("mp4".into()),
            height: Some(360),
            vcodec: Some(vcodec.into()),
            acodec: Some(acodec.into()),
            filesize: None,
            filesize_approx: None,
        };
        assert!(format("avc1", "mp4a").is_muxed());
        assert!(!format("none", "mp4a").is_muxed());
        assert!(!format("avc1", "NONE").is_muxed());
    }

    #[test]
    fn last_error_line_skips_blank_tail() {
        assert_eq!(
            last_error_line(b"WARNING: x\nERROR: Video unavailable\n\n"),
            "ERROR: Video unavailable"
        );
        assert_eq!(last_error_line(b""), "no error output");
    }

    #[cfg(unix)]
    fn install_ytdlp_stub(dir: &Path) -> Result<PathBuf> {
        let script_path = dir.join("yt-dlp");
        let script = r#"#!/usr/bin/env bash
set -eu
args=("$@")
output=""
while [[ $# -gt 0 ]]; do
  case "$1" in
    --output)
      shift
      output="$1"
      ;;
  esac
  shift
done

last="${args[${#args[@]}-1]}"

if printf '%s\n' "${args[@]}" | grep -q -- '--flat-playlist'; then
  if [[ "$last" == *"@Partial"* ]]; then
    echo '{"title":"Partial","entries":[{"id":"p1","title":"Kept"},null]}'
    echo "ERROR: [youtube] p2: Private video" >&2
    exit 1
  fi
  if [[ "$last" == *"@Gone"* ]]; then
    echo "ERROR: [youtube:tab] @Gone: This channel does not exist" >&2
    exit 1
  fi
  if printf '%s\n' "${args[@]}" | grep -q -- '--playlist-end'; then
    echo '{"title":"Stub","entries":[{"id":"v1","url":"https://www.youtube.com/watch?v=v1","title":"One"}]}'
  else
    echo '{"title":"Stub","entries":[{"id":"v1","url":"https://www.youtube.com/watch?v=v1","title":"One"},{"id":"v2","title":"Two"}]}'
  fi
  exit 0
fi

if printf '%s\n' "${args[@]}" | grep -q -- '--dump-single-json'; then
  echo '{"id":"v1","formats":[{"format_id":"18","ext":"mp4","height":360,"vcodec":"avc1","acodec":"mp4a"},{"format_id":"140","ext":"m4a","vcodec":"none","acodec":"mp4a"}]}'
  exit 0
fi

if [[ "$last" == *"broken"* ]]; then
  echo "ERROR: [youtube] broken: Video unavailable" >&2
  exit 1
fi

if [[ -n "$output" ]]; then
  target="${output//%(title)s/Stub Title}"
  target="${target//%(ext)s/mp4}"
  mkdir -p "$(dirname "$target")"
  echo "video" > "$target"
fi
exit 0
"#;
        fs::write(&script_path, script)?;
        let mut perms = fs::metadata(&script_path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms)?;
        Ok(script_path)
    }

    #[cfg(unix)]
    #[test]
    fn stub_listing_respects_playlist_end() -> Result<()> {
        let dir = tempdir()?;
        let backend = YtDlp::new(install_ytdlp_stub(dir.path())?);
        backend.ensure_available()?;

        let all = backend.list_channel("https://www.youtube.com/@Stub", None)?;
        assert_eq!(all.entries.len(), 2);
        assert_eq!(all.entries[1].url, "https://www.youtube.com/watch?v=v2");

        let capped = backend.list_channel("https://www.youtube.com/@Stub", Some(1))?;
        assert_eq!(capped.entries.len(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn listing_with_skipped_entries_is_kept() -> Result<()> {
        let dir = tempdir()?;
        let backend = YtDlp::new(install_ytdlp_stub(dir.path())?);

        let partial = backend.list_channel("https://www.youtube.com/@Partial", None)?;
        assert_eq!(partial.entries.len(), 1);
        assert_eq!(partial.entries[0].url, "https://www.youtube.com/watch?v=p1");

        let err = backend
            .list_channel("https://www.youtube.com/@Gone", None)
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn stub_fetch_writes_templated_file_and_reports_errors() -> Result<()> {
        let dir = tempdir()?;
        let backend = YtDlp::new(install_ytdlp_stub(dir.path())?);
        let template = dir
            .path()
            .join("topic/%(title)s_v1.%(ext)s")
            .to_string_lossy()
            .into_owned();
        let request = FetchRequest {
            url: "https://www.youtube.com/watch?v=v1",
            format_selector: "best",
            output_template: &template,
            merge_output_format: "mp4",
            subtitle_languages: &[],
            write_thumbnail: false,
        };
        backend.fetch(&request)?;
        assert!(dir.path().join("topic/Stub Title_v1.mp4").exists());

        let broken = FetchRequest {
            url: "https://www.youtube.com/watch?v=broken",
            ..request
        };
        let err = backend.fetch(&broken).unwrap_err();
        assert!(err.to_string().contains("Video unavailable"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn stub_formats_are_parsed() -> Result<()> {
        let dir = tempdir()?;
        let backend = YtDlp::new(install_ytdlp_stub(dir.path())?);
        let formats = backend.formats("https://www.youtube.com/watch?v=v1")?;
        assert_eq!(formats.len(), 2);
        assert!(formats[0].is_muxed());
        assert!(!formats[1].is_muxed());
        Ok(())
    }

    #[test]
    fn missing_program_is_reported() {
        let backend = YtDlp::new("/definitely/not/here/yt-dlp");
        let err = backend.ensure_available().unwrap_err();
        assert!(err.to_string().contains("not installed"));
    }
}
