#![forbid(unsafe_code)]

//! Expands a channel URL into the URLs of its videos.

use crate::ytdlp::MediaBackend;
use url::Url;

/// Channel tabs that may trail the handle in a channel URL.
const CHANNEL_TABS: &[&str] = &[
    "videos", "shorts", "streams", "featured", "playlists", "live", "community",
];

/// Lists the videos of `channel_url`, capped at `max_videos`.
///
/// Resolution failures (private, deleted, offline) are logged and reported as
/// an empty list so a single bad channel never aborts a run.
pub fn resolve_channel(
    backend: &dyn MediaBackend,
    channel_url: &str,
    max_videos: Option<usize>,
) -> Vec<String> {
    println!("Extracting URLs from channel: {channel_url}");
    let listing = match backend.list_channel(channel_url, max_videos) {
        Ok(listing) => listing,
        Err(err) => {
            tracing::warn!(channel = channel_url, "could not resolve channel: {err:#}");
            println!("  Error extracting channel URLs: {err}");
            return Vec::new();
        }
    };

    if let Some(title) = &listing.title {
        println!("Channel: {title}");
    }
    if listing.entries.is_empty() {
        println!("No videos found in channel");
        return Vec::new();
    }
    println!("Found {} videos", listing.entries.len());

    let limit = max_videos.unwrap_or(usize::MAX);
    let mut urls = Vec::new();
    for (index, entry) in listing.entries.into_iter().take(limit).enumerate() {
        println!(
            "[{}] {}",
            index + 1,
            entry.title.as_deref().unwrap_or("Unknown Title")
        );
        println!("    URL: {}", entry.url);
        urls.push(entry.url);
    }

    println!("Successfully extracted {} video URLs", urls.len());
    urls
}

/// Resolves several channels in order, returning `(channel_url, videos)` pairs.
pub fn resolve_channels(
    backend: &dyn MediaBackend,
    channel_urls: &[String],
    max_videos: Option<usize>,
) -> Vec<(String, Vec<String>)> {
    println!("Starting extraction from {} channels...", channel_urls.len());
    let mut results = Vec::with_capacity(channel_urls.len());
    for (index, channel_url) in channel_urls.iter().enumerate() {
        println!();
        println!(
            "[{}/{}] Processing: {}",
            index + 1,
            channel_urls.len(),
            channel_url
        );
        let urls = resolve_channel(backend, channel_url, max_videos);
        results.push((channel_url.clone(), urls));
    }

    let total_videos: usize = results.iter().map(|(_, urls)| urls.len()).sum();
    let successful = results.iter().filter(|(_, urls)| !urls.is_empty()).count();
    println!();
    println!("==================================================");
    println!("EXTRACTION SUMMARY");
    println!("==================================================");
    println!("Total channels: {}", channel_urls.len());
    println!("Successful extractions: {successful}");
    println!("Total videos found: {total_videos}");

    results
}

/// Folder-safe topic name for a channel URL: the `@handle` segment (or the last
/// path segment that is not a channel tab) without its leading `@`.
pub fn channel_topic_name(channel_url: &str) -> Option<String> {
    let trimmed = channel_url.trim();
    let path = match Url::parse(trimmed).or_else(|_| Url::parse(&format!("https://{trimmed}"))) {
        Ok(url) => url.path().to_string(),
        Err(_) => trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();

    let chosen = segments
        .iter()
        .find(|segment| segment.starts_with('@'))
        .or_else(|| {
            segments
                .iter()
                .rev()
                .find(|segment| !CHANNEL_TABS.contains(&segment.to_ascii_lowercase().as_str()))
        })
        .or_else(|| segments.last())?;

    let name = sanitize_topic_name(chosen.trim_start_matches('@'));
    (!name.is_empty()).then_some(name)
}

/// Replaces characters that cannot appear in a folder name.
pub fn sanitize_topic_name(raw: &str) -> String {
    let decoded = percent_decode(raw);
    let cleaned: String = decoded
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim().trim_matches('.').to_string()
}

fn percent_decode(raw: &str) -> String {
    url::form_urlencoded::parse(format!("x={raw}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ytdlp::{ChannelListing, ChannelVideo, FetchRequest, FormatInfo};
    use anyhow::{Result, bail};

    struct FakeChannel {
        videos: Vec<&'static str>,
    }

    impl MediaBackend for FakeChannel {
        fn list_channel(&self, _url: &str, max: Option<usize>) -> Result<ChannelListing> {
            let entries = self
                .videos
                .iter()
                .take(max.unwrap_or(usize::MAX))
                .map(|url| ChannelVideo {
                    url: url.to_string(),
                    title: None,
                })
                .collect();
            Ok(ChannelListing {
                title: Some("Fake".into()),
                entries,
            })
        }

        fn fetch(&self, _request: &FetchRequest<'_>) -> Result<()> {
            unreachable!()
        }

        fn formats(&self, _url: &str) -> Result<Vec<FormatInfo>> {
            unreachable!()
        }
    }

    struct Offline;

    impl MediaBackend for Offline {
        fn list_channel(&self, url: &str, _max: Option<usize>) -> Result<ChannelListing> {
            bail!("network unreachable for {url}")
        }

        fn fetch(&self, _request: &FetchRequest<'_>) -> Result<()> {
            unreachable!()
        }

        fn formats(&self, _url: &str) -> Result<Vec<FormatInfo>> {
            unreachable!()
        }
    }

    #[test]
    fn resolves_and_caps_videos() {
        let backend = FakeChannel {
            videos: vec![
                "https://e.com/watch?v=1",
                "https://e.com/watch?v=2",
                "https://e.com/watch?v=3",
            ],
        };
        assert_eq!(resolve_channel(&backend, "https://e.com/@Foo", None).len(), 3);
        assert_eq!(
            resolve_channel(&backend, "https://e.com/@Foo", Some(2)),
            vec!["https://e.com/watch?v=1", "https://e.com/watch?v=2"]
        );
    }

    #[test]
    fn resolution_failure_is_empty_not_fatal() {
        assert!(resolve_channel(&Offline, "https://e.com/@Gone", None).is_empty());
        let results = resolve_channels(
            &Offline,
            &["https://e.com/@A".to_string(), "https://e.com/@B".to_string()],
            None,
        );
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, urls)| urls.is_empty()));
    }

    #[test]
    fn topic_name_comes_from_handle() {
        assert_eq!(
            channel_topic_name("https://www.youtube.com/@SomeChannel").as_deref(),
            Some("SomeChannel")
        );
        assert_eq!(
            channel_topic_name("https://www.youtube.com/@BORGAutomotiveReman/videos").as_deref(),
            Some("BORGAutomotiveReman")
        );
        assert_eq!(
            channel_topic_name("https://www.youtube.com/c/example/").as_deref(),
            Some("example")
        );
        assert_eq!(
            channel_topic_name("www.youtube.com/@NoScheme?si=x").as_deref(),
            Some("NoScheme")
        );
    }

    #[test]
    fn topic_name_is_folder_safe() {
        assert_eq!(
            channel_topic_name("https://www.youtube.com/@Caf%C3%A9:Live").as_deref(),
            Some("Café_Live")
        );
        assert_eq!(channel_topic_name("https://www.youtube.com/"), None);
        assert_eq!(sanitize_topic_name(" ..a/b.. "), "a_b");
    }
}
