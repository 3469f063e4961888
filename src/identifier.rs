#![forbid(unsafe_code)]

//! Derives the short video identifier that ties a catalog URL to the file it
//! was saved as.

use std::path::Path;
use url::Url;

/// Query parameter carrying the platform's video id.
pub const VIDEO_ID_PARAM: &str = "v";

/// Returns the `v` query parameter of `url`.
///
/// Never fails: anything that cannot be parsed, or lacks the parameter, yields
/// `None`, which never matches a downloaded file.
pub fn identifier_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = Url::parse(trimmed)
        .or_else(|_| Url::parse(&format!("https://{trimmed}")))
        .ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == VIDEO_ID_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Returns the token after the last `_` of the file stem, e.g. `AB123` for
/// `MyTitle_AB123.mp4`.
///
/// Names that do not follow the `<title>_<id>.<ext>` convention produce a token
/// that simply never matches a real id.
pub fn identifier_from_filename(name: &str) -> String {
    let file_name = Path::new(name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => file_name.as_str(),
    };
    stem.rsplit('_').next().unwrap_or(stem).to_string()
}

/// True when `name` was written by the downloader for `id`. Unlike
/// [`identifier_from_filename`] this also recognizes ids that contain `_`.
pub fn filename_matches_identifier(name: &str, id: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    let stem = match name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => name,
    };
    stem.strip_suffix(id)
        .is_some_and(|prefix| prefix.ends_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_watch_parameter() {
        assert_eq!(
            identifier_from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn extra_query_parameters_do_not_change_identifier() {
        let base = identifier_from_url("https://example.com/watch?v=AAAA111");
        assert_eq!(
            identifier_from_url("https://example.com/watch?v=AAAA111&t=42s&list=PL1"),
            base
        );
        assert_eq!(
            identifier_from_url("https://example.com/watch?feature=share&v=AAAA111"),
            base
        );
    }

    #[test]
    fn accepts_urls_without_scheme() {
        assert_eq!(
            identifier_from_url("www.youtube.com/watch?v=abc").as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn malformed_or_missing_parameter_is_none() {
        assert_eq!(identifier_from_url(""), None);
        assert_eq!(identifier_from_url("not a url at all"), None);
        assert_eq!(identifier_from_url("https://youtu.be/abc"), None);
        assert_eq!(identifier_from_url("https://example.com/watch?v="), None);
        assert_eq!(identifier_from_url("http://[::1"), None);
    }

    #[test]
    fn filename_identifier_is_last_underscore_token() {
        assert_eq!(identifier_from_filename("MyTitle_AB123.mp4"), "AB123");
        assert_eq!(identifier_from_filename("/data/topic/A_B_C_xyz.webm"), "xyz");
        assert_eq!(identifier_from_filename("title.with.dots_id9.mkv"), "id9");
    }

    #[test]
    fn unconventional_names_yield_garbage_token() {
        assert_eq!(identifier_from_filename("holiday.mp4"), "holiday");
        assert_eq!(identifier_from_filename("noext_tok"), "tok");
    }

    #[test]
    fn suffix_match_handles_underscored_ids() {
        assert!(filename_matches_identifier("Title_ab_cd.mp4", "ab_cd"));
        assert!(filename_matches_identifier("Title_AB123.mp4", "AB123"));
        assert!(!filename_matches_identifier("Title_xAB123.mp4", "AB123"));
        assert!(!filename_matches_identifier("Title_AB123.mp4", ""));
    }
}
