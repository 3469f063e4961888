#![forbid(unsafe_code)]

//! Named format presets translated into yt-dlp `--format` expressions.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const FALLBACK_PRESET: &str = "best";

const BUILTIN_PRESETS: &[(&str, &str)] = &[
    ("best", "bestvideo+bestaudio/best"),
    ("worst", "worstvideo+worstaudio/worst"),
    ("mp4", "best[ext=mp4]/best"),
    ("webm", "best[ext=webm]/best"),
    ("360p", "best[height<=360]/best"),
    ("720p", "best[height<=720]/best"),
    ("1080p", "best[height<=1080]/best"),
    ("audio_only", "bestaudio[ext=m4a]/bestaudio"),
    ("audio_mp3", "bestaudio[ext=mp3]/bestaudio"),
];

/// Preset table: built-in entries, optionally extended or overridden from
/// `configs/formats.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPresets {
    presets: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct PresetFile {
    #[serde(default)]
    presets: BTreeMap<String, String>,
}

impl Default for FormatPresets {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FormatPresets {
    pub fn builtin() -> Self {
        Self {
            presets: BUILTIN_PRESETS
                .iter()
                .map(|(name, selector)| (name.to_string(), selector.to_string()))
                .collect(),
        }
    }

    /// Built-in table merged with the `[presets]` table of `path`, if present.
    pub fn load(path: &Path) -> Result<Self> {
        let mut table = Self::builtin();
        if !path.exists() {
            return Ok(table);
        }
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let file: PresetFile =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        for (name, selector) in file.presets {
            let selector = selector.trim();
            if selector.is_empty() {
                bail!("preset {name:?} in {} has an empty selector", path.display());
            }
            table.presets.insert(name, selector.to_string());
        }
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.presets.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    /// Presets whose selector can yield a video container.
    pub fn video_names(&self) -> impl Iterator<Item = &str> {
        self.presets
            .iter()
            .filter(|(_, selector)| !is_audio_only(selector))
            .map(|(name, _)| name.as_str())
    }

    /// An explicit selector wins; otherwise the named preset, falling back to
    /// `best` when the name is unknown.
    pub fn resolve(&self, explicit: Option<&str>, preset: &str) -> String {
        if let Some(selector) = explicit.map(str::trim).filter(|value| !value.is_empty()) {
            return selector.to_string();
        }
        match self.get(preset) {
            Some(selector) => selector.to_string(),
            None => {
                tracing::warn!(preset, "unknown format preset, using {FALLBACK_PRESET}");
                self.get(FALLBACK_PRESET)
                    .unwrap_or("bestvideo+bestaudio/best")
                    .to_string()
            }
        }
    }

    /// Like [`resolve`](Self::resolve), but refuses selectors that only fetch
    /// an audio stream. Topic folders keep video files alone, so an audio
    /// download would be swept right after it lands.
    pub fn resolve_video(&self, explicit: Option<&str>, preset: &str) -> Result<String> {
        let selector = self.resolve(explicit, preset);
        if is_audio_only(&selector) {
            let usable: Vec<_> = self.video_names().collect();
            bail!(
                "format {selector:?} downloads audio only; choose one of {}",
                usable.join(", ")
            );
        }
        Ok(selector)
    }
}

/// True when every `/`-separated alternative of `selector` picks an audio
/// stream (`bestaudio`, `worstaudio` or their `ba`/`wa` shorthands).
pub fn is_audio_only(selector: &str) -> bool {
    selector.split('/').all(|alternative| {
        let head = alternative.split('[').next().unwrap_or_default().trim();
        matches!(head, "bestaudio" | "worstaudio" | "ba" | "wa")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_table_has_all_presets() {
        let presets = FormatPresets::builtin();
        let names: Vec<_> = presets.names().collect();
        for expected in [
            "best", "worst", "mp4", "webm", "360p", "720p", "1080p", "audio_only", "audio_mp3",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        assert_eq!(presets.get("360p"), Some("best[height<=360]/best"));
    }

    #[test]
    fn explicit_selector_takes_precedence() {
        let presets = FormatPresets::builtin();
        assert_eq!(presets.resolve(Some("22"), "720p"), "22");
        assert_eq!(presets.resolve(Some("  "), "720p"), "best[height<=720]/best");
    }

    #[test]
    fn unknown_preset_falls_back_to_best() {
        let presets = FormatPresets::builtin();
        assert_eq!(presets.resolve(None, "8k"), "bestvideo+bestaudio/best");
    }

    #[test]
    fn audio_selectors_are_recognized() {
        assert!(is_audio_only("bestaudio[ext=m4a]/bestaudio"));
        assert!(is_audio_only("ba/wa"));
        assert!(!is_audio_only("bestaudio/best"));
        assert!(!is_audio_only("bestvideo+bestaudio/best"));
        assert!(!is_audio_only("18"));
    }

    #[test]
    fn video_resolution_refuses_audio_presets() {
        let presets = FormatPresets::builtin();
        assert_eq!(presets.resolve_video(None, "720p").unwrap(), "best[height<=720]/best");
        let err = presets.resolve_video(None, "audio_only").unwrap_err().to_string();
        assert!(err.contains("audio only"));
        assert!(err.contains("360p"));
        assert!(!err.contains("audio_mp3"));
        assert!(presets.resolve_video(Some("bestaudio"), "best").is_err());
    }

    #[test]
    fn file_overrides_and_extends_builtins() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("formats.toml");
        fs::write(
            &path,
            "[presets]\n\"360p\" = \"18\"\n\"480p\" = \"best[height<=480]/best\"\n",
        )?;
        let presets = FormatPresets::load(&path)?;
        assert_eq!(presets.get("360p"), Some("18"));
        assert_eq!(presets.get("480p"), Some("best[height<=480]/best"));
        assert_eq!(presets.get("best"), Some("bestvideo+bestaudio/best"));
        Ok(())
    }

    #[test]
    fn missing_file_yields_builtins() -> Result<()> {
        let dir = tempdir()?;
        let presets = FormatPresets::load(&dir.path().join("absent.toml"))?;
        assert_eq!(presets, FormatPresets::builtin());
        Ok(())
    }

    #[test]
    fn empty_selector_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("formats.toml");
        fs::write(&path, "[presets]\nbroken = \"\"\n")?;
        assert!(FormatPresets::load(&path).is_err());
        Ok(())
    }
}
