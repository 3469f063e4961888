#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DATA_ROOT: &str = "ZDataVideos";
pub const DEFAULT_SYNC_FORMAT: &str = "360p";
pub const DEFAULT_MAX_CHANNEL_VIDEOS: usize = 500;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_YT_DLP: &str = "yt-dlp";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro";
pub const GEMINI_KEY_FILE: &str = "api_keys/gemini_api_key.txt";

/// Everything a binary needs to know about its environment, resolved once at
/// startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub data_root: PathBuf,
    pub format_preset: String,
    pub max_channel_videos: Option<usize>,
    pub max_attempts: u32,
    pub yt_dlp: PathBuf,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

pub fn load_runtime_settings() -> Result<RuntimeSettings> {
    resolve_runtime_settings(RuntimeOverrides::default())
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub data_root: Option<PathBuf>,
    pub format_preset: Option<String>,
    pub max_channel_videos: Option<usize>,
    pub max_attempts: Option<u32>,
    pub gemini_model: Option<String>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    let mut settings = build_runtime_settings_with_overrides(&file_vars, env_var_string, overrides)?;
    if settings.gemini_api_key.is_none() {
        settings.gemini_api_key = read_key_file(Path::new(GEMINI_KEY_FILE))?;
    }
    Ok(settings)
}

#[cfg(test)]
fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeSettings> {
    build_runtime_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeSettings> {
    let data_root = overrides
        .data_root
        .or_else(|| lookup_value("TOPICTUBE_DATA_ROOT", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_ROOT));
    let format_preset = overrides
        .format_preset
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup_value("TOPICTUBE_FORMAT", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_SYNC_FORMAT.to_string());
    let max_channel_videos = match overrides.max_channel_videos {
        Some(0) => None,
        Some(value) => Some(value),
        None => match lookup_value("TOPICTUBE_MAX_CHANNEL_VIDEOS", file_vars, &env_lookup) {
            Some(raw) => parse_channel_cap(&raw)?,
            None => Some(DEFAULT_MAX_CHANNEL_VIDEOS),
        },
    };
    let max_attempts = overrides
        .max_attempts
        .or_else(|| {
            lookup_value("TOPICTUBE_MAX_ATTEMPTS", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u32>().ok())
        })
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS);
    let yt_dlp = lookup_value("TOPICTUBE_YT_DLP", file_vars, &env_lookup)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP));
    let gemini_api_key = lookup_value("GEMINI_API_KEY", file_vars, &env_lookup);
    let gemini_model = overrides
        .gemini_model
        .or_else(|| lookup_value("GEMINI_MODEL", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

    Ok(RuntimeSettings {
        data_root,
        format_preset,
        max_channel_videos,
        max_attempts,
        yt_dlp,
        gemini_api_key,
        gemini_model,
    })
}

/// `0`, `none` and `all` lift the cap entirely.
fn parse_channel_cap(raw: &str) -> Result<Option<usize>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "0" | "none" | "all" => Ok(None),
        value => value
            .parse::<usize>()
            .map(Some)
            .map_err(|_| anyhow!("TOPICTUBE_MAX_CHANNEL_VIDEOS must be a number, got {raw:?}")),
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

fn read_key_file(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let key = raw.trim();
    Ok((!key.is_empty()).then(|| key.to_string()))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
