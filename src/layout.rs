#![forbid(unsafe_code)]

//! On-disk layout of the data root shared by every binary.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIGS_SUBDIR: &str = "configs";
const SUMMARIES_SUBDIR: &str = "summaries";
const CATALOG_FILE: &str = "main.yaml";
const FORMATS_FILE: &str = "formats.toml";
const FAILURES_FILE: &str = "failures.json";

/// Convenience wrapper around every filesystem location the tools touch.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub root: PathBuf,
    pub configs: PathBuf,
    pub catalog: PathBuf,
    pub formats: PathBuf,
    pub failures: PathBuf,
    pub summaries: PathBuf,
}

impl DataLayout {
    pub fn new(root: &Path) -> Self {
        let root = root.to_path_buf();
        let configs = root.join(CONFIGS_SUBDIR);
        let catalog = configs.join(CATALOG_FILE);
        let formats = configs.join(FORMATS_FILE);
        let failures = configs.join(FAILURES_FILE);
        let summaries = root.join(SUMMARIES_SUBDIR);

        Self {
            root,
            configs,
            catalog,
            formats,
            failures,
            summaries,
        }
    }

    /// Creates the root and `configs/` directories.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.configs)
            .with_context(|| format!("creating {}", self.configs.display()))?;
        Ok(())
    }

    /// Folder holding the downloaded videos of `topic`.
    pub fn topic_dir(&self, topic: &str) -> Result<PathBuf> {
        validate_topic_name(topic)?;
        Ok(self.root.join(topic))
    }

    pub fn summary_dir(&self, topic: &str) -> Result<PathBuf> {
        validate_topic_name(topic)?;
        Ok(self.summaries.join(topic))
    }
}

/// Topic names double as folder names, so they must be a single path segment.
pub fn validate_topic_name(topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        bail!("topic name must not be empty");
    }
    if topic == "." || topic == ".." {
        bail!("topic name {topic:?} is not a valid folder name");
    }
    if topic.contains(['/', '\\', '\0']) {
        bail!("topic name {topic:?} must not contain path separators");
    }
    if topic == CONFIGS_SUBDIR || topic == SUMMARIES_SUBDIR {
        bail!("topic name {topic:?} is reserved");
    }
    Ok(())
}

/// Pretty-prints `value` to `path` through a sibling `.tmp` file and a rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    let payload = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp_path, payload).with_context(|| format!("writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
