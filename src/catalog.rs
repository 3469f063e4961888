#![forbid(unsafe_code)]

//! The topic catalog: which videos should exist in which topic folder.
//!
//! The catalog is persisted as a YAML mapping of topic name to a list of video
//! URLs. The reserved `channel` key lists channel URLs that are expanded into
//! one topic per channel every time the catalog is loaded; the expansion is
//! never written back.

use crate::channel::{channel_topic_name, resolve_channel};
use crate::identifier::identifier_from_url;
use crate::layout::validate_topic_name;
use crate::ytdlp::MediaBackend;
use anyhow::{Context, Result, anyhow, bail};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

/// Reserved key whose entries are channel URLs rather than video URLs.
pub const CHANNEL_KEY: &str = "channel";

const SEED_CATALOG: &str = "test:
- https://www.youtube.com/watch?v=09839DpTctU
- https://www.youtube.com/watch?v=d27gTrPPAyk
- https://www.youtube.com/watch?v=ozv8ugNm0P0
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub urls: Vec<String>,
}

/// Ordered mapping of topic name to video URLs. Duplicate URLs are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicCatalog {
    topics: Vec<Topic>,
}

impl TopicCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn get(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|topic| topic.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces the URLs of `name`, or adds it at the end.
    pub fn insert(&mut self, name: impl Into<String>, urls: Vec<String>) {
        let name = name.into();
        match self.topics.iter_mut().find(|topic| topic.name == name) {
            Some(topic) => topic.urls = urls,
            None => self.topics.push(Topic { name, urls }),
        }
    }

    /// Appends `url` to `name`, creating the topic when needed.
    pub fn append(&mut self, name: &str, url: impl Into<String>) {
        let url = url.into();
        match self.topics.iter_mut().find(|topic| topic.name == name) {
            Some(topic) => topic.urls.push(url),
            None => self.topics.push(Topic {
                name: name.to_string(),
                urls: vec![url],
            }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let index = self.topics.iter().position(|topic| topic.name == name)?;
        Some(self.topics.remove(index).urls)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(raw).context("parsing catalog YAML")?;
        let mapping = match value {
            Value::Null => return Ok(Self::new()),
            Value::Mapping(mapping) => mapping,
            other => bail!("catalog must be a mapping of topic to URLs, found {}", kind(&other)),
        };

        let mut catalog = Self::new();
        for (key, value) in mapping {
            let name = scalar_to_string(&key)
                .ok_or_else(|| anyhow!("catalog keys must be plain names, found {}", kind(&key)))?;
            let urls = match value {
                Value::Null => Vec::new(),
                Value::String(url) => vec![url],
                Value::Sequence(items) => items
                    .into_iter()
                    .filter(|item| !item.is_null())
                    .map(|item| {
                        scalar_to_string(&item).ok_or_else(|| {
                            anyhow!("topic {name:?} contains a non-URL entry ({})", kind(&item))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                other => bail!("topic {name:?} must be a list of URLs, found {}", kind(&other)),
            };
            catalog.insert(name, urls);
        }
        Ok(catalog)
    }

    pub fn to_yaml(&self) -> Result<String> {
        let mut mapping = Mapping::new();
        for topic in &self.topics {
            let urls = topic.urls.iter().cloned().map(Value::String).collect();
            mapping.insert(Value::String(topic.name.clone()), Value::Sequence(urls));
        }
        serde_yaml::to_string(&mapping).context("serializing catalog")
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Reads the catalog as stored, without expanding channels. A missing or empty
/// file is an empty catalog; a malformed one is an error.
pub fn read_catalog(path: &Path) -> Result<TopicCatalog> {
    if !path.exists() {
        return Ok(TopicCatalog::new());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    TopicCatalog::from_yaml(&raw).with_context(|| format!("loading {}", path.display()))
}

/// Persists `catalog` through a temp file so a crash never leaves a truncated
/// catalog behind.
pub fn write_catalog(path: &Path, catalog: &TopicCatalog) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, catalog.to_yaml()?)
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Creates the catalog with a small `test` topic when it does not exist yet.
/// Returns whether a file was written.
pub fn prepare_catalog(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, SEED_CATALOG).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "created default catalog");
    Ok(true)
}

/// Loads the catalog for a sync run and expands its `channel` entries.
///
/// A catalog that cannot be read is logged and treated as empty.
pub fn load_catalog(
    path: &Path,
    backend: &dyn MediaBackend,
    max_videos: Option<usize>,
) -> TopicCatalog {
    let catalog = match read_catalog(path) {
        Ok(catalog) => catalog,
        Err(err) => {
            tracing::warn!("ignoring unreadable catalog: {err:#}");
            return TopicCatalog::new();
        }
    };
    expand_channels(catalog, backend, max_videos)
}

/// Replaces the `channel` entry with one topic per channel. A derived name that
/// is already taken gets a numeric suffix instead of overwriting.
pub fn expand_channels(
    mut catalog: TopicCatalog,
    backend: &dyn MediaBackend,
    max_videos: Option<usize>,
) -> TopicCatalog {
    let Some(channels) = catalog.remove(CHANNEL_KEY) else {
        return catalog;
    };

    for channel_url in channels {
        let Some(base_name) = channel_topic_name(&channel_url) else {
            tracing::warn!(channel = %channel_url, "cannot derive a topic name, skipping channel");
            continue;
        };
        let name = unique_topic_name(&catalog, &base_name);
        if name != base_name {
            tracing::warn!(
                channel = %channel_url,
                "topic {base_name:?} already exists, using {name:?}"
            );
        }
        let urls = resolve_channel(backend, &channel_url, max_videos);
        catalog.insert(name, urls);
    }
    catalog
}

fn unique_topic_name(catalog: &TopicCatalog, base: &str) -> String {
    let usable = |name: &str| !catalog.contains(name) && validate_topic_name(name).is_ok();
    if usable(base) {
        return base.to_string();
    }
    (2..)
        .map(|suffix| format!("{base}_{suffix}"))
        .find(|candidate| usable(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Appends `url` to `topic` in the stored catalog and writes it back.
///
/// Not safe against concurrent invocations; the tools are single-user.
pub fn append_url(path: &Path, topic: &str, url: &str) -> Result<()> {
    if topic != CHANNEL_KEY {
        validate_topic_name(topic)?;
    }
    let url = url.trim();
    if url.is_empty() {
        bail!("cannot add an empty URL to topic {topic:?}");
    }
    if topic != CHANNEL_KEY && identifier_from_url(url).is_none() {
        tracing::warn!(url, "URL has no video id; it will be downloaded on every run");
    }

    let mut catalog = read_catalog(path)?;
    if !catalog.contains(topic) {
        tracing::info!(topic, "creating new topic");
    }
    catalog.append(topic, url);
    write_catalog(path, &catalog)
}

/// Splits the `topic|url` argument of `--add-topic-url`.
pub fn parse_topic_url(raw: &str) -> Result<(String, String)> {
    let Some((topic, url)) = raw.split_once('|') else {
        bail!("expected \"topic|url\", got {raw:?}");
    };
    let (topic, url) = (topic.trim(), url.trim());
    if topic.is_empty() || url.is_empty() {
        bail!("expected \"topic|url\", got {raw:?}");
    }
    Ok((topic.to_string(), url.to_string()))
}
