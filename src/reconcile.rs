#![forbid(unsafe_code)]

//! Works out which catalog URLs still have to be downloaded into a topic folder.

use crate::identifier::{filename_matches_identifier, identifier_from_filename, identifier_from_url};
use crate::sweep::is_video_file_name;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Result of comparing a topic's URLs against its folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// URLs to download, in catalog order.
    pub missing: Vec<String>,
    /// Subset of `missing` whose video id cannot be derived. These can never be
    /// recognized on disk and are attempted on every run.
    pub unidentified: Vec<String>,
    /// Number of distinct catalog videos already present.
    pub present: usize,
}

#[derive(Hash, PartialEq, Eq)]
enum DedupKey {
    Id(String),
    Raw(String),
}

/// Videos already in `folder`: the file names and the identifiers they carry.
struct DownloadedFiles {
    names: Vec<String>,
    identifiers: HashSet<String>,
}

impl DownloadedFiles {
    fn scan(folder: &Path) -> Result<Self> {
        let mut names = Vec::new();
        if folder.exists() {
            for entry in
                fs::read_dir(folder).with_context(|| format!("reading {}", folder.display()))?
            {
                let entry = entry?;
                // Follows symlinks, as the sweep keeps linked videos too.
                let is_file = fs::metadata(entry.path()).is_ok_and(|meta| meta.is_file());
                if !is_file {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if is_video_file_name(&name) {
                    names.push(name);
                }
            }
        }
        let identifiers = names
            .iter()
            .map(|name| identifier_from_filename(name))
            .collect();
        Ok(Self { names, identifiers })
    }

    fn contains(&self, id: &str) -> bool {
        self.identifiers.contains(id)
            || (id.contains('_')
                && self
                    .names
                    .iter()
                    .any(|name| filename_matches_identifier(name, id)))
    }
}

/// URLs of `desired` whose video is not yet in `folder`.
///
/// URLs sharing a video id collapse to the later one. URLs without an id are
/// always missing.
pub fn compute_missing(folder: &Path, desired: &[String]) -> Result<Vec<String>> {
    Ok(reconcile(folder, desired)?.missing)
}

/// Same as [`compute_missing`], with the bookkeeping callers report on.
pub fn reconcile(folder: &Path, desired: &[String]) -> Result<Reconciliation> {
    let downloaded = DownloadedFiles::scan(folder)?;

    let keyed: Vec<(DedupKey, &String)> = desired
        .iter()
        .map(|url| {
            let key = match identifier_from_url(url) {
                Some(id) => DedupKey::Id(id),
                None => DedupKey::Raw(url.trim().to_string()),
            };
            (key, url)
        })
        .collect();

    let mut last_index = HashMap::new();
    for (index, (key, _)) in keyed.iter().enumerate() {
        last_index.insert(key, index);
    }

    let mut outcome = Reconciliation::default();
    for (index, (key, url)) in keyed.iter().enumerate() {
        if last_index.get(key) != Some(&index) {
            continue;
        }
        match key {
            DedupKey::Id(id) if downloaded.contains(id) => outcome.present += 1,
            DedupKey::Id(_) => outcome.missing.push((*url).clone()),
            DedupKey::Raw(_) => {
                tracing::warn!(url = %url, "no video id in URL; it cannot be matched on disk");
                outcome.unidentified.push((*url).clone());
                outcome.missing.push((*url).clone());
            }
        }
    }
    Ok(outcome)
}
