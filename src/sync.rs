#![forbid(unsafe_code)]

//! The reconciliation pass: for every topic, clean the folder, work out what is
//! missing, download it and clean up again.

use crate::catalog::{Topic, TopicCatalog};
use crate::dispatch::{DownloadOptions, DownloadStatus, download_all};
use crate::failures::FailureLedger;
use crate::identifier::identifier_from_url;
use crate::layout::DataLayout;
use crate::reconcile::{compute_missing, reconcile};
use crate::sweep::sweep;
use crate::ytdlp::MediaBackend;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;

/// Failure reason for a fetch whose output was not a video file.
const NOT_A_VIDEO: &str = "download produced no video file";

/// What happened to one topic during a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicReport {
    pub topic: String,
    /// Distinct catalog videos already on disk before downloading.
    pub present: usize,
    pub downloaded: Vec<String>,
    /// `(url, reason)` for every failed download.
    pub failed: Vec<(String, String)>,
    /// Missing URLs skipped because they ran out of attempts.
    pub exhausted: Vec<String>,
    /// Missing URLs without a video id.
    pub unidentified: Vec<String>,
    /// Files deleted by both sweeps.
    pub swept: usize,
    /// Set when the pass for this topic was aborted.
    pub error: Option<String>,
}

impl TopicReport {
    fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            ..Self::default()
        }
    }
}

/// Outcome of a whole sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub topics: Vec<TopicReport>,
}

impl SyncReport {
    pub fn downloaded(&self) -> usize {
        self.topics.iter().map(|topic| topic.downloaded.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.topics.iter().map(|topic| topic.failed.len()).sum()
    }

    pub fn exhausted(&self) -> usize {
        self.topics.iter().map(|topic| topic.exhausted.len()).sum()
    }

    /// Topics whose pass was aborted by a filesystem or validation error.
    pub fn topic_errors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.topics
            .iter()
            .filter_map(|topic| Some((topic.topic.as_str(), topic.error.as_deref()?)))
    }

    pub fn print_summary(&self) {
        println!();
        println!("==================================================");
        println!("SYNC SUMMARY");
        println!("==================================================");
        println!("Topics: {}", self.topics.len());
        println!("Downloaded: {}", self.downloaded());
        println!("Failed: {}", self.failed());
        println!("Skipped after repeated failures: {}", self.exhausted());
        for topic in &self.topics {
            for url in &topic.exhausted {
                println!("  - [{}] {url}", topic.topic);
            }
        }
        let errors: Vec<_> = self.topic_errors().collect();
        if !errors.is_empty() {
            println!();
            println!("Topics with errors:");
            for (topic, error) in errors {
                println!("  - {topic}: {error}");
            }
        }
    }
}

/// Settings shared by every topic of a run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub download: DownloadOptions,
    pub max_attempts: u32,
}

/// Runs the pass over every topic of `catalog`, persisting the failure ledger
/// after each topic. An error in one topic never stops the others.
///
/// A ledger file that cannot be parsed is left untouched and the run keeps its
/// counts in memory only.
pub fn sync_catalog(
    layout: &DataLayout,
    catalog: &TopicCatalog,
    backend: &dyn MediaBackend,
    options: &SyncOptions,
) -> SyncReport {
    let (mut ledger, persist) = match FailureLedger::load(&layout.failures) {
        Ok(ledger) => (ledger, true),
        Err(err) => {
            tracing::warn!(
                "failure ledger unreadable, not saving attempts this run: {err:#}"
            );
            (FailureLedger::default(), false)
        }
    };

    let mut report = SyncReport::default();
    for topic in catalog.topics() {
        let topic_report = match sync_topic(layout, topic, backend, options, &mut ledger) {
            Ok(topic_report) => topic_report,
            Err(err) => {
                tracing::error!(topic = %topic.name, "topic pass aborted: {err:#}");
                TopicReport {
                    error: Some(format!("{err:#}")),
                    ..TopicReport::new(&topic.name)
                }
            }
        };
        report.topics.push(topic_report);

        if !persist {
            continue;
        }
        if let Err(err) = ledger.save(&layout.failures) {
            tracing::warn!("could not save failure ledger: {err:#}");
        }
    }
    report
}

/// One topic: create its folder, sweep, reconcile, download, sweep again.
pub fn sync_topic(
    layout: &DataLayout,
    topic: &Topic,
    backend: &dyn MediaBackend,
    options: &SyncOptions,
    ledger: &mut FailureLedger,
) -> Result<TopicReport> {
    let folder = layout.topic_dir(&topic.name)?;
    println!();
    println!("topic_folder: {}", folder.display());
    fs::create_dir_all(&folder).with_context(|| format!("creating {}", folder.display()))?;

    let mut report = TopicReport::new(&topic.name);
    report.swept += sweep(&folder)?;

    let state = reconcile(&folder, &topic.urls)?;
    report.present = state.present;
    report.unidentified = state.unidentified;

    let (to_fetch, exhausted): (Vec<String>, Vec<String>) = state
        .missing
        .into_iter()
        .partition(|url| ledger.should_attempt(url, options.max_attempts));
    for url in &exhausted {
        tracing::warn!(topic = %topic.name, url = %url, "skipping URL after {} failed attempts", options.max_attempts);
    }
    report.exhausted = exhausted;

    let mut fetched = Vec::new();
    if to_fetch.is_empty() {
        println!("Nothing to download, {} videos present", report.present);
    } else {
        let batch = download_all(backend, &to_fetch, &folder, &options.download);
        for outcome in batch.outcomes {
            match outcome.status {
                DownloadStatus::Downloaded => fetched.push(outcome.url),
                DownloadStatus::Failed(reason) => {
                    ledger.record_failure(&outcome.url, &reason);
                    report.failed.push((outcome.url, reason));
                }
            }
        }
    }

    report.swept += sweep(&folder)?;

    // A fetch only counts once its video survived the sweep.
    let vanished: HashSet<String> = compute_missing(&folder, &fetched)?
        .into_iter()
        .filter(|url| identifier_from_url(url).is_some())
        .collect();
    for url in fetched {
        if vanished.contains(&url) {
            tracing::warn!(topic = %topic.name, url = %url, "{NOT_A_VIDEO}; the file was swept");
            ledger.record_failure(&url, NOT_A_VIDEO);
            report.failed.push((url, NOT_A_VIDEO.to_string()));
        } else {
            ledger.clear(&url);
            report.downloaded.push(url);
        }
    }
    Ok(report)
}
