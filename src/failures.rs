#![forbid(unsafe_code)]

//! Persistent record of downloads that keep failing.
//!
//! A URL that cannot be fetched is re-selected by every sync run because its
//! video never appears on disk. The ledger counts the attempts so a permanently
//! broken URL is skipped once it reaches the configured limit.

use crate::layout::write_json_atomic;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub attempts: u32,
    pub last_error: String,
    pub last_attempt: DateTime<Utc>,
}

/// URL to failure record, serialized as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureLedger {
    entries: BTreeMap<String, FailureRecord>,
}

impl FailureLedger {
    /// Reads the ledger, treating a missing or blank file as empty.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn get(&self, url: &str) -> Option<&FailureRecord> {
        self.entries.get(url)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `url` still has attempts left under `max_attempts`.
    pub fn should_attempt(&self, url: &str, max_attempts: u32) -> bool {
        self.entries
            .get(url)
            .is_none_or(|record| record.attempts < max_attempts)
    }

    pub fn record_failure(&mut self, url: &str, reason: &str) {
        self.record_failure_at(url, reason, Utc::now());
    }

    fn record_failure_at(&mut self, url: &str, reason: &str, when: DateTime<Utc>) {
        let record = self
            .entries
            .entry(url.to_string())
            .or_insert_with(|| FailureRecord {
                attempts: 0,
                last_error: String::new(),
                last_attempt: when,
            });
        record.attempts = record.attempts.saturating_add(1);
        record.last_error = reason.to_string();
        record.last_attempt = when;
    }

    /// Forgets `url`, returning whether it had been recorded.
    pub fn clear(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }
}
