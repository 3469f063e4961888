#![forbid(unsafe_code)]

//! Keeps folders of downloaded videos in line with a YAML catalog of topics.

pub mod catalog;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod failures;
pub mod formats;
pub mod gemini;
pub mod identifier;
pub mod layout;
pub mod logging;
pub mod reconcile;
pub mod sweep;
pub mod sync;
pub mod urls;
pub mod ytdlp;
