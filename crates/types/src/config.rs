//! Typed configuration records supplied by the caller.
//!
//! Configuration loading and merging happen outside the core; these types
//! only describe the shape the pipeline consumes.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Selection of a single book to download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookConfig {
    pub book_id: String,
    /// First chapter id to download; everything before it is counted as
    /// already done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_id: Option<String>,
    /// Last chapter id to download (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_id: Option<String>,
    /// Chapter ids to silently drop from the plan.
    #[serde(default)]
    pub ignore_ids: HashSet<String>,
}

impl BookConfig {
    pub fn new(book_id: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            ..Default::default()
        }
    }
}

/// Behavior of the download pipeline for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Base delay in seconds between requests issued by one fetcher worker.
    pub request_interval: f64,
    /// Retry count, applied independently to the fetch and parse stages.
    pub retry_times: u32,
    /// Base for the `backoff_factor * 2^retry` retry delay.
    pub backoff_factor: f64,
    pub raw_data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub download_workers: usize,
    pub parser_workers: usize,
    pub skip_existing: bool,
    pub login_required: bool,
    /// Dump raw fetched pages under `cache/<site>/<book>/html/`.
    pub save_html: bool,
    /// Chapter store commit granularity; 1 commits on every save.
    pub storage_batch_size: usize,
    pub username: String,
    pub password: String,
    /// Cookie header string or empty; seeds the session before login.
    pub cookies: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            request_interval: 2.0,
            retry_times: 3,
            backoff_factor: 2.0,
            raw_data_dir: PathBuf::from("./raw_data"),
            cache_dir: PathBuf::from("./novel_cache"),
            download_workers: 4,
            parser_workers: 4,
            skip_existing: true,
            login_required: false,
            save_html: false,
            storage_batch_size: 1,
            username: String::new(),
            password: String::new(),
            cookies: String::new(),
        }
    }
}

/// Network settings for a per-site session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub request_interval: f64,
    pub retry_times: u32,
    pub backoff_factor: f64,
    /// Per-request timeout in seconds.
    pub timeout: f64,
    /// Cap on concurrent connections per host.
    pub max_connections: usize,
    /// Token-bucket request rate; `None` disables rate limiting.
    pub max_rps: Option<f64>,
    pub user_agent: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub verify_ssl: bool,
    /// Directory holding persisted session state, one subdirectory per site.
    pub state_dir: PathBuf,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_interval: 2.0,
            retry_times: 3,
            backoff_factor: 2.0,
            timeout: 30.0,
            max_connections: 10,
            max_rps: None,
            user_agent: None,
            headers: None,
            verify_ssl: true,
            state_dir: PathBuf::from("./state"),
        }
    }
}
