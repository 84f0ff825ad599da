//! Shared test harness for integration tests.
//!
//! Provides [`FakeRemote`], a scripted in-memory [`RemoteStorage`], and
//! helpers for building listing matches and session options.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cf_core::MediaMetadata;
use chrono::{TimeZone, Utc};
use cloudframe::remote::{RemoteError, RemoteStorage, SearchMatch, ThumbnailRequest, ThumbnailResult};
use cloudframe::session::SessionOptions;
use parking_lot::Mutex;
use tokio::sync::watch;

pub const EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];

/// A listing match for `id` taken at `secs` since the epoch.
pub fn photo(id: &str, secs: i64) -> SearchMatch {
    SearchMatch {
        id: format!("id:{id}"),
        name: format!("{id}.jpg"),
        path_lower: format!("/photos/{id}.jpg"),
        size: 1024,
        client_modified: Utc.timestamp_opt(secs, 0).single(),
    }
}

/// `count` distinct matches with ids `{prefix}0..{prefix}{count}`.
pub fn photos(prefix: &str, count: usize) -> Vec<SearchMatch> {
    (0..count)
        .map(|i| photo(&format!("{prefix}{i}"), 1_600_000_000 + i as i64))
        .collect()
}

pub fn extensions() -> Vec<String> {
    EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

pub fn options(cache_dir: &Path) -> SessionOptions {
    SessionOptions {
        extensions: extensions(),
        thumbnail_size: "w480h320".into(),
        cache_dir: cache_dir.to_path_buf(),
    }
}

/// Scripted remote. Unscripted extensions return no matches; unscripted
/// metadata paths fail.
pub struct FakeRemote {
    searches: Mutex<HashMap<String, Result<Vec<SearchMatch>, u16>>>,
    search_delay: Mutex<Option<Duration>>,
    metadata: Mutex<HashMap<String, MediaMetadata>>,
    metadata_gate: watch::Sender<bool>,
    failing_thumbnails: Mutex<HashSet<String>>,
    batch_fails: AtomicBool,
    truncate_batch: AtomicBool,
    batch_sizes: Mutex<Vec<usize>>,
    search_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
}

impl Default for FakeRemote {
    fn default() -> Self {
        let (metadata_gate, _) = watch::channel(true);
        Self {
            searches: Mutex::default(),
            search_delay: Mutex::default(),
            metadata: Mutex::default(),
            metadata_gate,
            failing_thumbnails: Mutex::default(),
            batch_fails: AtomicBool::new(false),
            truncate_batch: AtomicBool::new(false),
            batch_sizes: Mutex::default(),
            search_calls: AtomicUsize::new(0),
            metadata_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matches(self, ext: &str, matches: Vec<SearchMatch>) -> Self {
        self.set_matches(ext, matches);
        self
    }

    pub fn set_matches(&self, ext: &str, matches: Vec<SearchMatch>) {
        self.searches.lock().insert(ext.to_string(), Ok(matches));
    }

    pub fn fail_search(&self, ext: &str, status: u16) {
        self.searches.lock().insert(ext.to_string(), Err(status));
    }

    pub fn delay_searches(&self, delay: Duration) {
        *self.search_delay.lock() = Some(delay);
    }

    pub fn set_metadata(&self, path: &str, metadata: MediaMetadata) {
        self.metadata.lock().insert(path.to_string(), metadata);
    }

    /// Hold every metadata lookup until [`FakeRemote::open_metadata`].
    pub fn hold_metadata(&self) {
        self.metadata_gate.send_replace(false);
    }

    pub fn open_metadata(&self) {
        self.metadata_gate.send_replace(true);
    }

    pub fn fail_thumbnail(&self, path: &str) {
        self.failing_thumbnails.lock().insert(path.to_string());
    }

    pub fn fail_batches(&self, fail: bool) {
        self.batch_fails.store(fail, Ordering::SeqCst);
    }

    /// Answer batches with one entry too few.
    pub fn truncate_batches(&self, truncate: bool) {
        self.truncate_batch.store(truncate, Ordering::SeqCst);
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStorage for FakeRemote {
    async fn search(
        &self,
        _path: &str,
        query: &str,
        start: u64,
        max_results: u64,
    ) -> Result<Vec<SearchMatch>, RemoteError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(start, 0);

        let delay = *self.search_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.searches.lock().get(query).cloned();
        match scripted {
            Some(Ok(matches)) => Ok(matches.into_iter().take(max_results as usize).collect()),
            Some(Err(status)) => Err(RemoteError::Status {
                status,
                body: "scripted failure".into(),
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn get_metadata(&self, path: &str) -> Result<MediaMetadata, RemoteError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.metadata_gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(RemoteError::Decode("gate dropped".into()));
        }

        let found = self.metadata.lock().get(path).cloned();
        found.ok_or_else(|| RemoteError::Status {
            status: 409,
            body: "path/not_found".into(),
        })
    }

    async fn get_thumbnail_batch(
        &self,
        entries: &[ThumbnailRequest],
    ) -> Result<Vec<ThumbnailResult>, RemoteError> {
        self.batch_sizes.lock().push(entries.len());

        if self.batch_fails.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 500,
                body: "scripted batch failure".into(),
            });
        }

        let failing = self.failing_thumbnails.lock().clone();
        let mut results: Vec<ThumbnailResult> = entries
            .iter()
            .map(|e| {
                assert_eq!(e.size, "w480h320");
                if failing.contains(&e.path) {
                    ThumbnailResult::Failure("unsupported_content".into())
                } else {
                    ThumbnailResult::Success(Bytes::from(format!("jpeg:{}", e.path)))
                }
            })
            .collect();

        if self.truncate_batch.load(Ordering::SeqCst) {
            results.pop();
        }
        Ok(results)
    }
}
