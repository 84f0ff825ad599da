//! Remote storage abstraction consumed by the pipeline.
//!
//! The pipeline needs exactly three remote operations: a filename search, a
//! per-file media metadata lookup, and a batched thumbnail download. They are
//! expressed by the [`RemoteStorage`] trait; [`dropbox::DropboxClient`] is the
//! production implementation.
//!
//! # Module layout
//!
//! - [`dropbox`] -- Dropbox HTTP API client.

pub mod dropbox;

use async_trait::async_trait;
use bytes::Bytes;
use cf_core::{FileRecord, MediaMetadata};
use chrono::{DateTime, Utc};

pub use dropbox::DropboxClient;

/// Errors returned by a [`RemoteStorage`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The request never produced a response.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with a non-success status.
    #[error("remote returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// No usable credentials, or the token refresh was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),
}

/// One file returned by a filename search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub id: String,
    pub name: String,
    pub path_lower: String,
    pub size: u64,
    pub client_modified: Option<DateTime<Utc>>,
}

impl SearchMatch {
    /// Build a fresh catalog record from listing metadata.
    pub fn into_record(self) -> FileRecord {
        FileRecord::new(
            self.id,
            self.name,
            self.path_lower,
            self.size,
            self.client_modified.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        )
    }
}

/// One entry of a batched thumbnail request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub path: String,
    /// Provider size token, e.g. `w480h320`.
    pub size: String,
}

/// Result for one entry of a batched thumbnail request, aligned by position
/// with the request it answers.
#[derive(Debug, Clone, PartialEq)]
pub enum ThumbnailResult {
    Success(Bytes),
    Failure(String),
}

/// The three remote operations the pipeline consumes.
///
/// Implementations are shared across tasks behind an `Arc`.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Search `path` for files whose name matches `query`, returning at most
    /// `max_results` matches starting at offset `start`.
    async fn search(
        &self,
        path: &str,
        query: &str,
        start: u64,
        max_results: u64,
    ) -> Result<Vec<SearchMatch>, RemoteError>;

    /// Fetch dimensions, location, and capture time for one file.
    async fn get_metadata(&self, path: &str) -> Result<MediaMetadata, RemoteError>;

    /// Fetch previews for `entries` in one call. On success the result has
    /// one entry per request, in request order.
    async fn get_thumbnail_batch(
        &self,
        entries: &[ThumbnailRequest],
    ) -> Result<Vec<ThumbnailResult>, RemoteError>;
}
