//! Batched preview fetching.
//!
//! One fetch selects up to [`THUMBNAIL_BATCH_SIZE`] records that have neither
//! a preview nor a permanent failure, asks the remote for all of them in a
//! single call, and correlates the answers back to records by position.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::SharedCatalog;
use crate::remote::{RemoteStorage, ThumbnailRequest, ThumbnailResult};

/// Maximum number of previews requested in one batch.
pub const THUMBNAIL_BATCH_SIZE: usize = 25;

/// Outcome of one batch fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub requested: usize,
    pub loaded: usize,
    pub failed: usize,
    /// The call failed or its response could not be correlated; no record
    /// was touched.
    pub batch_failed: bool,
}

/// Fetches previews for records that still need one.
pub struct ThumbnailFetcher {
    remote: Arc<dyn RemoteStorage>,
    catalog: SharedCatalog,
    size: String,
}

impl ThumbnailFetcher {
    /// `size` is the provider's size token, e.g. `w480h320`.
    pub fn new(remote: Arc<dyn RemoteStorage>, catalog: SharedCatalog, size: impl Into<String>) -> Self {
        Self {
            remote,
            catalog,
            size: size.into(),
        }
    }

    pub async fn fetch(&self) -> FetchReport {
        let selected = self.catalog.lock().select_for_thumbnails(THUMBNAIL_BATCH_SIZE);
        if selected.is_empty() {
            debug!("No records need a thumbnail");
            return FetchReport::default();
        }

        let requests: Vec<ThumbnailRequest> = selected
            .iter()
            .map(|(_, path)| ThumbnailRequest {
                path: path.clone(),
                size: self.size.clone(),
            })
            .collect();

        let mut report = FetchReport {
            requested: requests.len(),
            ..FetchReport::default()
        };

        let results = match self.remote.get_thumbnail_batch(&requests).await {
            Ok(results) if results.len() == requests.len() => results,
            Ok(results) => {
                warn!(
                    requested = requests.len(),
                    returned = results.len(),
                    "Thumbnail batch response length mismatch; ignoring batch"
                );
                report.batch_failed = true;
                return report;
            }
            Err(e) => {
                warn!(requested = requests.len(), error = %e, "Thumbnail batch failed");
                report.batch_failed = true;
                return report;
            }
        };

        {
            let mut catalog = self.catalog.lock();
            for ((id, _), result) in selected.iter().zip(results) {
                match result {
                    ThumbnailResult::Success(bytes) => {
                        catalog.update(id, |record| record.mark_loaded(bytes));
                        report.loaded += 1;
                    }
                    ThumbnailResult::Failure(reason) => {
                        debug!(id = %id, reason = %reason, "Thumbnail failed permanently");
                        catalog.update(id, |record| record.mark_failed());
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            requested = report.requested,
            loaded = report.loaded,
            failed = report.failed,
            "Fetched thumbnail batch"
        );
        report
    }
}
