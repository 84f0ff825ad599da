//! Best-effort metadata enrichment for newly discovered files.
//!
//! Each lookup runs as its own spawned task and writes back into the catalog
//! by id. Failures are logged at debug level and otherwise ignored: the
//! record keeps its listing-derived defaults and is never retried.

use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::catalog::SharedCatalog;
use crate::remote::{RemoteError, RemoteStorage};

/// Spawns fire-and-forget metadata lookups.
#[derive(Clone)]
pub struct Enricher {
    remote: Arc<dyn RemoteStorage>,
    catalog: SharedCatalog,
    tracker: TaskTracker,
}

impl Enricher {
    pub fn new(remote: Arc<dyn RemoteStorage>, catalog: SharedCatalog) -> Self {
        Self {
            remote,
            catalog,
            tracker: TaskTracker::new(),
        }
    }

    /// Start a lookup for the record `id` stored at remote `path`. Returns
    /// immediately.
    pub fn enrich(&self, id: String, path: String) {
        let remote = Arc::clone(&self.remote);
        let catalog = Arc::clone(&self.catalog);

        self.tracker.spawn(async move {
            match enrich_one(remote.as_ref(), &catalog, &id, &path).await {
                Ok(true) => debug!(id = %id, "Enriched record"),
                Ok(false) => debug!(id = %id, "Enriched record no longer in catalog"),
                Err(e) => debug!(id = %id, path = %path, error = %e, "Enrichment failed; keeping listing metadata"),
            }
        });
    }

    /// Number of lookups still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every lookup started so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

async fn enrich_one(
    remote: &dyn RemoteStorage,
    catalog: &SharedCatalog,
    id: &str,
    path: &str,
) -> Result<bool, RemoteError> {
    let metadata = remote.get_metadata(path).await?;
    Ok(catalog.lock().update(id, |record| record.apply_metadata(&metadata)))
}
