//! Remote catalog scanner.
//!
//! A scan issues one filename search per configured extension, all at once,
//! and folds the responses into the catalog in arrival order. New ids are
//! appended and handed to the [`Enricher`]; already-known ids are skipped.
//! The scan stops accepting matches as soon as [`SCAN_BUDGET`] records have
//! been added and abandons whatever responses are still outstanding.

use std::sync::Arc;

use cf_core::ScanId;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::SharedCatalog;
use crate::enrichment::Enricher;
use crate::remote::{RemoteStorage, SearchMatch};

/// Maximum number of new records one scan may add, across all extensions.
pub const SCAN_BUDGET: usize = 200;

/// Maximum number of matches requested per extension.
pub const PER_EXTENSION_LIMIT: u64 = 200;

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub scan_id: ScanId,
    /// New records appended to the catalog.
    pub added: usize,
    /// Matches skipped because their id was already catalogued.
    pub duplicates: usize,
    /// Extensions whose search call failed.
    pub extensions_failed: usize,
    /// The budget was reached and remaining matches were abandoned.
    pub budget_exhausted: bool,
    /// The scan was superseded before every extension responded.
    pub cancelled: bool,
}

impl ScanReport {
    fn new(scan_id: ScanId) -> Self {
        Self {
            scan_id,
            added: 0,
            duplicates: 0,
            extensions_failed: 0,
            budget_exhausted: false,
            cancelled: false,
        }
    }
}

/// Discovers new remote files and appends them to the catalog.
pub struct Scanner {
    remote: Arc<dyn RemoteStorage>,
    catalog: SharedCatalog,
    enricher: Enricher,
    extensions: Vec<String>,
}

impl Scanner {
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        catalog: SharedCatalog,
        enricher: Enricher,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            remote,
            catalog,
            enricher,
            extensions,
        }
    }

    /// Search `root` for every extension and fold the results into the
    /// catalog.
    ///
    /// Per-extension failures are logged and counted; they never fail the
    /// scan. Cancelling `cancel` abandons outstanding searches.
    pub async fn scan(&self, scan_id: ScanId, root: &str, cancel: &CancellationToken) -> ScanReport {
        info!(%scan_id, root, extensions = self.extensions.len(), "Starting remote scan");

        let mut report = ScanReport::new(scan_id);

        let mut pending: FuturesUnordered<_> = self
            .extensions
            .iter()
            .map(|ext| {
                let remote = Arc::clone(&self.remote);
                let root = root.to_string();
                let ext = ext.clone();
                async move {
                    let result = remote.search(&root, &ext, 0, PER_EXTENSION_LIMIT).await;
                    (ext, result)
                }
            })
            .collect();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                next = pending.next() => next,
            };

            let Some((ext, result)) = next else {
                break;
            };

            match result {
                Ok(matches) => {
                    debug!(%scan_id, ext = %ext, count = matches.len(), "Search returned");
                    if self.accept(matches, &mut report) {
                        report.budget_exhausted = true;
                        break;
                    }
                }
                Err(e) => {
                    report.extensions_failed += 1;
                    warn!(%scan_id, ext = %ext, error = %e, "Search failed for extension");
                }
            }
        }

        info!(
            %scan_id,
            added = report.added,
            duplicates = report.duplicates,
            extensions_failed = report.extensions_failed,
            budget_exhausted = report.budget_exhausted,
            cancelled = report.cancelled,
            "Remote scan finished"
        );

        report
    }

    /// Append unseen matches under one lock acquisition, then start their
    /// enrichment. Returns `true` once the budget is spent.
    fn accept(&self, matches: Vec<SearchMatch>, report: &mut ScanReport) -> bool {
        let mut to_enrich = Vec::new();

        {
            let mut catalog = self.catalog.lock();
            for m in matches {
                if report.added >= SCAN_BUDGET {
                    break;
                }
                if catalog.contains(&m.id) {
                    report.duplicates += 1;
                    continue;
                }
                to_enrich.push((m.id.clone(), m.path_lower.clone()));
                catalog.insert(m.into_record());
                report.added += 1;
            }
        }

        for (id, path) in to_enrich {
            self.enricher.enrich(id, path);
        }

        report.added >= SCAN_BUDGET
    }
}
