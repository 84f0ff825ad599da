//! Integration tests for the scan, enrichment, thumbnail, and cache stages
//! driven directly against a scripted remote.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use cf_core::{Dimensions, GeoLocation, MediaMetadata, ScanId};
use chrono::{TimeZone, Utc};
use cloudframe::cache::{CacheWriter, SAVE_BATCH_SIZE};
use cloudframe::catalog::{Catalog, SharedCatalog};
use cloudframe::enrichment::Enricher;
use cloudframe::scanner::{Scanner, SCAN_BUDGET};
use cloudframe::thumbnails::{ThumbnailFetcher, THUMBNAIL_BATCH_SIZE};
use common::{extensions, photo, photos, FakeRemote};
use tokio_util::sync::CancellationToken;

struct Pipeline {
    remote: Arc<FakeRemote>,
    catalog: SharedCatalog,
    enricher: Enricher,
    scanner: Scanner,
    fetcher: ThumbnailFetcher,
}

impl Pipeline {
    fn new(remote: FakeRemote) -> Self {
        let remote = Arc::new(remote);
        let catalog = Catalog::shared();
        let enricher = Enricher::new(remote.clone(), catalog.clone());
        let scanner = Scanner::new(remote.clone(), catalog.clone(), enricher.clone(), extensions());
        let fetcher = ThumbnailFetcher::new(remote.clone(), catalog.clone(), "w480h320");
        Self {
            remote,
            catalog,
            enricher,
            scanner,
            fetcher,
        }
    }

    async fn scan(&self) -> cloudframe::scanner::ScanReport {
        self.scanner
            .scan(ScanId::new(), "/photos", &CancellationToken::new())
            .await
    }

    fn ids(&self) -> Vec<String> {
        self.catalog.lock().records().iter().map(|r| r.id.clone()).collect()
    }
}

fn assert_unique(ids: &[String]) {
    let set: HashSet<_> = ids.iter().collect();
    assert_eq!(set.len(), ids.len(), "duplicate ids in catalog: {ids:?}");
}

#[tokio::test]
async fn scan_deduplicates_across_extensions() {
    let remote = FakeRemote::new()
        .with_matches(".jpg", vec![photo("a", 1), photo("b", 2)])
        .with_matches(".jpeg", vec![photo("b", 2), photo("c", 3)]);
    let p = Pipeline::new(remote);

    let report = p.scan().await;

    assert_eq!(report.added, 3);
    assert_eq!(report.duplicates, 1);
    assert!(!report.budget_exhausted);
    assert_eq!(p.remote.search_calls(), 4);
    assert_unique(&p.ids());
}

#[tokio::test]
async fn scan_never_exceeds_budget() {
    let remote = FakeRemote::new()
        .with_matches(".jpg", photos("j", 150))
        .with_matches(".png", photos("p", 150))
        .with_matches(".gif", photos("g", 150));
    let p = Pipeline::new(remote);

    let report = p.scan().await;

    assert_eq!(report.added, SCAN_BUDGET);
    assert!(report.budget_exhausted);
    assert_eq!(p.catalog.lock().len(), SCAN_BUDGET);

    // Rescans only add what earlier ones left behind, again capped.
    let report = p.scan().await;
    assert_eq!(report.added, SCAN_BUDGET);
    let report = p.scan().await;
    assert_eq!(report.added, 50);
    assert!(!report.budget_exhausted);
    assert_eq!(p.catalog.lock().len(), 450);
    assert_unique(&p.ids());
}

#[tokio::test]
async fn failed_extension_is_counted_not_fatal() {
    let remote = FakeRemote::new().with_matches(".png", vec![photo("a", 1)]);
    remote.fail_search(".jpg", 500);
    remote.fail_search(".gif", 429);
    let p = Pipeline::new(remote);

    let report = p.scan().await;

    assert_eq!(report.extensions_failed, 2);
    assert_eq!(report.added, 1);
    assert_eq!(p.ids(), ["id:a"]);
}

#[tokio::test]
async fn cancelled_scan_adds_nothing() {
    let remote = FakeRemote::new().with_matches(".jpg", photos("x", 5));
    remote.delay_searches(Duration::from_secs(60));
    let p = Pipeline::new(remote);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let report = p.scanner.scan(ScanId::new(), "", &cancel).await;

    assert!(report.cancelled);
    assert_eq!(report.added, 0);
    assert!(p.catalog.lock().is_empty());
}

#[tokio::test]
async fn enrichment_failure_keeps_listing_defaults() {
    let remote = FakeRemote::new().with_matches(".jpg", vec![photo("lonely", 1_500_000_000)]);
    let p = Pipeline::new(remote);

    p.scan().await;
    p.enricher.wait_idle().await;

    let catalog = p.catalog.lock();
    let record = catalog.get("id:lonely").unwrap();
    assert_eq!((record.width, record.height), (0, 0));
    assert_eq!((record.latitude, record.longitude), (0.0, 0.0));
    assert_eq!(record.time_taken, Utc.timestamp_opt(1_500_000_000, 0).unwrap());
    assert_eq!(p.remote.metadata_calls(), 1);
}

#[tokio::test]
async fn enrichment_applies_metadata_after_sort() {
    let remote = FakeRemote::new().with_matches(".jpg", vec![photo("old", 10), photo("new", 20)]);
    let taken = Utc.with_ymd_and_hms(2021, 7, 4, 9, 30, 0).unwrap();
    remote.set_metadata(
        "/photos/old.jpg",
        MediaMetadata {
            dimensions: Some(Dimensions {
                width: 4032,
                height: 3024,
            }),
            location: Some(GeoLocation {
                latitude: 48.85,
                longitude: 2.35,
            }),
            time_taken: Some(taken),
        },
    );
    remote.hold_metadata();
    let p = Pipeline::new(remote);

    p.scan().await;
    p.catalog.lock().sort_newest_first();
    assert_eq!(p.ids(), ["id:new", "id:old"]);

    p.remote.open_metadata();
    p.enricher.wait_idle().await;

    let catalog = p.catalog.lock();
    let record = catalog.get("id:old").unwrap();
    assert_eq!((record.width, record.height), (4032, 3024));
    assert_eq!(record.latitude, 48.85);
    assert_eq!(record.time_taken, taken);
}

#[tokio::test]
async fn back_to_back_scans_before_enrichment_resolve_stay_unique() {
    let remote = FakeRemote::new()
        .with_matches(".jpg", photos("a", 10))
        .with_matches(".png", photos("a", 10));
    remote.hold_metadata();
    let p = Pipeline::new(remote);

    let first = p.scan().await;
    let second = p.scan().await;
    assert!(p.enricher.in_flight() > 0);

    p.remote.open_metadata();
    p.enricher.wait_idle().await;

    assert_eq!(first.added, 10);
    assert_eq!(second.added, 0);
    assert_eq!(second.duplicates, 20);
    assert_eq!(p.catalog.lock().len(), 10);
    assert_unique(&p.ids());
    // One lookup per record, never per sighting.
    assert_eq!(p.remote.metadata_calls(), 10);
}

#[tokio::test]
async fn one_cycle_fetches_and_persists_a_bounded_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let remote = FakeRemote::new().with_matches(".jpg", photos("r", 30));
    let p = Pipeline::new(remote);
    let writer = CacheWriter::new(tmp.path(), p.catalog.clone());

    p.scan().await;
    p.catalog.lock().sort_newest_first();

    let fetched = p.fetcher.fetch().await;
    let written = writer.persist().await.unwrap();

    assert_eq!(fetched.requested, THUMBNAIL_BATCH_SIZE);
    assert_eq!(fetched.loaded, 25);
    assert_eq!(written.written, SAVE_BATCH_SIZE);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 25);

    let snapshot = p.catalog.lock().snapshot();
    assert_eq!(snapshot.len(), 30);
    assert_eq!(snapshot.iter().filter(|r| r.saved).count(), 25);
    assert!(snapshot.iter().all(|r| r.thumbnail.is_none()));

    // The next cycle picks up the remainder.
    assert_eq!(p.fetcher.fetch().await.requested, 5);
    assert_eq!(writer.persist().await.unwrap().written, 5);
    assert!(p.remote.batch_sizes().iter().all(|&n| n <= THUMBNAIL_BATCH_SIZE));
}

#[tokio::test]
async fn failed_entry_is_permanent() {
    let remote = FakeRemote::new().with_matches(".jpg", vec![photo("x", 1), photo("y", 2)]);
    remote.fail_thumbnail("/photos/x.jpg");
    let p = Pipeline::new(remote);

    p.scan().await;
    let report = p.fetcher.fetch().await;
    assert_eq!((report.loaded, report.failed), (1, 1));

    {
        let catalog = p.catalog.lock();
        let x = catalog.get("id:x").unwrap();
        assert!(!x.loaded && x.error);
        assert!(catalog.select_for_thumbnails(THUMBNAIL_BATCH_SIZE).is_empty());
    }

    // Later cycles neither retry nor reset it.
    let report = p.fetcher.fetch().await;
    assert_eq!(report.requested, 0);
    assert!(p.catalog.lock().get("id:x").unwrap().error);
    assert_eq!(p.remote.batch_sizes(), [2]);
}

#[tokio::test]
async fn batch_failure_leaves_records_untouched() {
    let remote = FakeRemote::new().with_matches(".jpg", photos("b", 3));
    remote.fail_batches(true);
    let p = Pipeline::new(remote);

    p.scan().await;
    let report = p.fetcher.fetch().await;

    assert!(report.batch_failed);
    assert!(p
        .catalog
        .lock()
        .records()
        .iter()
        .all(|r| !r.loaded && !r.error));

    // Recovered remote: the same records are selected again.
    p.remote.fail_batches(false);
    assert_eq!(p.fetcher.fetch().await.loaded, 3);
}

#[tokio::test]
async fn mismatched_batch_length_is_ignored() {
    let remote = FakeRemote::new().with_matches(".jpg", photos("m", 4));
    remote.truncate_batches(true);
    let p = Pipeline::new(remote);

    p.scan().await;
    let report = p.fetcher.fetch().await;

    assert!(report.batch_failed);
    assert_eq!(report.requested, 4);
    assert!(p
        .catalog
        .lock()
        .records()
        .iter()
        .all(|r| r.needs_thumbnail()));
}

#[tokio::test]
async fn persisted_preview_is_never_overwritten() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("keep.jpg"), b"first copy").unwrap();

    let remote = FakeRemote::new().with_matches(".jpg", vec![photo("keep", 1)]);
    let p = Pipeline::new(remote);
    let writer = CacheWriter::new(tmp.path(), p.catalog.clone());

    p.scan().await;
    p.fetcher.fetch().await;
    let report = writer.persist().await.unwrap();

    assert_eq!(report.already_present, 1);
    assert_eq!(std::fs::read(tmp.path().join("keep.jpg")).unwrap(), b"first copy");
    assert!(p.catalog.lock().get("id:keep").unwrap().saved);
}
