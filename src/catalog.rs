//! The in-memory catalog of discovered files.
//!
//! One [`Catalog`] lives for the whole process behind a single mutex
//! ([`SharedCatalog`]). Every compound step (dedup-check-and-append, sort,
//! select-for-fetch, take-for-save) is a single method so callers hold the
//! lock exactly once per step and never across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use cf_core::FileRecord;
use parking_lot::Mutex;

/// The catalog as shared between the session and its stage tasks.
pub type SharedCatalog = Arc<Mutex<Catalog>>;

/// Ordered, id-unique collection of [`FileRecord`]s.
///
/// Records are only ever added, never removed.
#[derive(Debug, Default)]
pub struct Catalog {
    records: Vec<FileRecord>,
    /// Position of each id in `records`; rebuilt after every sort.
    index: HashMap<String, usize>,
}

/// A preview taken out of the catalog for the cache writer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub id: String,
    pub name: String,
    pub bytes: Option<Bytes>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCatalog {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    /// Append `record` unless its id is already known. Returns whether it
    /// was added.
    pub fn insert(&mut self, record: FileRecord) -> bool {
        if self.index.contains_key(&record.id) {
            return false;
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Apply `f` to the record with `id`. Returns `false` if no such record.
    pub fn update(&mut self, id: &str, f: impl FnOnce(&mut FileRecord)) -> bool {
        match self.index.get(id) {
            Some(&pos) => {
                f(&mut self.records[pos]);
                true
            }
            None => false,
        }
    }

    /// Newest capture time first; equal times fall back to ascending id so
    /// the order is deterministic.
    pub fn sort_newest_first(&mut self) {
        self.records
            .sort_by(|a, b| b.time_taken.cmp(&a.time_taken).then_with(|| a.id.cmp(&b.id)));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.id.clone(), pos))
            .collect();
    }

    /// Up to `limit` `(id, path)` pairs of records still waiting for a
    /// preview, in catalog order.
    pub fn select_for_thumbnails(&self, limit: usize) -> Vec<(String, String)> {
        self.records
            .iter()
            .filter(|r| r.needs_thumbnail())
            .take(limit)
            .map(|r| (r.id.clone(), r.path.clone()))
            .collect()
    }

    /// Walk the catalog in order and take up to `limit` loaded-but-unsaved
    /// previews, marking each record saved and dropping its bytes.
    pub fn take_unsaved(&mut self, limit: usize) -> Vec<PendingWrite> {
        let mut taken = Vec::new();
        for record in self.records.iter_mut() {
            if taken.len() >= limit {
                break;
            }
            if !record.needs_save() {
                continue;
            }
            taken.push(PendingWrite {
                id: record.id.clone(),
                name: record.name.clone(),
                bytes: record.take_for_save(),
            });
        }
        taken
    }

    /// Clone of every record, in catalog order.
    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.records.clone()
    }
}
