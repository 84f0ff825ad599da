//! On-disk preview cache.
//!
//! Previews are written flat into one directory, one file per remote file
//! name. A file that already exists is never touched, so repeated passes and
//! restarts are idempotent.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use cf_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::catalog::{PendingWrite, SharedCatalog};

/// Maximum number of previews persisted in one pass.
pub const SAVE_BATCH_SIZE: usize = 25;

/// Outcome of one persistence pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Records marked saved in this pass.
    pub persisted: usize,
    pub written: usize,
    pub already_present: usize,
    /// No bytes or no usable file name.
    pub skipped: usize,
    pub failed: usize,
}

enum WriteOutcome {
    Written,
    AlreadyPresent,
    Skipped,
    Failed,
}

/// Persists loaded previews from the catalog into the cache directory.
pub struct CacheWriter {
    dir: PathBuf,
    catalog: SharedCatalog,
}

impl CacheWriter {
    pub fn new(dir: impl Into<PathBuf>, catalog: SharedCatalog) -> Self {
        Self {
            dir: dir.into(),
            catalog,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the cache directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        debug!(dir = %self.dir.display(), "Cache directory ready");
        Ok(())
    }

    /// Take up to [`SAVE_BATCH_SIZE`] unsaved previews and write them out.
    ///
    /// Records are marked saved before the write happens, whatever its
    /// outcome.
    pub async fn persist(&self) -> Result<WriteReport> {
        let pending = self.catalog.lock().take_unsaved(SAVE_BATCH_SIZE);
        if pending.is_empty() {
            return Ok(WriteReport::default());
        }

        let dir = self.dir.clone();
        let report = tokio::task::spawn_blocking(move || write_all(&dir, pending))
            .await
            .map_err(|e| Error::Internal(format!("cache writer task failed: {e}")))?;

        info!(
            persisted = report.persisted,
            written = report.written,
            already_present = report.already_present,
            failed = report.failed,
            "Persisted previews"
        );
        Ok(report)
    }
}

fn write_all(dir: &Path, pending: Vec<PendingWrite>) -> WriteReport {
    let mut report = WriteReport {
        persisted: pending.len(),
        ..WriteReport::default()
    };

    for write in pending {
        match write_one(dir, &write) {
            WriteOutcome::Written => report.written += 1,
            WriteOutcome::AlreadyPresent => report.already_present += 1,
            WriteOutcome::Skipped => report.skipped += 1,
            WriteOutcome::Failed => report.failed += 1,
        }
    }

    report
}

fn write_one(dir: &Path, write: &PendingWrite) -> WriteOutcome {
    let Some(bytes) = write.bytes.as_ref() else {
        return WriteOutcome::Skipped;
    };
    let Some(path) = cache_path(dir, &write.name) else {
        warn!(id = %write.id, name = %write.name, "No usable file name for preview");
        return WriteOutcome::Skipped;
    };

    match write_preview(&path, bytes) {
        Ok(true) => WriteOutcome::Written,
        Ok(false) => {
            debug!(path = %path.display(), "Preview already cached");
            WriteOutcome::AlreadyPresent
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to write preview");
            WriteOutcome::Failed
        }
    }
}

/// Cache location for a remote file `name`: the final path component only,
/// so a name can never escape `dir`.
pub fn cache_path(dir: &Path, name: &str) -> Option<PathBuf> {
    let file_name = Path::new(name).file_name()?;
    Some(dir.join(file_name))
}

/// Write `bytes` to `path` unless it exists. Returns whether a file was
/// created.
pub fn write_preview(path: &Path, bytes: &[u8]) -> std::io::Result<bool> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e),
    };
    file.write_all(bytes)?;
    Ok(true)
}
