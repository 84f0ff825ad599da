//! The remote media file record and the metadata that enriches it.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Orientation reported for every record until something says otherwise.
pub const DEFAULT_ORIENTATION: u8 = 1;

/// One remote media file and its discovery/enrichment/caching state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Stable remote identifier, unique within a catalog.
    pub id: String,
    pub name: String,
    /// Remote location as reported by the listing (lower-cased).
    pub path: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub latitude: f64,
    pub longitude: f64,
    /// Capture instant; the listing's modification time until enriched.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time_taken: DateTime<Utc>,
    pub orientation: u8,
    /// Decoded preview bytes, held only between fetch and persistence.
    #[serde(skip)]
    pub thumbnail: Option<Bytes>,
    pub loaded: bool,
    pub saved: bool,
    pub error: bool,
}

impl FileRecord {
    /// Build a record from listing metadata with every enrichable field at
    /// its default.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        size: u64,
        time_taken: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            size,
            width: 0,
            height: 0,
            latitude: 0.0,
            longitude: 0.0,
            time_taken,
            orientation: DEFAULT_ORIENTATION,
            thumbnail: None,
            loaded: false,
            saved: false,
            error: false,
        }
    }

    /// Whether the thumbnail fetcher should still ask for a preview.
    pub fn needs_thumbnail(&self) -> bool {
        !self.loaded && !self.error
    }

    /// Whether the cache writer has preview bytes to persist.
    pub fn needs_save(&self) -> bool {
        self.loaded && !self.saved
    }

    /// Store a fetched preview. Ignored once the record has failed.
    pub fn mark_loaded(&mut self, thumbnail: Bytes) {
        if self.error {
            return;
        }
        self.loaded = true;
        self.thumbnail = Some(thumbnail);
    }

    /// Permanently exclude this record from thumbnail fetching.
    pub fn mark_failed(&mut self) {
        self.loaded = false;
        self.error = true;
        self.thumbnail = None;
    }

    /// Mark the preview persisted and hand back its bytes, if any.
    pub fn take_for_save(&mut self) -> Option<Bytes> {
        self.saved = true;
        self.thumbnail.take()
    }

    /// Merge whatever the metadata lookup found; absent fields keep the
    /// listing-derived values.
    pub fn apply_metadata(&mut self, metadata: &MediaMetadata) {
        if let Some(dimensions) = metadata.dimensions {
            self.width = dimensions.width;
            self.height = dimensions.height;
        }
        if let Some(location) = metadata.location {
            self.latitude = location.latitude;
            self.longitude = location.longitude;
        }
        if let Some(time_taken) = metadata.time_taken {
            self.time_taken = time_taken;
        }
    }
}

/// Pixel dimensions of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Geographic location embedded in a media file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Media metadata returned by a remote lookup. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub dimensions: Option<Dimensions>,
    pub location: Option<GeoLocation>,
    pub time_taken: Option<DateTime<Utc>>,
}
