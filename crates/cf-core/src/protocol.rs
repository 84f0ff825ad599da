//! Commands the host sends to a session.
//!
//! Messages are tagged by a `notification` field carrying the host-side
//! name, with an optional `payload`, e.g.
//! `{"notification":"INIT","payload":{"folder":"photos","dataUpdateInterval":3600000,"updateInterval":60000}}`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Inbound command from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notification", content = "payload")]
pub enum Command {
    /// Configure the session and prepare the cache directory.
    #[serde(rename = "INIT")]
    Init(SessionSettings),
    /// Run a scan right now, outside the timer cadence.
    #[serde(rename = "GET")]
    Get,
    /// Stop timers and end the session.
    #[serde(rename = "SHUTDOWN")]
    Shutdown,
}

/// The INIT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Remote folder to search; the whole account when absent or empty.
    #[serde(default)]
    pub folder: Option<String>,
    /// Milliseconds between scans of the remote account.
    pub data_update_interval: u64,
    /// Milliseconds between save/notify cycles.
    pub update_interval: u64,
}

impl SessionSettings {
    pub fn validate(&self) -> Result<()> {
        if self.data_update_interval == 0 {
            return Err(Error::validation("dataUpdateInterval must be positive"));
        }
        if self.update_interval == 0 {
            return Err(Error::validation("updateInterval must be positive"));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.data_update_interval)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval)
    }

    /// The folder as the remote search expects it: trimmed, lower-cased,
    /// and rooted with `/` unless empty.
    pub fn search_root(&self) -> String {
        normalize_folder(self.folder.as_deref().unwrap_or_default())
    }
}

/// Normalize a user-supplied folder into a remote search root.
pub fn normalize_folder(folder: &str) -> String {
    let path = folder.trim().to_lowercase();
    if path.is_empty() || path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}
