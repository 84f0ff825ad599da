//! Application configuration types.
//!
//! The top-level [`Config`] is deserialized from TOML. Every section defaults
//! sensibly so an empty file is valid; credentials may also come from the
//! environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::protocol::SessionSettings;

const ENV_ACCESS_TOKEN: &str = "DROPBOX_ACCESS_TOKEN";
const ENV_REFRESH_TOKEN: &str = "DROPBOX_REFRESH_TOKEN";
const ENV_APP_KEY: &str = "DROPBOX_APP_KEY";
const ENV_APP_SECRET: &str = "DROPBOX_APP_SECRET";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dropbox: DropboxConfig,
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Fill unset credentials from `DROPBOX_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let dbx = &mut self.dropbox;
        for (slot, key) in [
            (&mut dbx.access_token, ENV_ACCESS_TOKEN),
            (&mut dbx.refresh_token, ENV_REFRESH_TOKEN),
            (&mut dbx.app_key, ENV_APP_KEY),
            (&mut dbx.app_secret, ENV_APP_SECRET),
        ] {
            if slot.is_none() {
                *slot = lookup(key).filter(|v| !v.is_empty());
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.dropbox.access_token.is_none() && self.dropbox.refresh_token.is_none() {
            warnings.push("dropbox has neither access_token nor refresh_token".into());
        }
        if self.dropbox.refresh_token.is_some()
            && (self.dropbox.app_key.is_none() || self.dropbox.app_secret.is_none())
        {
            warnings.push("dropbox.refresh_token is set but app_key/app_secret are missing".into());
        }
        if self.dropbox.requests_per_second == 0 {
            warnings.push("dropbox.requests_per_second is 0; using 1".into());
        }
        if self.pipeline.extensions.is_empty() {
            warnings.push("pipeline.extensions is empty; scans will find nothing".into());
        }
        if let Err(e) = self.pipeline.session_settings().validate() {
            warnings.push(e.to_string());
        }

        warnings
    }
}

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    let mut config = Config::from_toml(&content)?;
    config.apply_env();
    Ok(config)
}

/// Load config from `custom_path` or the default locations, falling back to
/// defaults (plus environment) when no file exists.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./cloudframe.toml", "~/.config/cloudframe/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    tracing::info!("No config file found; using defaults");
    let mut config = Config::default();
    config.apply_env();
    Ok(config)
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Dropbox API credentials and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DropboxConfig {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub api_url: String,
    pub content_url: String,
    pub requests_per_second: u32,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            app_key: None,
            app_secret: None,
            api_url: "https://api.dropboxapi.com".into(),
            content_url: "https://content.dropboxapi.com".into(),
            requests_per_second: 8,
        }
    }
}

/// Local preview cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl CacheConfig {
    /// The cache directory with `~` expanded.
    pub fn resolved_dir(&self) -> PathBuf {
        let raw = self.dir.to_string_lossy();
        PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./image_cache"),
        }
    }
}

/// Scan/save cadence and search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub folder: Option<String>,
    pub data_update_interval_ms: u64,
    pub update_interval_ms: u64,
    pub extensions: Vec<String>,
    pub thumbnail_size: String,
}

impl PipelineConfig {
    /// The INIT payload this config describes.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            folder: self.folder.clone(),
            data_update_interval: self.data_update_interval_ms,
            update_interval: self.update_interval_ms,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            folder: None,
            data_update_interval_ms: 60 * 60 * 1000,
            update_interval_ms: 60 * 1000,
            extensions: [".jpg", ".jpeg", ".png", ".gif"]
                .into_iter()
                .map(String::from)
                .collect(),
            thumbnail_size: "w480h320".into(),
        }
    }
}
