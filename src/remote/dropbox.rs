//! Dropbox implementation of [`RemoteStorage`].
//!
//! Talks to the Dropbox v2 HTTP API:
//! - `files/search` for filename searches,
//! - `files/get_metadata` with `include_media_info` for photo metadata,
//! - `files/get_thumbnail_batch` on the content host for previews.
//!
//! Features:
//! - Token-bucket rate limiting via [`governor`].
//! - Automatic retry on HTTP 429 with `Retry-After` header support (max 3 retries).
//! - One OAuth refresh and retry on HTTP 401 when a refresh token is configured.
//! - 30-second request timeout.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use cf_core::config::DropboxConfig;
use cf_core::{Dimensions, GeoLocation, MediaMetadata};
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{RemoteError, RemoteStorage, SearchMatch, ThumbnailRequest, ThumbnailResult};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const THUMBNAIL_FORMAT: &str = "jpeg";
const THUMBNAIL_MODE: &str = "strict";

// ---------------------------------------------------------------------------
// Dropbox API wire types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SearchArg<'a> {
    path: &'a str,
    query: &'a str,
    start: u64,
    max_results: u64,
    mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<WireSearchMatch>,
}

#[derive(Debug, Deserialize)]
struct WireSearchMatch {
    metadata: WireEntry,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum WireEntry {
    File(WireFile),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    id: String,
    name: String,
    path_lower: Option<String>,
    #[serde(default)]
    size: u64,
    client_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct GetMetadataArg<'a> {
    path: &'a str,
    include_media_info: bool,
}

#[derive(Debug, Deserialize)]
struct GetMetadataResponse {
    media_info: Option<WireMediaInfo>,
}

/// `media_info` is either `{".tag": "pending"}` or carries `metadata`.
#[derive(Debug, Deserialize)]
struct WireMediaInfo {
    metadata: Option<WireMediaMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireMediaMetadata {
    dimensions: Option<WireDimensions>,
    location: Option<WireLocation>,
    time_taken: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireDimensions {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Serialize)]
struct ThumbnailBatchArg<'a> {
    entries: Vec<ThumbnailArg<'a>>,
}

#[derive(Debug, Serialize)]
struct ThumbnailArg<'a> {
    path: &'a str,
    format: &'static str,
    size: &'a str,
    mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ThumbnailBatchResponse {
    entries: Vec<WireThumbnailEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum WireThumbnailEntry {
    Success {
        thumbnail: String,
    },
    Failure {
        #[serde(default)]
        failure: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl From<WireMediaMetadata> for MediaMetadata {
    fn from(wire: WireMediaMetadata) -> Self {
        Self {
            dimensions: wire.dimensions.map(|d| Dimensions {
                width: d.width,
                height: d.height,
            }),
            location: wire.location.map(|l| GeoLocation {
                latitude: l.latitude,
                longitude: l.longitude,
            }),
            time_taken: wire.time_taken,
        }
    }
}

impl WireThumbnailEntry {
    fn into_result(self) -> ThumbnailResult {
        match self {
            WireThumbnailEntry::Success { thumbnail } => {
                match base64::engine::general_purpose::STANDARD.decode(thumbnail.as_bytes()) {
                    Ok(bytes) => ThumbnailResult::Success(Bytes::from(bytes)),
                    Err(e) => ThumbnailResult::Failure(format!("undecodable thumbnail: {e}")),
                }
            }
            WireThumbnailEntry::Failure { failure } => ThumbnailResult::Failure(failure.to_string()),
            WireThumbnailEntry::Other => ThumbnailResult::Failure("unknown entry tag".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Client implementation
// ---------------------------------------------------------------------------

/// App credentials needed to mint new access tokens.
#[derive(Debug, Clone)]
struct RefreshCredentials {
    refresh_token: String,
    app_key: String,
    app_secret: String,
}

/// Dropbox API client.
///
/// # Examples
///
/// ```no_run
/// use cf_core::config::DropboxConfig;
/// use cloudframe::remote::DropboxClient;
///
/// let config = DropboxConfig {
///     access_token: Some("sl.token".into()),
///     ..DropboxConfig::default()
/// };
/// let client = DropboxClient::new(&config).unwrap();
/// ```
pub struct DropboxClient {
    client: reqwest::Client,
    api_url: String,
    content_url: String,
    access_token: RwLock<Option<String>>,
    refresh: Option<RefreshCredentials>,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl DropboxClient {
    pub fn new(config: &DropboxConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let refresh = match (&config.refresh_token, &config.app_key, &config.app_secret) {
            (Some(refresh_token), Some(app_key), Some(app_secret)) => Some(RefreshCredentials {
                refresh_token: refresh_token.clone(),
                app_key: app_key.clone(),
                app_secret: app_secret.clone(),
            }),
            _ => None,
        };

        if config.access_token.is_none() && refresh.is_none() {
            return Err(RemoteError::Auth(
                "no access token and no refresh credentials configured".into(),
            ));
        }

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            content_url: config.content_url.trim_end_matches('/').to_string(),
            access_token: RwLock::new(config.access_token.clone()),
            refresh,
            rate_limiter,
        })
    }

    fn api(&self, route: &str) -> String {
        format!("{}/2/{}", self.api_url, route)
    }

    fn content(&self, route: &str) -> String {
        format!("{}/2/{}", self.content_url, route)
    }

    /// Current bearer token, minting one first if none is held yet.
    async fn bearer(&self) -> Result<String, RemoteError> {
        let current = self.access_token.read().clone();
        if let Some(token) = current {
            return Ok(token);
        }
        self.refresh_access_token().await
    }

    async fn refresh_access_token(&self) -> Result<String, RemoteError> {
        let creds = self
            .refresh
            .as_ref()
            .ok_or_else(|| RemoteError::Auth("access token rejected and no refresh token".into()))?;

        self.rate_limiter.until_ready().await;

        let resp = self
            .client
            .post(format!("{}/oauth2/token", self.api_url))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", creds.refresh_token.as_str()),
                ("client_id", creds.app_key.as_str()),
                ("client_secret", creds.app_secret.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Auth(format!("token refresh returned {status}: {body}")));
        }

        let token: TokenResponse = decode(resp).await?;
        info!("Refreshed Dropbox access token");
        *self.access_token.write() = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    /// POST a JSON body with rate limiting, 429 backoff, and one refresh on
    /// 401.
    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let mut retries = 0u32;
        let mut refreshed = false;
        loop {
            self.rate_limiter.until_ready().await;
            let token = self.bearer().await?;

            let resp = self
                .client
                .post(url)
                .bearer_auth(&token)
                .json(body)
                .send()
                .await?;

            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RETRIES {
                retries += 1;
                let wait = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                warn!(retry = retries, wait_secs = wait, "Dropbox returned 429, backing off");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED && !refreshed && self.refresh.is_some() {
                refreshed = true;
                debug!(url, "Dropbox rejected access token, refreshing");
                self.refresh_access_token().await?;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(RemoteError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            return decode(resp).await;
        }
    }
}

async fn decode<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, RemoteError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteStorage for DropboxClient {
    async fn search(
        &self,
        path: &str,
        query: &str,
        start: u64,
        max_results: u64,
    ) -> Result<Vec<SearchMatch>, RemoteError> {
        let arg = SearchArg {
            path,
            query,
            start,
            max_results,
            mode: "filename",
        };
        let resp: SearchResponse = self.post_json(&self.api("files/search"), &arg).await?;

        let matches = resp
            .matches
            .into_iter()
            .filter_map(|m| match m.metadata {
                WireEntry::File(file) => Some(SearchMatch {
                    path_lower: file.path_lower.unwrap_or_default(),
                    id: file.id,
                    name: file.name,
                    size: file.size,
                    client_modified: file.client_modified,
                }),
                WireEntry::Other => None,
            })
            .collect::<Vec<_>>();

        debug!(path, query, count = matches.len(), "Dropbox search returned");
        Ok(matches)
    }

    async fn get_metadata(&self, path: &str) -> Result<MediaMetadata, RemoteError> {
        let arg = GetMetadataArg {
            path,
            include_media_info: true,
        };
        let resp: GetMetadataResponse = self.post_json(&self.api("files/get_metadata"), &arg).await?;

        Ok(resp
            .media_info
            .and_then(|info| info.metadata)
            .map(MediaMetadata::from)
            .unwrap_or_default())
    }

    async fn get_thumbnail_batch(
        &self,
        entries: &[ThumbnailRequest],
    ) -> Result<Vec<ThumbnailResult>, RemoteError> {
        let arg = ThumbnailBatchArg {
            entries: entries
                .iter()
                .map(|e| ThumbnailArg {
                    path: &e.path,
                    format: THUMBNAIL_FORMAT,
                    size: &e.size,
                    mode: THUMBNAIL_MODE,
                })
                .collect(),
        };
        let resp: ThumbnailBatchResponse = self
            .post_json(&self.content("files/get_thumbnail_batch"), &arg)
            .await?;

        Ok(resp
            .entries
            .into_iter()
            .map(WireThumbnailEntry::into_result)
            .collect())
    }
}
