//! Origin HTTP client.
//!
//! All traffic toward the remote music controller goes through here:
//! artwork fetches (with a short not-ready retry budget), metadata probes,
//! JSON snapshot polls, and the long-lived event stream. Timeouts are
//! deliberate: ~2s per artwork attempt and probe, 10s for snapshot polls,
//! and no read timeout on the event stream, whose lifetime is governed by
//! the relay's backoff instead.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::artwork::service::ArtworkOrigin;
use crate::artwork::{ArtworkKind, ArtworkRequest};
use crate::config::OriginConfig;

use bridge_events::DeviceDescriptor;

const ARTWORK_TIMEOUT: Duration = Duration::from_secs(2);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delays between "not yet ready" retries; roughly a 1.5s budget total.
const NOT_READY_DELAYS_MS: [u64; 4] = [0, 250, 500, 750];

#[derive(Debug, Error)]
pub enum OriginError {
    /// Connect/timeout/transport failure; recoverable via stale cache
    #[error("origin request failed: {0}")]
    Transport(String),

    /// The origin kept answering with a not-ready status
    #[error("origin not ready (HTTP {0})")]
    NotReady(u16),
}

impl From<reqwest::Error> for OriginError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Response of the origin's `*_meta` probe endpoints.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ArtworkMeta {
    pub etag: Option<String>,
    pub ctype: Option<String>,
}

/// Statuses the controller uses for "artwork exists but is not ready yet"
/// (a beat behind after a track change).
fn is_not_ready(status: StatusCode) -> bool {
    matches!(status.as_u16(), 404 | 425 | 503)
}

pub struct OriginClient {
    base: Url,
    client: Client,
    /// Separate client for the event stream: connect is bounded, reads are not
    stream_client: Client,
}

impl OriginClient {
    pub fn new(cfg: &OriginConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&cfg.base_url())?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let stream_client = Client::builder()
            .connect_timeout(STREAM_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            base,
            client,
            stream_client,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path)
    }

    /// URL for an artwork request, optionally the `_meta` probe variant.
    /// The generic kind addresses the controller's current-artwork endpoint,
    /// which takes no name.
    pub(crate) fn artwork_url(&self, req: &ArtworkRequest, meta: bool) -> String {
        let endpoint = req.kind.origin_endpoint();
        if req.kind == ArtworkKind::Generic {
            return self.endpoint_url(endpoint);
        }
        let suffix = if meta { "_meta" } else { "" };
        let name = urlencoding::encode(&req.name);
        match req.size {
            Some(size) => format!("{}/{}{}/{}/{}", self.base_url(), endpoint, suffix, size, name),
            None => format!("{}/{}{}/{}", self.base_url(), endpoint, suffix, name),
        }
    }

    /// Open the long-lived event stream. The caller owns the read loop.
    pub async fn open_event_stream(&self) -> Result<Response, OriginError> {
        let resp = self
            .stream_client
            .get(self.endpoint_url("events"))
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        Ok(resp)
    }

    async fn get_json(&self, path: &str) -> Result<Value, OriginError> {
        let resp = self
            .client
            .get(self.endpoint_url(path))
            .timeout(SNAPSHOT_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(OriginError::Transport(format!(
                "/{} returned HTTP {}",
                path,
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// One-shot now-playing snapshot (polling fallback while the stream is
    /// down).
    pub async fn fetch_now_playing(&self) -> Result<Value, OriginError> {
        self.get_json("now_playing").await
    }

    /// Names of all known output devices.
    pub async fn fetch_devices(&self) -> Result<Vec<String>, OriginError> {
        Ok(string_list(&self.get_json("devices").await?))
    }

    /// Names of the currently selected output devices. Some controller
    /// revisions answer with a CSV string instead of a list.
    pub async fn fetch_current_devices(&self) -> Result<Vec<String>, OriginError> {
        Ok(string_list(&self.get_json("current_devices").await?))
    }

    /// Per-device volume map, values clamped to 0-100.
    pub async fn fetch_device_volumes(&self) -> Result<HashMap<String, u8>, OriginError> {
        let value = self.get_json("device_volumes").await?;
        let mut volumes = HashMap::new();
        if let Some(map) = value.as_object() {
            for (name, level) in map {
                if let Some(level) = level.as_f64() {
                    volumes.insert(name.clone(), level.clamp(0.0, 100.0).round() as u8);
                }
            }
        }
        Ok(volumes)
    }

    /// Full device roster assembled from `/devices` + `/current_devices`.
    pub async fn fetch_device_roster(&self) -> Result<Vec<DeviceDescriptor>, OriginError> {
        let names = self.fetch_devices().await?;
        let current = self.fetch_current_devices().await.unwrap_or_default();
        Ok(names
            .into_iter()
            .map(|name| {
                let active = current.iter().any(|c| c == &name);
                DeviceDescriptor {
                    active,
                    ..DeviceDescriptor::new(name)
                }
            })
            .collect())
    }
}

#[async_trait]
impl ArtworkOrigin for OriginClient {
    async fn probe_meta(&self, req: &ArtworkRequest) -> Result<ArtworkMeta, OriginError> {
        let resp = self
            .client
            .get(self.artwork_url(req, true))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            // No probe data; not worth distinguishing from an absent etag
            return Ok(ArtworkMeta::default());
        }
        Ok(resp.json().await?)
    }

    async fn fetch_artwork(
        &self,
        req: &ArtworkRequest,
    ) -> Result<Option<(Vec<u8>, String)>, OriginError> {
        let url = self.artwork_url(req, false);
        let mut last_not_ready = 503;

        for delay_ms in NOT_READY_DELAYS_MS {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            let resp = self
                .client
                .get(&url)
                .timeout(ARTWORK_TIMEOUT)
                .send()
                .await?;
            let status = resp.status();
            if status.is_success() {
                let content_type = response_content_type(&resp);
                let data = resp.bytes().await?.to_vec();
                if data.is_empty() {
                    return Ok(None);
                }
                return Ok(Some((data, content_type)));
            }
            if is_not_ready(status) {
                debug!("artwork not ready yet (HTTP {}), retrying", status);
                last_not_ready = status.as_u16();
                continue;
            }
            return Ok(None);
        }

        Err(OriginError::NotReady(last_not_ready))
    }
}

/// Content type of a response, charset stripped, defaulting to JPEG.
fn response_content_type(resp: &Response) -> String {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "image/jpeg".to_string())
}

/// Coerce a JSON list (or CSV string) of names into a `Vec<String>`.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
