//! Event relay.
//!
//! One long-lived task per configured origin. The relay keeps a streaming
//! connection to the controller's event endpoint open, parses frames,
//! applies known events to the state sink, and republishes every frame to
//! the broadcast hub. Reconnects use exponential backoff (1s doubling to a
//! cap), and each disconnected cycle performs a one-shot snapshot poll so
//! local state does not go stale while the stream is down.

pub mod parser;
pub mod sink;

pub use parser::{EventStreamParser, FrameDecoder};
pub use sink::StateSink;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bridge_events::{event_names, EventFrame, NowPayload, NowPlayingState, SnapshotPayload};

use crate::hub::BroadcastHub;
use crate::origin::OriginClient;

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Next reconnect delay: doubled, capped.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

enum Connect {
    Connected(reqwest::Response),
    Failed,
    Cancelled,
}

enum StreamEnd {
    Disconnected,
    Cancelled,
}

pub struct EventRelay {
    origin: Arc<OriginClient>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    backoff_max: Duration,
}

impl EventRelay {
    pub fn new(
        origin: Arc<OriginClient>,
        sink: Arc<dyn StateSink>,
        hub: Arc<BroadcastHub>,
        shutdown: CancellationToken,
        backoff_max: Duration,
    ) -> Self {
        Self {
            origin,
            dispatcher: Dispatcher::new(sink, hub),
            shutdown,
            backoff_max,
        }
    }

    /// Run until cancelled. Never returns an error; every failure feeds
    /// the reconnect cycle instead.
    pub async fn run(self) {
        info!("event relay starting for {}", self.origin.base_url());
        let mut backoff = BACKOFF_INITIAL;

        loop {
            match self.connect().await {
                Connect::Connected(resp) => {
                    info!("event stream connected");
                    backoff = BACKOFF_INITIAL;
                    match self.stream(resp).await {
                        StreamEnd::Cancelled => break,
                        StreamEnd::Disconnected => {}
                    }
                }
                Connect::Failed => {}
                Connect::Cancelled => break,
            }

            // Disconnected: wait out the backoff, refresh state once by
            // polling, then try the stream again
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            self.poll_snapshot().await;
            backoff = next_backoff(backoff, self.backoff_max);
        }

        info!("event relay stopped");
    }

    async fn connect(&self) -> Connect {
        debug!("connecting to event stream");
        tokio::select! {
            _ = self.shutdown.cancelled() => Connect::Cancelled,
            result = self.origin.open_event_stream() => match result {
                Ok(resp) if resp.status().is_success() => Connect::Connected(resp),
                Ok(resp) => {
                    warn!("event stream returned HTTP {}", resp.status());
                    Connect::Failed
                }
                Err(e) => {
                    debug!("event stream connect failed: {}", e);
                    Connect::Failed
                }
            }
        }
    }

    async fn stream(&self, resp: reqwest::Response) -> StreamEnd {
        let mut body = resp.bytes_stream();
        let mut decoder = FrameDecoder::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return StreamEnd::Cancelled,
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for frame in decoder.feed(&bytes) {
                            self.dispatcher.dispatch(frame).await;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("event stream read error: {}", e);
                        return StreamEnd::Disconnected;
                    }
                    None => {
                        info!("event stream closed by origin");
                        return StreamEnd::Disconnected;
                    }
                }
            }
        }
    }

    /// One-shot snapshot poll while the stream is down. Errors are logged
    /// and ignored; the next cycle will try again.
    async fn poll_snapshot(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        match self.origin.fetch_now_playing().await {
            Ok(value) => {
                if let Some(state) = now_playing_from_value(&value) {
                    self.dispatcher.sink.apply_now_playing(state).await;
                }
            }
            Err(e) => debug!("now_playing poll failed: {}", e),
        }
        match self.origin.fetch_device_roster().await {
            Ok(roster) if !roster.is_empty() => {
                self.dispatcher.sink.apply_devices(roster).await;
            }
            Ok(_) => {}
            Err(e) => debug!("device poll failed: {}", e),
        }
    }
}

/// Maps parsed frames to sink mutations and republishes them. Separate
/// from the connection loop so it can be tested frame-by-frame.
pub struct Dispatcher {
    sink: Arc<dyn StateSink>,
    hub: Arc<BroadcastHub>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn StateSink>, hub: Arc<BroadcastHub>) -> Self {
        Self { sink, hub }
    }

    /// Apply one frame. A payload that does not match the expected shape
    /// for its event name is dropped without aborting anything; the frame
    /// is still fanned out to subscribers.
    pub async fn dispatch(&self, frame: EventFrame) {
        match frame.event_name.as_str() {
            event_names::NOW => match now_playing_from_value(&frame.payload) {
                Some(state) => self.sink.apply_now_playing(state).await,
                None => debug!("dropping now frame with unexpected payload"),
            },
            event_names::SNAPSHOT => {
                match serde_json::from_value::<SnapshotPayload>(frame.payload.clone()) {
                    Ok(snapshot) => {
                        // Some revisions send the now fields flat instead
                        // of nested
                        let mut now = match snapshot.now {
                            Some(now) => now,
                            None => serde_json::from_value(frame.payload.clone())
                                .unwrap_or_default(),
                        };
                        if now.artwork_token.is_none() {
                            now.artwork_token = snapshot.artwork_token;
                        }
                        self.sink.apply_now_playing(now_playing_from_payload(now)).await;
                        if let Some(devices) = snapshot.devices {
                            self.sink.apply_devices(devices).await;
                        }
                    }
                    Err(e) => debug!("dropping snapshot frame: {}", e),
                }
            }
            event_names::AIRPLAY_FULL => {
                match serde_json::from_value(frame.payload.clone()) {
                    Ok(devices) => self.sink.apply_devices(devices).await,
                    Err(e) => debug!("dropping airplay_full frame: {}", e),
                }
            }
            event_names::MASTER_VOLUME => match frame.payload.as_f64() {
                Some(level) => {
                    self.sink
                        .apply_master_volume(level.clamp(0.0, 100.0).round() as u8)
                        .await
                }
                None => debug!("dropping non-numeric master_volume frame"),
            },
            // Unknown names still reach subscribers below
            _ => {}
        }

        self.hub.publish(&frame.event_name, &frame.payload);
    }
}

/// Decode a flat now-playing object. Non-object payloads yield `None`.
pub fn now_playing_from_value(value: &Value) -> Option<NowPlayingState> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value::<NowPayload>(value.clone())
        .ok()
        .map(now_playing_from_payload)
}

fn now_playing_from_payload(payload: NowPayload) -> NowPlayingState {
    let title = payload.title.filter(|s| !s.is_empty());
    let artist = payload.artist.filter(|s| !s.is_empty());
    let album = payload.album.filter(|s| !s.is_empty());
    let duration = payload.duration;
    let artwork_etag = artwork_fingerprint(&title, &artist, &album, duration);

    NowPlayingState {
        artwork_etag,
        position_observed_at: payload.position.map(|_| unix_now_millis()),
        state: payload
            .state
            .as_deref()
            .map(bridge_events::PlaybackState::from)
            .unwrap_or_default(),
        volume: payload.volume.map(|v| v.clamp(0.0, 100.0).round() as u8),
        artwork_token: payload.artwork_token.filter(|s| !s.is_empty()),
        position: payload.position,
        duration,
        title,
        artist,
        album,
    }
}

/// Cheap artwork-change fingerprint over track metadata, for consumers
/// that want to notice artwork changes without fetching bytes.
fn artwork_fingerprint(
    title: &Option<String>,
    artist: &Option<String>,
    album: &Option<String>,
    duration: Option<f64>,
) -> Option<String> {
    if title.is_none() && artist.is_none() && album.is_none() {
        return None;
    }
    let key = format!(
        "{}|{}|{}|{}",
        title.as_deref().unwrap_or(""),
        artist.as_deref().unwrap_or(""),
        album.as_deref().unwrap_or(""),
        duration.unwrap_or(0.0)
    );
    Some(format!("{:x}", md5::compute(key.as_bytes())))
}

fn unix_now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
