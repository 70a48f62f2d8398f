//! HTTP API handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use bridge_events::{device, DeviceDescriptor, NowPlayingState};

use crate::artwork::service::{
    ArtworkResponse, FRESH_CACHE_CONTROL, NOT_MODIFIED_CACHE_CONTROL, PLACEHOLDER_CACHE_CONTROL,
    STALE_CACHE_CONTROL, STALE_WARNING,
};
use crate::artwork::{ArtworkKind, ArtworkRequest};
use crate::context::ServiceContext;
use crate::relay::StateSink;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<ServiceContext>,
}

pub fn router(ctx: Arc<ServiceContext>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/now_playing", get(now_playing_handler))
        .route("/devices", get(devices_handler))
        .route("/events", get(events_handler))
        .route("/thumb/{kind}/{*name}", get(thumb_handler))
        .route("/cache/purge_thumbs", post(purge_thumbs_handler))
        .route("/cache/purge_albums", post(purge_albums_handler))
        .route("/artwork/refresh", post(refresh_artwork_handler))
        .route("/devices/refresh", post(refresh_devices_handler))
        .route("/devices/refresh_volumes", post(refresh_volumes_handler))
        .with_state(AppState { ctx })
}

/// General status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub origin: Option<String>,
    pub event_subscribers: usize,
}

/// GET /status - Service health check
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: "music-controller-bridge",
        version: env!("CARGO_PKG_VERSION"),
        origin: state.ctx.origin.as_ref().map(|o| o.base_url().to_string()),
        event_subscribers: state.ctx.hub.subscriber_count(),
    })
}

/// GET /now_playing - Current now-playing snapshot
pub async fn now_playing_handler(State(state): State<AppState>) -> Json<NowPlayingState> {
    Json(state.ctx.state.now_playing().await)
}

#[derive(Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceDescriptor>,
    /// Derived subset: names of the currently selected outputs
    pub active: Vec<String>,
}

/// GET /devices - Device roster with derived active subset
pub async fn devices_handler(State(state): State<AppState>) -> Json<DevicesResponse> {
    let devices = state.ctx.state.devices().await;
    let active = device::active_names(&devices);
    Json(DevicesResponse { devices, active })
}

/// GET /events - SSE re-exposure of relayed frames
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscriber = state.ctx.hub.subscribe();
    let stream = ReceiverStream::new(subscriber.rx)
        .map(|frame| Ok(Event::default().event(frame.event).data(frame.data)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct ThumbQuery {
    pub sz: Option<u32>,
    pub size: Option<u32>,
    /// Bypass every cache tier and refetch from the origin
    #[serde(default)]
    pub refresh: bool,
}

/// GET /thumb/{kind}/{name...} - The artwork proxy endpoint.
///
/// Accepts both the current spelling (`?sz=128`) and the legacy
/// size-in-path spelling (`/thumb/album_thumb/128/<name>`).
pub async fn thumb_handler(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
    Query(query): Query<ThumbQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(artwork) = state.ctx.artwork.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(request) = ArtworkRequest::resolve(&kind, &name, query.sz.or(query.size)) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());

    let outcome = artwork.fetch(&request, if_none_match, query.refresh).await;
    artwork_http_response(outcome)
}

/// Map a cache outcome onto status, headers, and body.
fn artwork_http_response(outcome: ArtworkResponse) -> Response {
    match outcome {
        ArtworkResponse::Fresh {
            data,
            content_type,
            etag,
        } => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::ETAG, etag),
                (header::CACHE_CONTROL, FRESH_CACHE_CONTROL.to_string()),
            ],
            data,
        )
            .into_response(),
        ArtworkResponse::NotModified { etag } => (
            StatusCode::NOT_MODIFIED,
            [
                (header::ETAG, etag),
                (header::CACHE_CONTROL, NOT_MODIFIED_CACHE_CONTROL.to_string()),
            ],
        )
            .into_response(),
        ArtworkResponse::Stale {
            data,
            content_type,
            etag,
        } => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::ETAG, etag),
                (header::CACHE_CONTROL, STALE_CACHE_CONTROL.to_string()),
                (header::WARNING, STALE_WARNING.to_string()),
            ],
            data,
        )
            .into_response(),
        ArtworkResponse::Placeholder { data } => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/png".to_string()),
                (header::CACHE_CONTROL, PLACEHOLDER_CACHE_CONTROL.to_string()),
            ],
            data,
        )
            .into_response(),
        ArtworkResponse::NotFound => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Serialize)]
pub struct AdminResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl AdminResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            ok: true,
            etag: None,
        })
    }
}

/// POST /cache/purge_thumbs - Drop all cached artwork, memory and disk
pub async fn purge_thumbs_handler(State(state): State<AppState>) -> Response {
    match state.ctx.artwork.as_ref() {
        Some(artwork) => {
            artwork.purge_all();
            AdminResponse::ok().into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// POST /cache/purge_albums - Drop full-size artwork, keep thumbnails
pub async fn purge_albums_handler(State(state): State<AppState>) -> Response {
    match state.ctx.artwork.as_ref() {
        Some(artwork) => {
            artwork.purge_full_size();
            AdminResponse::ok().into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// POST /artwork/refresh - Force-refetch the current artwork and rewrite
/// the cache.
pub async fn refresh_artwork_handler(State(state): State<AppState>) -> Response {
    let Some(artwork) = state.ctx.artwork.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let now_playing = state.ctx.state.now_playing().await;
    let key = now_playing
        .artwork_token
        .or(now_playing.artwork_etag)
        .unwrap_or_else(|| "current".to_string());
    let Some(request) = ArtworkRequest::resolve(ArtworkKind::Generic.dir_name(), &key, None) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match artwork.fetch(&request, None, true).await {
        ArtworkResponse::Fresh { etag, .. } => Json(AdminResponse {
            ok: true,
            etag: Some(etag),
        })
        .into_response(),
        _ => (
            StatusCode::BAD_GATEWAY,
            Json(AdminResponse {
                ok: false,
                etag: None,
            }),
        )
            .into_response(),
    }
}

/// POST /devices/refresh - Poll the origin's device list once and rebuild
/// the roster, announcing it to subscribers.
pub async fn refresh_devices_handler(State(state): State<AppState>) -> Response {
    let Some(origin) = state.ctx.origin.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match origin.fetch_device_roster().await {
        Ok(roster) => {
            state.ctx.state.apply_devices(roster).await;
            let devices = state.ctx.state.devices().await;
            if let Ok(payload) = serde_json::to_value(&devices) {
                state.ctx.hub.publish("airplay_full", &payload);
            }
            AdminResponse::ok().into_response()
        }
        Err(e) => {
            tracing::debug!("device refresh failed: {}", e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// POST /devices/refresh_volumes - Poll per-device volumes once and merge
/// them into the roster.
pub async fn refresh_volumes_handler(State(state): State<AppState>) -> Response {
    let Some(origin) = state.ctx.origin.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match origin.fetch_device_volumes().await {
        Ok(volumes) => {
            if let Ok(payload) = serde_json::to_value(&volumes) {
                state.ctx.hub.publish("device_volumes", &payload);
            }
            state.ctx.state.apply_device_volumes(volumes).await;
            AdminResponse::ok().into_response()
        }
        Err(e) => {
            tracing::debug!("device volume refresh failed: {}", e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
