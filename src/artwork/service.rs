//! Artwork cache orchestration.
//!
//! Answers an artwork request from the cheapest tier that can serve it:
//! disk (stale allowed), memory, a metadata probe that can promote a stale
//! disk record without re-downloading bytes, and finally a full origin
//! fetch. Origin failure degrades to stale bytes or a placeholder image;
//! image-rendering clients never see an error page for artwork.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tracing::debug;

use super::key::ArtworkRequest;
use super::memory::MemoryCache;
use super::store::{ContentStore, PurgeSelector};
use crate::origin::{ArtworkMeta, OriginError};

/// Cache-Control for fresh payloads: clients may hold artwork for a year
/// and revalidate cheaply by etag.
pub const FRESH_CACHE_CONTROL: &str = "public, max-age=31536000, stale-while-revalidate=300";

/// Cache-Control for conditional hits; the client already holds the bytes.
pub const NOT_MODIFIED_CACHE_CONTROL: &str = "public, max-age=0, stale-while-revalidate=300";

/// Stale bytes served on origin failure must be revalidated next time.
pub const STALE_CACHE_CONTROL: &str = "no-cache";

/// The placeholder is a stopgap; let clients retry soon.
pub const PLACEHOLDER_CACHE_CONTROL: &str = "public, max-age=60";

/// HTTP Warning header value attached to stale-on-failure responses.
pub const STALE_WARNING: &str = "110 - stale artwork served";

/// 1x1 transparent PNG served when nothing better exists, so image
/// elements never render a broken-image glyph.
const BLANK_PNG_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mP8/x8AAoMBgQ2QY1QAAAAASUVORK5CYII=";

pub fn placeholder_png() -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(BLANK_PNG_B64)
        .unwrap_or_default()
}

/// The slice of the origin the artwork path needs. Decided once at
/// construction; handlers never probe for optional capabilities.
#[async_trait]
pub trait ArtworkOrigin: Send + Sync {
    /// Lightweight `{etag, ctype}` probe. An absent etag means "no data".
    async fn probe_meta(&self, req: &ArtworkRequest) -> Result<ArtworkMeta, OriginError>;

    /// Full artwork fetch. `Ok(None)` is a definitive origin miss;
    /// `Err` is unavailability and triggers the degradation path.
    async fn fetch_artwork(
        &self,
        req: &ArtworkRequest,
    ) -> Result<Option<(Vec<u8>, String)>, OriginError>;
}

/// Outcome of an artwork fetch, ready for HTTP mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtworkResponse {
    /// Full payload with a strong validator
    Fresh {
        data: Vec<u8>,
        content_type: String,
        etag: String,
    },
    /// The caller's `If-None-Match` matched; no body
    NotModified { etag: String },
    /// Origin is down; previously cached bytes served with a warning
    Stale {
        data: Vec<u8>,
        content_type: String,
        etag: String,
    },
    /// Nothing cached and origin down; a tiny blank image
    Placeholder { data: Vec<u8> },
    /// The origin definitively has no such artwork
    NotFound,
}

pub struct ArtworkCacheService {
    memory: MemoryCache,
    store: ContentStore,
    origin: Arc<dyn ArtworkOrigin>,
}

impl ArtworkCacheService {
    pub fn new(
        origin: Arc<dyn ArtworkOrigin>,
        store: ContentStore,
        memory_ttl: Duration,
        memory_max_entries: usize,
    ) -> Self {
        Self {
            memory: MemoryCache::new(memory_ttl, memory_max_entries),
            store,
            origin,
        }
    }

    /// Serve one artwork request. `force` skips every cache tier and goes
    /// straight to the origin, still writing through on success.
    pub async fn fetch(
        &self,
        req: &ArtworkRequest,
        if_none_match: Option<&str>,
        force: bool,
    ) -> ArtworkResponse {
        let key = req.memory_key();

        if !force {
            // 1. Disk, stale allowed; a hit also re-warms the memory tier
            if let Some((data, content_type, etag)) = self.store.load(req, true) {
                self.memory.put(&key, data.clone(), &content_type);
                return conditional(if_none_match, data, content_type, etag);
            }

            // 2. Memory
            if let Some(hit) = self.memory.get(&key) {
                return conditional(if_none_match, hit.data, hit.content_type, hit.etag);
            }

            // 3. Metadata probe: a matching etag promotes a stale disk
            //    record without re-downloading bytes. (With disk checked
            //    above this only pays off for records that raced a purge or
            //    live under another key variant; the probe is ~2s bounded
            //    and errors are swallowed.)
            if req.kind.has_meta_probe() {
                match self.origin.probe_meta(req).await {
                    Ok(meta) => {
                        if let Some(origin_etag) = meta.etag {
                            if let Some((data, content_type, etag)) = self.store.load(req, true) {
                                if etag == origin_etag {
                                    self.memory.put(&key, data.clone(), &content_type);
                                    return conditional(if_none_match, data, content_type, etag);
                                }
                            }
                        }
                    }
                    Err(e) => debug!("artwork meta probe failed: {}", e),
                }
            }
        }

        // 4. Full fetch from the origin
        match self.origin.fetch_artwork(req).await {
            Ok(Some((data, content_type))) => {
                let etag = self.memory.put(&key, data.clone(), &content_type);
                if let Err(e) = self.store.save(req, &data, &content_type) {
                    debug!("artwork disk save failed: {}", e);
                }
                ArtworkResponse::Fresh {
                    data,
                    content_type,
                    etag,
                }
            }
            Ok(None) => ArtworkResponse::NotFound,
            // 5. Origin unavailable: stale bytes if we have them, else a
            //    placeholder; never an error page
            Err(e) => {
                debug!("artwork origin fetch failed: {}", e);
                if let Some((data, content_type, etag)) = self.store.load(req, true) {
                    ArtworkResponse::Stale {
                        data,
                        content_type,
                        etag,
                    }
                } else {
                    ArtworkResponse::Placeholder {
                        data: placeholder_png(),
                    }
                }
            }
        }
    }

    /// Purge every cached artwork, memory and disk.
    pub fn purge_all(&self) {
        self.memory.clear();
        self.store.purge(PurgeSelector::All);
    }

    /// Purge full-size artwork (album/artist/playlist/icon/generic) from
    /// memory and disk; thumbnails are kept.
    pub fn purge_full_size(&self) {
        self.memory.remove_matching(|key| {
            !key.starts_with("album_thumb/")
                && !key.starts_with("artist_thumb/")
                && !key.starts_with("playlist_thumb/")
        });
        self.store.purge(PurgeSelector::FullSize);
    }
}

fn conditional(
    if_none_match: Option<&str>,
    data: Vec<u8>,
    content_type: String,
    etag: String,
) -> ArtworkResponse {
    if if_none_match == Some(etag.as_str()) {
        ArtworkResponse::NotModified { etag }
    } else {
        ArtworkResponse::Fresh {
            data,
            content_type,
            etag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted origin: pops one result per call, counts calls.
    #[derive(Default)]
    struct ScriptedOrigin {
        meta: Mutex<Vec<Result<ArtworkMeta, OriginError>>>,
        fetches: Mutex<Vec<Result<Option<(Vec<u8>, String)>, OriginError>>>,
        meta_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
    }

    impl ScriptedOrigin {
        fn with_fetch(result: Result<Option<(Vec<u8>, String)>, OriginError>) -> Arc<Self> {
            let origin = Self::default();
            origin.fetches.lock().unwrap().push(result);
            Arc::new(origin)
        }

        fn fetch_count(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ArtworkOrigin for ScriptedOrigin {
        async fn probe_meta(&self, _req: &ArtworkRequest) -> Result<ArtworkMeta, OriginError> {
            self.meta_calls.fetch_add(1, Ordering::SeqCst);
            self.meta
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(ArtworkMeta::default()))
        }

        async fn fetch_artwork(
            &self,
            _req: &ArtworkRequest,
        ) -> Result<Option<(Vec<u8>, String)>, OriginError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.fetches
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(OriginError::Transport("exhausted".into())))
        }
    }

    fn service(origin: Arc<ScriptedOrigin>, dir: &TempDir) -> ArtworkCacheService {
        ArtworkCacheService::new(
            origin,
            ContentStore::new(dir.path(), None),
            Duration::from_secs(300),
            300,
        )
    }

    fn thumb() -> ArtworkRequest {
        ArtworkRequest::resolve("album_thumb", "128/Abbey Road", None).unwrap()
    }

    #[tokio::test]
    async fn cold_fetch_populates_both_tiers() {
        let dir = TempDir::new().unwrap();
        let origin =
            ScriptedOrigin::with_fetch(Ok(Some((b"jpeg-bytes".to_vec(), "image/jpeg".into()))));
        let svc = service(origin.clone(), &dir);

        let resp = svc.fetch(&thumb(), None, false).await;
        let etag = match resp {
            ArtworkResponse::Fresh {
                data,
                content_type,
                etag,
            } => {
                assert_eq!(data, b"jpeg-bytes");
                assert_eq!(content_type, "image/jpeg");
                etag
            }
            other => panic!("expected Fresh, got {:?}", other),
        };
        assert_eq!(origin.fetch_count(), 1);

        // Second request is served from disk, no further origin traffic
        let resp = svc.fetch(&thumb(), None, false).await;
        assert!(matches!(resp, ArtworkResponse::Fresh { etag: e, .. } if e == etag));
        assert_eq!(origin.fetch_count(), 1);
    }

    #[tokio::test]
    async fn matching_conditional_yields_not_modified() {
        let dir = TempDir::new().unwrap();
        let origin =
            ScriptedOrigin::with_fetch(Ok(Some((b"jpeg-bytes".to_vec(), "image/jpeg".into()))));
        let svc = service(origin, &dir);

        let etag = match svc.fetch(&thumb(), None, false).await {
            ArtworkResponse::Fresh { etag, .. } => etag,
            other => panic!("expected Fresh, got {:?}", other),
        };

        let resp = svc.fetch(&thumb(), Some(&etag), false).await;
        assert_eq!(resp, ArtworkResponse::NotModified { etag: etag.clone() });

        // A stale validator gets the full payload back
        let resp = svc.fetch(&thumb(), Some("bogus"), false).await;
        assert!(matches!(resp, ArtworkResponse::Fresh { .. }));
    }

    #[tokio::test]
    async fn origin_failure_serves_stale_with_cached_key() {
        let dir = TempDir::new().unwrap();
        let origin =
            ScriptedOrigin::with_fetch(Ok(Some((b"jpeg-bytes".to_vec(), "image/jpeg".into()))));
        let svc = service(origin, &dir);

        svc.fetch(&thumb(), None, false).await;

        // Force skips the cache tiers; the scripted origin now fails
        let resp = svc.fetch(&thumb(), None, true).await;
        match resp {
            ArtworkResponse::Stale { data, .. } => assert_eq!(data, b"jpeg-bytes"),
            other => panic!("expected Stale, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn origin_failure_with_empty_cache_yields_placeholder() {
        let dir = TempDir::new().unwrap();
        let origin = ScriptedOrigin::with_fetch(Err(OriginError::Transport("refused".into())));
        let svc = service(origin, &dir);

        let resp = svc.fetch(&thumb(), None, false).await;
        match resp {
            ArtworkResponse::Placeholder { data } => assert!(!data.is_empty()),
            other => panic!("expected Placeholder, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn definitive_origin_miss_is_not_found() {
        let dir = TempDir::new().unwrap();
        let origin = ScriptedOrigin::with_fetch(Ok(None));
        let svc = service(origin, &dir);

        let resp = svc.fetch(&thumb(), None, false).await;
        assert_eq!(resp, ArtworkResponse::NotFound);
    }

    #[tokio::test]
    async fn force_refresh_rewrites_the_cache() {
        let dir = TempDir::new().unwrap();
        let origin = ScriptedOrigin::default();
        {
            let mut fetches = origin.fetches.lock().unwrap();
            // Popped in reverse order
            fetches.push(Ok(Some((b"new artwork".to_vec(), "image/jpeg".into()))));
            fetches.push(Ok(Some((b"old artwork".to_vec(), "image/jpeg".into()))));
        }
        let origin = Arc::new(origin);
        let svc = service(origin.clone(), &dir);

        svc.fetch(&thumb(), None, false).await;
        let resp = svc.fetch(&thumb(), None, true).await;
        assert!(matches!(resp, ArtworkResponse::Fresh { ref data, .. } if data == b"new artwork"));
        assert_eq!(origin.fetch_count(), 2);

        // The rewrite is visible to subsequent cache hits
        let resp = svc.fetch(&thumb(), None, false).await;
        assert!(matches!(resp, ArtworkResponse::Fresh { ref data, .. } if data == b"new artwork"));
        assert_eq!(origin.fetch_count(), 2);
    }

    #[tokio::test]
    async fn not_ready_after_retries_degrades_like_failure() {
        let dir = TempDir::new().unwrap();
        let origin = ScriptedOrigin::with_fetch(Err(OriginError::NotReady(425)));
        let svc = service(origin, &dir);

        let resp = svc.fetch(&thumb(), None, false).await;
        assert!(matches!(resp, ArtworkResponse::Placeholder { .. }));
    }

    #[tokio::test]
    async fn purge_full_size_keeps_thumbnails() {
        let dir = TempDir::new().unwrap();
        let origin = ScriptedOrigin::default();
        {
            let mut fetches = origin.fetches.lock().unwrap();
            fetches.push(Ok(Some((b"full".to_vec(), "image/jpeg".into()))));
            fetches.push(Ok(Some((b"thumb".to_vec(), "image/jpeg".into()))));
        }
        let origin = Arc::new(origin);
        let svc = service(origin.clone(), &dir);

        let album = ArtworkRequest::resolve("album", "Abbey Road", None).unwrap();
        svc.fetch(&thumb(), None, false).await;
        svc.fetch(&album, None, false).await;
        assert_eq!(origin.fetch_count(), 2);

        svc.purge_full_size();

        // Thumb still cached; album needs the origin again (which is now
        // exhausted and fails over to the placeholder)
        let resp = svc.fetch(&thumb(), None, false).await;
        assert!(matches!(resp, ArtworkResponse::Fresh { .. }));
        assert_eq!(origin.fetch_count(), 2);
        let resp = svc.fetch(&album, None, false).await;
        assert!(matches!(resp, ArtworkResponse::Placeholder { .. }));
    }

    #[test]
    fn placeholder_is_a_png() {
        let png = placeholder_png();
        assert_eq!(&png[1..4], b"PNG");
    }
}
