//! Per-origin service context.
//!
//! One explicit object carries everything a handler or the relay needs:
//! origin client, artwork service, live state, hub, and the shutdown
//! token. Constructed once in `main` and passed by reference; there is no
//! global registry to reach into.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::artwork::{ArtworkCacheService, ContentStore};
use crate::config::Config;
use crate::hub::BroadcastHub;
use crate::origin::OriginClient;
use crate::relay::EventRelay;
use crate::state::PlayerState;

pub struct ServiceContext {
    /// Present only when an origin is configured
    pub origin: Option<Arc<OriginClient>>,
    /// Present only when an origin is configured
    pub artwork: Option<Arc<ArtworkCacheService>>,
    pub state: Arc<PlayerState>,
    pub hub: Arc<BroadcastHub>,
    pub shutdown: CancellationToken,
    backoff_max: Duration,
}

impl ServiceContext {
    pub fn new(config: &Config) -> Result<Self> {
        let state = Arc::new(PlayerState::new());
        let hub = Arc::new(BroadcastHub::new());

        let (origin, artwork) = match &config.origin {
            Some(origin_cfg) => {
                let origin = Arc::new(OriginClient::new(origin_cfg)?);
                let store = ContentStore::new(
                    &config.cache.dir,
                    config.cache.disk_ttl_secs.map(Duration::from_secs),
                );
                let artwork = Arc::new(ArtworkCacheService::new(
                    origin.clone(),
                    store,
                    Duration::from_secs(config.cache.memory_ttl_secs),
                    config.cache.memory_max_entries,
                ));
                info!("origin configured at {}", origin.base_url());
                (Some(origin), Some(artwork))
            }
            None => (None, None),
        };

        Ok(Self {
            origin,
            artwork,
            state,
            hub,
            shutdown: CancellationToken::new(),
            backoff_max: Duration::from_secs(config.relay.backoff_max_secs),
        })
    }

    /// Spawn the relay task for the configured origin, if any.
    pub fn spawn_relay(&self) -> Option<tokio::task::JoinHandle<()>> {
        let origin = self.origin.clone()?;
        let relay = EventRelay::new(
            origin,
            self.state.clone(),
            self.hub.clone(),
            self.shutdown.clone(),
            self.backoff_max,
        );
        Some(tokio::spawn(relay.run()))
    }
}
