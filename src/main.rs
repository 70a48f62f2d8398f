//! Music Controller Bridge
//!
//! Bridges a home-automation host to a remote music-controller service:
//! an artwork caching proxy plus an event relay with SSE fan-out.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use music_controller_bridge::{api, config, context::ServiceContext};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "music_controller_bridge=debug,tower_http=debug,axum::rejection=trace".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Music Controller Bridge");

    // Load configuration
    let config = config::load_config()?;
    tracing::info!(?config, "Configuration loaded");

    // Build the per-origin service context and start the relay
    let ctx = Arc::new(ServiceContext::new(&config)?);
    let relay_handle = ctx.spawn_relay();
    if relay_handle.is_none() {
        tracing::warn!("no origin configured; artwork proxy and event relay are disabled");
    }

    // Build API routes
    let app = api::router(ctx.clone())
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = ctx.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            shutdown.cancel();
        })
        .await?;

    // The relay exits promptly once the token is cancelled
    if let Some(handle) = relay_handle {
        let _ = handle.await;
    }

    Ok(())
}
