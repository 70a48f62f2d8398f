//! Music Controller Bridge
//!
//! Bridges a home-automation host to a remote music-controller service.
//!
//! This library provides:
//! - An artwork caching proxy with strong-validator HTTP caching semantics
//! - A long-lived event relay with reconnect backoff and polling fallback
//! - SSE fan-out of relayed frames to local subscribers
//! - A small local HTTP API for state, artwork, and cache administration

// =============================================================================
// Lints - Enforce code quality and consistency
// =============================================================================

// Deny truly dangerous patterns (these will fail the build)
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod api;
pub mod artwork;
pub mod config;
pub mod context;
pub mod hub;
pub mod origin;
pub mod relay;
pub mod state;
