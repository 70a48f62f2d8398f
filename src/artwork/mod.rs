//! Artwork caching proxy.
//!
//! Serves controller artwork through three tiers - persistent
//! content-addressed disk store, bounded in-memory LRU, origin fetch -
//! with strong-validator conditional responses and graceful degradation
//! when the origin is slow or down.

pub mod key;
pub mod memory;
pub mod service;
pub mod store;

pub use key::{ArtworkKind, ArtworkRequest};
pub use memory::MemoryCache;
pub use service::{ArtworkCacheService, ArtworkOrigin, ArtworkResponse};
pub use store::{ContentStore, PurgeSelector};

use sha2::{Digest, Sha256};

/// Strong validator over payload bytes. Deterministic: equal bytes always
/// hash to the same etag, which also names the blob on disk.
pub(crate) fn compute_etag(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
