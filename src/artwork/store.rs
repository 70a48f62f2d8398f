//! Persistent, content-addressed artwork store.
//!
//! Layout: `<root>/<kind>[/<size>]/` holds `<slug>.json` metadata records
//! and `<hash>.bin` blobs. A blob is written once and never rewritten;
//! metadata repoints a logical key at a new hash when the artwork changes.
//! Metadata is written to a temp file and renamed so readers never see a
//! half-written record. All failures degrade to a miss; the store is a
//! cache, not a source of truth.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::compute_etag;
use super::key::{ArtworkKind, ArtworkRequest};

/// On-disk metadata record for one logical key.
#[derive(Debug, Serialize, Deserialize)]
struct RecordMeta {
    hash: String,
    ctype: String,
    created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<u64>,
}

/// What to remove in a purge.
#[derive(Debug, Clone, Copy)]
pub enum PurgeSelector {
    /// The whole store
    All,
    /// Full-size kinds only (album, artist, playlist, icon, generic)
    FullSize,
}

#[derive(Debug)]
pub struct ContentStore {
    root: PathBuf,
    ttl: Option<Duration>,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        let root = root.into();
        if let Err(e) = fs::create_dir_all(&root) {
            debug!("artwork store root create failed: {}", e);
        }
        Self { root, ttl }
    }

    fn bucket_dir(&self, req: &ArtworkRequest) -> PathBuf {
        let mut dir = self.root.join(req.kind.dir_name());
        if let Some(size) = req.size {
            dir = dir.join(size.to_string());
        }
        dir
    }

    fn meta_path(&self, req: &ArtworkRequest) -> PathBuf {
        self.bucket_dir(req).join(format!("{}.json", req.slug()))
    }

    fn blob_path(&self, req: &ArtworkRequest, hash: &str) -> PathBuf {
        self.bucket_dir(req).join(format!("{}.bin", hash))
    }

    /// Load the record for a key. `allow_stale` ignores a recorded expiry.
    /// Any read failure, missing blob, or empty payload is a miss.
    pub fn load(&self, req: &ArtworkRequest, allow_stale: bool) -> Option<(Vec<u8>, String, String)> {
        let meta_bytes = fs::read(self.meta_path(req)).ok()?;
        let meta: RecordMeta = serde_json::from_slice(&meta_bytes).ok()?;

        if !allow_stale {
            if let Some(exp) = meta.exp {
                if unix_now() >= exp {
                    return None;
                }
            }
        }

        let data = fs::read(self.blob_path(req, &meta.hash)).ok()?;
        if data.is_empty() {
            return None;
        }
        Some((data, meta.ctype, meta.hash))
    }

    /// Persist a payload for a key, returning the content etag. The blob is
    /// only written when absent; metadata is replaced atomically.
    pub fn save(&self, req: &ArtworkRequest, data: &[u8], content_type: &str) -> io::Result<String> {
        let hash = compute_etag(data);
        let bucket = self.bucket_dir(req);
        fs::create_dir_all(&bucket)?;

        let blob = self.blob_path(req, &hash);
        if !blob.exists() {
            write_atomic(&blob, data)?;
        }

        let meta = RecordMeta {
            hash: hash.clone(),
            ctype: content_type.to_string(),
            created_at: unix_now(),
            exp: self.ttl.map(|ttl| unix_now() + ttl.as_secs()),
        };
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_atomic(&self.meta_path(req), &meta_bytes)?;

        Ok(hash)
    }

    /// Remove cached artwork and recreate the root so subsequent writes
    /// need no existence check.
    pub fn purge(&self, selector: PurgeSelector) {
        match selector {
            PurgeSelector::All => {
                if let Err(e) = fs::remove_dir_all(&self.root) {
                    if e.kind() != io::ErrorKind::NotFound {
                        debug!("artwork store purge failed: {}", e);
                    }
                }
            }
            PurgeSelector::FullSize => {
                for kind in [
                    ArtworkKind::Album,
                    ArtworkKind::Artist,
                    ArtworkKind::Playlist,
                    ArtworkKind::Icon,
                    ArtworkKind::Generic,
                ] {
                    let dir = self.root.join(kind.dir_name());
                    if let Err(e) = fs::remove_dir_all(&dir) {
                        if e.kind() != io::ErrorKind::NotFound {
                            debug!("artwork store purge of {} failed: {}", kind.dir_name(), e);
                        }
                    }
                }
            }
        }
        if let Err(e) = fs::create_dir_all(&self.root) {
            debug!("artwork store root recreate failed: {}", e);
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Write to a sibling temp file, then rename into place.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn album_req(name: &str) -> ArtworkRequest {
        ArtworkRequest::resolve("album", name, None).unwrap()
    }

    fn thumb_req(name: &str, size: u32) -> ArtworkRequest {
        ArtworkRequest::resolve("album_thumb", name, Some(size)).unwrap()
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), None);
        let req = album_req("Abbey Road");

        let etag = store.save(&req, b"jpeg-bytes", "image/jpeg").unwrap();
        let (data, ctype, loaded_etag) = store.load(&req, true).unwrap();
        assert_eq!(data, b"jpeg-bytes");
        assert_eq!(ctype, "image/jpeg");
        assert_eq!(loaded_etag, etag);
        // No expiry configured, so a strict load also hits
        assert!(store.load(&req, false).is_some());
    }

    #[test]
    fn identical_bytes_share_one_blob() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), None);
        let a = album_req("Abbey Road");
        let b = album_req("Abbey Road (Remastered)");

        let etag_a = store.save(&a, b"same artwork", "image/jpeg").unwrap();
        let etag_b = store.save(&b, b"same artwork", "image/jpeg").unwrap();
        assert_eq!(etag_a, etag_b);

        let bucket = dir.path().join("album");
        let blobs: Vec<_> = fs::read_dir(&bucket)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "bin"))
            .collect();
        assert_eq!(blobs.len(), 1);
    }

    #[test]
    fn metadata_repoints_without_touching_old_blob() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), None);
        let req = album_req("Abbey Road");

        let old_etag = store.save(&req, b"old artwork", "image/jpeg").unwrap();
        let new_etag = store.save(&req, b"new artwork", "image/png").unwrap();
        assert_ne!(old_etag, new_etag);

        let (data, ctype, etag) = store.load(&req, true).unwrap();
        assert_eq!(data, b"new artwork");
        assert_eq!(ctype, "image/png");
        assert_eq!(etag, new_etag);

        // Old blob remains until a purge
        assert!(dir
            .path()
            .join("album")
            .join(format!("{}.bin", old_etag))
            .exists());
    }

    #[test]
    fn missing_blob_is_a_miss_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), None);
        let req = album_req("Abbey Road");

        let etag = store.save(&req, b"bytes", "image/jpeg").unwrap();
        fs::remove_file(dir.path().join("album").join(format!("{}.bin", etag))).unwrap();
        assert!(store.load(&req, true).is_none());
    }

    #[test]
    fn expired_record_is_a_miss_unless_stale_allowed() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), Some(Duration::from_secs(0)));
        let req = album_req("Abbey Road");

        store.save(&req, b"bytes", "image/jpeg").unwrap();
        assert!(store.load(&req, false).is_none());
        assert!(store.load(&req, true).is_some());
    }

    #[test]
    fn thumbs_bucket_by_size() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), None);

        store
            .save(&thumb_req("Abbey Road", 128), b"small", "image/jpeg")
            .unwrap();
        store
            .save(&thumb_req("Abbey Road", 256), b"large", "image/jpeg")
            .unwrap();

        let (small, _, _) = store.load(&thumb_req("Abbey Road", 128), true).unwrap();
        let (large, _, _) = store.load(&thumb_req("Abbey Road", 256), true).unwrap();
        assert_eq!(small, b"small");
        assert_eq!(large, b"large");
        assert!(dir.path().join("album_thumb/128").is_dir());
        assert!(dir.path().join("album_thumb/256").is_dir());
    }

    #[test]
    fn purge_full_size_keeps_thumbs_and_recreates_root() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path(), None);
        let album = album_req("Abbey Road");
        let thumb = thumb_req("Abbey Road", 128);

        store.save(&album, b"full", "image/jpeg").unwrap();
        store.save(&thumb, b"thumb", "image/jpeg").unwrap();

        store.purge(PurgeSelector::FullSize);
        assert!(store.load(&album, true).is_none());
        assert!(store.load(&thumb, true).is_some());

        store.purge(PurgeSelector::All);
        assert!(store.load(&thumb, true).is_none());
        assert!(store.root().is_dir());

        // Writes succeed immediately after a purge
        store.save(&album, b"again", "image/jpeg").unwrap();
        assert!(store.load(&album, true).is_some());
    }
}
