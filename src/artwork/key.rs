//! Cache key resolution.
//!
//! Turns an inbound artwork request (kind + raw name + optional size) into
//! a canonical key that is safe to use as a filename and map key. Legacy
//! URLs carried the thumbnail size as a leading path segment
//! (`/thumb/album_thumb/128/<name>`); both spellings resolve to the same
//! key so cached artwork is shared across URL variants.

use std::str::FromStr;

/// Thumbnail sizes are clamped to this range; out-of-range requests are
/// coerced rather than rejected.
pub const MIN_THUMB_SIZE: u32 = 16;
pub const MAX_THUMB_SIZE: u32 = 512;
pub const DEFAULT_THUMB_SIZE: u32 = 128;

/// The artwork variants the origin can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtworkKind {
    Album,
    Artist,
    Playlist,
    Icon,
    AlbumThumb,
    ArtistThumb,
    PlaylistThumb,
    /// Token-addressed artwork (the controller's "current artwork" endpoint)
    Generic,
}

impl ArtworkKind {
    /// Directory name for the on-disk bucket and memory-key prefix.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Playlist => "playlist",
            Self::Icon => "icon",
            Self::AlbumThumb => "album_thumb",
            Self::ArtistThumb => "artist_thumb",
            Self::PlaylistThumb => "playlist_thumb",
            Self::Generic => "generic",
        }
    }

    /// Origin endpoint serving this kind.
    pub fn origin_endpoint(self) -> &'static str {
        match self {
            Self::Album => "artwork_album",
            Self::Artist => "artwork_artist",
            Self::Playlist => "artwork_playlist",
            Self::Icon => "icon",
            Self::AlbumThumb => "artwork_album_thumb",
            Self::ArtistThumb => "artwork_artist_thumb",
            Self::PlaylistThumb => "artwork_playlist_thumb",
            Self::Generic => "artwork",
        }
    }

    pub fn is_thumb(self) -> bool {
        matches!(
            self,
            Self::AlbumThumb | Self::ArtistThumb | Self::PlaylistThumb
        )
    }

    /// Whether the origin exposes a `*_meta` probe variant for this kind.
    pub fn has_meta_probe(self) -> bool {
        !matches!(self, Self::Icon | Self::Generic)
    }
}

impl FromStr for ArtworkKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "album" => Ok(Self::Album),
            "artist" => Ok(Self::Artist),
            "playlist" => Ok(Self::Playlist),
            "icon" => Ok(Self::Icon),
            "album_thumb" => Ok(Self::AlbumThumb),
            "artist_thumb" => Ok(Self::ArtistThumb),
            "playlist_thumb" => Ok(Self::PlaylistThumb),
            "generic" => Ok(Self::Generic),
            _ => Err(()),
        }
    }
}

/// A resolved artwork request: canonical kind, clean name, clamped size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtworkRequest {
    pub kind: ArtworkKind,
    pub name: String,
    pub size: Option<u32>,
}

impl ArtworkRequest {
    /// Resolve a raw request. Returns `None` for unknown kinds (the caller
    /// answers not-found, never panics).
    ///
    /// `raw_name` may be a legacy combined segment (`"128/Abbey Road"`) for
    /// thumbnail kinds; the size prefix is split off and wins over
    /// `size_param`.
    pub fn resolve(kind: &str, raw_name: &str, size_param: Option<u32>) -> Option<Self> {
        let kind = ArtworkKind::from_str(kind).ok()?;
        let (mut name, mut size) = (raw_name.to_string(), size_param);

        if kind.is_thumb() {
            if let Some((first, rest)) = raw_name.split_once('/') {
                if !rest.is_empty() && !first.is_empty() && first.bytes().all(|b| b.is_ascii_digit())
                {
                    if let Ok(parsed) = first.parse::<u32>() {
                        size = Some(parsed);
                        name = rest.to_string();
                    }
                }
            }
            let requested = size.unwrap_or(DEFAULT_THUMB_SIZE);
            size = Some(requested.clamp(MIN_THUMB_SIZE, MAX_THUMB_SIZE));
        } else {
            size = None;
        }

        if name.is_empty() {
            return None;
        }

        Some(Self { kind, name, size })
    }

    /// Filesystem-safe rendition of the name component. Percent-encoding
    /// covers `/`, `..` and reserved characters, so the slug can never
    /// escape its bucket directory.
    pub fn slug(&self) -> String {
        urlencoding::encode(&self.name).into_owned()
    }

    /// Logical cache key within the kind; thumbnails fold the size in so
    /// different sizes do not collide.
    pub fn cache_key(&self) -> String {
        match self.size {
            Some(size) => format!("{}x/{}", size, self.name),
            None => self.name.clone(),
        }
    }

    /// Key for the in-memory tier, unique across kinds.
    pub fn memory_key(&self) -> String {
        format!("{}/{}", self.kind.dir_name(), self.cache_key())
    }
}
