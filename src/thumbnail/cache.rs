//! LRU cache for rendered thumbnails

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use log::warn;
use lru::LruCache;

use super::types::{Bitmap, ThumbSize};

/// Cache fingerprint for a rendered thumbnail.
///
/// Keyed by path plus file metadata so that an overwritten file misses the
/// cache. Two byte-identical files at different paths are cached
/// independently.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    /// Source file path
    pub path: PathBuf,
    /// Modification time, seconds since the epoch
    pub mtime_secs: u64,
    /// File length in bytes
    pub file_len: u64,
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
}

impl ThumbnailKey {
    /// Build a key from the file's current metadata
    pub fn probe(path: &Path, target: ThumbSize) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime_secs = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());

        Ok(Self {
            path: path.to_path_buf(),
            mtime_secs,
            file_len: meta.len(),
            width: target.width,
            height: target.height,
        })
    }
}

/// Fixed-capacity LRU cache mapping fingerprints to rendered bitmaps.
///
/// Entries are handed out as `Arc<Bitmap>` immutable views. Eviction is
/// automatic; there is no explicit remove.
pub struct ThumbnailCache {
    cache: LruCache<ThumbnailKey, Arc<Bitmap>>,
    capacity: usize,
}

/// Cache handle shared between the coordinator, its workers and the
/// presentation layer. A plain mutex is enough: the coordinator serializes
/// work, so contention is limited to presentation-side reads.
pub type SharedCache = Arc<Mutex<ThumbnailCache>>;

impl ThumbnailCache {
    /// Create a cache with the given capacity (clamped to at least 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or_else(|| NonZeroUsize::new(1).expect("1 is non-zero")),
            ),
            capacity,
        }
    }

    /// Create a shared, mutex-guarded cache
    #[must_use]
    pub fn shared(capacity: usize) -> SharedCache {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Look up an entry, promoting it in the LRU order on hit
    #[must_use]
    pub fn get(&mut self, key: &ThumbnailKey) -> Option<Arc<Bitmap>> {
        self.cache.get(key).cloned()
    }

    /// Check for a key without promoting it
    #[must_use]
    pub fn contains(&self, key: &ThumbnailKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a rendered bitmap, evicting the least-recently-used entry if
    /// the cache is full. Returns the shared handle to the inserted bitmap.
    pub fn insert(&mut self, key: ThumbnailKey, bitmap: Bitmap) -> Arc<Bitmap> {
        let arc = Arc::new(bitmap);
        self.cache.put(key, arc.clone());
        self.check_invariant();
        arc
    }

    /// Clear all cached thumbnails
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Number of cached thumbnails
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Cache capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    // Size must never exceed capacity. A violation cannot happen with a
    // single writer, so if one is ever observed the cache resets itself
    // instead of propagating corrupt state.
    fn check_invariant(&mut self) {
        if self.cache.len() > self.capacity {
            warn!(
                "thumbnail cache invariant violated ({} entries, capacity {}), resetting",
                self.cache.len(),
                self.capacity
            );
            self.cache.clear();
        }
    }
}
