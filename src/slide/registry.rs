//! Handle cache for managing image lifecycle.
//!
//! The cache provides:
//! - Memoized handles keyed by canonical absolute path
//! - Single-flight opens: concurrent first requests for one path share a
//!   single backend `open()`
//! - Optional negative caching ("silent fail") of open failures
//! - LRU eviction that never drops a handle a caller still holds
//!
//! # Example
//!
//! ```no_run
//! use wsi_window::format::FormatRegistry;
//! use wsi_window::slide::HandleCache;
//!
//! let cache = HandleCache::new(FormatRegistry::with_defaults(), 64);
//!
//! // Opens on first access, returns the cached handle afterwards
//! let handle = cache.get_or_open("slides/sample.png".as_ref(), false)?;
//! println!("{} levels", handle.pyramid()?.n_levels());
//! # Ok::<(), wsi_window::ImageError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::{debug, info, warn};

use crate::error::OpenError;
use crate::format::FormatRegistry;

use super::handle::ImageHandle;

// =============================================================================
// Configuration
// =============================================================================

/// Default capacity for the handle cache (number of images).
pub const DEFAULT_HANDLE_CACHE_CAPACITY: usize = 100;

type OpenResult = Result<Arc<ImageHandle>, OpenError>;

// =============================================================================
// Cache State
// =============================================================================

#[derive(Clone)]
enum CacheEntry {
    Ready(Arc<ImageHandle>),

    /// A silent-fail open failed; never retried
    Unavailable,
}

impl CacheEntry {
    /// Whether a caller outside the cache holds this entry.
    fn in_use(&self) -> bool {
        match self {
            CacheEntry::Ready(handle) => Arc::strong_count(handle) > 1,
            CacheEntry::Unavailable => false,
        }
    }
}

/// State for an in-flight open operation.
struct InFlight {
    /// Result of the open operation (set when complete)
    result: Mutex<Option<OpenResult>>,

    /// Signalled once `result` is set
    ready: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) -> OpenResult {
        let mut guard = lock(&self.result);
        loop {
            if let Some(result) = guard.as_ref() {
                return result.clone();
            }
            guard = self
                .ready
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn finish(&self, result: OpenResult) {
        *lock(&self.result) = Some(result);
        self.ready.notify_all();
    }
}

struct CacheState {
    /// Unbounded; capacity is enforced by `evict_excess` so that in-use
    /// handles can be skipped
    entries: LruCache<PathBuf, CacheEntry>,

    /// In-flight opens for the single-flight pattern
    in_flight: HashMap<PathBuf, Arc<InFlight>>,
}

enum Role {
    /// This caller opens the image and publishes the result
    Leader(Arc<InFlight>),

    /// This caller waits for the leader's result
    Follower(Arc<InFlight>),
}

/// Resets the in-flight slot if the leader unwinds before finishing.
struct LeaderGuard<'a> {
    cache: &'a HandleCache,
    key: &'a Path,
    flight: Arc<InFlight>,
    finished: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            lock(&self.cache.state).in_flight.remove(self.key);
            self.flight.finish(Err(OpenError::Io(format!(
                "open of {} aborted",
                self.key.display()
            ))));
        }
    }
}

// =============================================================================
// HandleCache
// =============================================================================

/// Process-wide cache of opened images.
///
/// The cache:
/// - Opens images on demand through a [`FormatRegistry`]
/// - Returns the same [`ImageHandle`] for every path spelling of one file
/// - Runs at most one open per path at a time; concurrent callers block
///   until the first one resolves and share its result
/// - Evicts least recently used handles beyond its capacity, skipping those
///   still referenced elsewhere
pub struct HandleCache {
    formats: FormatRegistry,
    capacity: NonZeroUsize,
    state: Mutex<CacheState>,
}

impl HandleCache {
    /// Create a cache holding up to `capacity` images (at least one).
    pub fn new(formats: FormatRegistry, capacity: usize) -> Self {
        Self {
            formats,
            capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                in_flight: HashMap::new(),
            }),
        }
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Get an image, opening it if not already cached.
    ///
    /// Metadata is extracted as part of the open. With `silent_fail`, an
    /// open or metadata failure is logged and memoized: this and every later
    /// call for the path return [`OpenError::Unavailable`] without touching
    /// the file again. Without it, the failure is returned
    /// and the next call retries.
    pub fn get_or_open(&self, path: &Path, silent_fail: bool) -> OpenResult {
        let key = canonical_key(path)?;

        let flight = {
            let mut state = lock(&self.state);

            match state.entries.get(&key) {
                Some(CacheEntry::Ready(handle)) => {
                    debug!("Handle cache hit: {}", key.display());
                    return Ok(handle.clone());
                }
                Some(CacheEntry::Unavailable) => {
                    return Err(OpenError::Unavailable {
                        path: key.display().to_string(),
                    });
                }
                None => {}
            }

            match state.in_flight.get(&key) {
                // Another thread is opening this image
                Some(flight) => Role::Follower(flight.clone()),
                None => {
                    let flight = Arc::new(InFlight::new());
                    state.in_flight.insert(key.clone(), flight.clone());
                    Role::Leader(flight)
                }
            }
        };

        match flight {
            Role::Follower(flight) => {
                debug!("Waiting for in-flight open of {}", key.display());
                flight.wait()
            }
            Role::Leader(flight) => self.lead_open(&key, flight, silent_fail),
        }
    }

    fn lead_open(&self, key: &Path, flight: Arc<InFlight>, silent_fail: bool) -> OpenResult {
        let mut guard = LeaderGuard {
            cache: self,
            key,
            flight: flight.clone(),
            finished: false,
        };

        debug!("Handle cache miss: {}", key.display());
        let result = self.open_uncached(key);

        let result = {
            let mut state = lock(&self.state);
            state.in_flight.remove(key);
            let result = match result {
                Ok(handle) => {
                    state
                        .entries
                        .put(key.to_path_buf(), CacheEntry::Ready(handle.clone()));
                    Ok(handle)
                }
                Err(err) if silent_fail => {
                    warn!("Marking {} unavailable: {}", key.display(), err);
                    state
                        .entries
                        .put(key.to_path_buf(), CacheEntry::Unavailable);
                    Err(OpenError::Unavailable {
                        path: key.display().to_string(),
                    })
                }
                Err(err) => Err(err),
            };
            self.evict_excess(&mut state);
            result
        };

        flight.finish(result.clone());
        guard.finished = true;
        result
    }

    /// Open `key` and extract its metadata before the handle is shared, so
    /// images without usable geometry fail here rather than on first read.
    fn open_uncached(&self, key: &Path) -> OpenResult {
        let (backend, inner) = self.formats.open(key)?;
        let handle = ImageHandle::new(key.to_path_buf(), backend.as_ref(), inner);
        handle.metadata().map_err(|source| OpenError::Metadata {
            path: key.display().to_string(),
            source,
        })?;
        info!("Opened {} as {}", key.display(), backend.name());
        Ok(Arc::new(handle))
    }

    /// Drop least recently used entries until the cache fits its capacity.
    ///
    /// Entries referenced outside the cache are skipped; if all remaining
    /// entries are in use the cache stays over capacity for now.
    fn evict_excess(&self, state: &mut CacheState) {
        while state.entries.len() > self.capacity.get() {
            let victim = state
                .entries
                .iter()
                .rev()
                .find(|(_, entry)| !entry.in_use())
                .map(|(key, _)| key.clone());

            match victim {
                Some(key) => {
                    state.entries.pop(&key);
                    debug!("Evicted {} from handle cache", key.display());
                }
                None => break,
            }
        }
    }

    /// Remove an image from the cache.
    ///
    /// Also clears an "unavailable" memo so the next access retries.
    pub fn invalidate(&self, path: &Path) -> bool {
        let Ok(key) = canonical_key(path) else {
            return false;
        };
        lock(&self.state).entries.pop(&key).is_some()
    }

    /// Clear all cached images.
    pub fn clear(&self) {
        lock(&self.state).entries.clear();
    }

    /// Get the number of cached entries, "unavailable" memos included.
    pub fn cached_count(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        canonical_key(path)
            .map(|key| lock(&self.state).entries.contains(&key))
            .unwrap_or(false)
    }
}

impl fmt::Debug for HandleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleCache")
            .field("formats", &self.formats)
            .field("capacity", &self.capacity)
            .field("cached", &self.cached_count())
            .finish()
    }
}

/// Cache key of a path: canonical when the file exists, absolute otherwise.
pub fn canonical_key(path: &Path) -> Result<PathBuf, OpenError> {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .map_err(|e| OpenError::Io(format!("{}: {}", path.display(), e)))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Tests
// =============================================================================
