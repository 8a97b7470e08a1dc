//! Image service tying the handle cache to the windowed reader.
//!
//! The ImageService is the main entry point for callers. It owns:
//! - The handle cache (and through it the format registry)
//! - The windowed reader and its flatten background
//! - The silent-fail policy applied to opens
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ImageService                            │
//! │  open_or_get ──► HandleCache ──► FormatRegistry ──► backend     │
//! │  read_window ──► WindowedReader ──► ImageHandle                 │
//! │  *_async     ──► spawn_blocking(same call)                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All decoding is blocking. The async variants move the call onto tokio's
//! blocking pool so they can be awaited from a runtime without stalling it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::ReaderConfig;
use crate::error::{ImageError, ReadError};
use crate::format::{FormatRegistry, PlainImageBackend};
use crate::geometry::Region;
use crate::metadata::{tree, ImageMetadata};
use crate::pyramid::Pyramid;
use crate::raster::Raster;
use crate::slide::{HandleCache, ImageHandle, PlaneSelection, WindowedReader};

// =============================================================================
// Image Service
// =============================================================================

/// Service for opening images and reading windows from them.
///
/// Cloning is cheap; clones share one handle cache.
///
/// # Example
///
/// ```no_run
/// use wsi_window::config::ReaderConfig;
/// use wsi_window::geometry::Region;
/// use wsi_window::service::ImageService;
/// use wsi_window::slide::PlaneSelection;
///
/// let service = ImageService::new(&ReaderConfig::default());
/// let handle = service.open_or_get("slides/sample.png")?;
///
/// let metadata = service.get_metadata(&handle)?;
/// let region = Region::full(metadata.width, metadata.height);
/// let overview = service.read_window(&handle, &region, 512, 512, &PlaneSelection::all())?;
/// println!("{}x{}", overview.width(), overview.height());
/// # Ok::<(), wsi_window::ImageError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ImageService {
    cache: Arc<HandleCache>,
    reader: WindowedReader,
    silent_fail: bool,
}

impl ImageService {
    /// Create a service with the built-in backends.
    pub fn new(config: &ReaderConfig) -> Self {
        let formats =
            FormatRegistry::new().with_backend(PlainImageBackend::new().with_tile_size(config.tile_size));
        Self::with_formats(formats, config)
    }

    /// Create a service with a custom set of backends.
    pub fn with_formats(formats: FormatRegistry, config: &ReaderConfig) -> Self {
        Self {
            cache: Arc::new(HandleCache::new(formats, config.cache_capacity)),
            reader: WindowedReader::new().with_background(config.background),
            silent_fail: config.silent_fail,
        }
    }

    pub fn cache(&self) -> &HandleCache {
        &self.cache
    }

    pub fn reader(&self) -> &WindowedReader {
        &self.reader
    }

    /// Get the handle for `path`, opening the image on first access.
    pub fn open_or_get(&self, path: impl AsRef<Path>) -> Result<Arc<ImageHandle>, ImageError> {
        Ok(self.cache.get_or_open(path.as_ref(), self.silent_fail)?)
    }

    pub fn get_metadata(&self, handle: &ImageHandle) -> Result<Arc<ImageMetadata>, ImageError> {
        Ok(handle.metadata()?)
    }

    pub fn get_pyramid(&self, handle: &ImageHandle) -> Result<Arc<Pyramid>, ImageError> {
        handle.pyramid()
    }

    /// Vendor metadata flattened to dotted keys, each prefixed with
    /// `namespace` when it is non-empty.
    pub fn get_raw_metadata(&self, handle: &ImageHandle, namespace: &str) -> BTreeMap<String, String> {
        handle
            .raw_metadata()
            .map(|raw| tree::flatten(&raw, namespace))
            .unwrap_or_default()
    }

    pub fn read_window(
        &self,
        handle: &ImageHandle,
        region: &Region,
        out_width: u32,
        out_height: u32,
        selection: &PlaneSelection,
    ) -> Result<Raster, ImageError> {
        self.reader
            .read_window(handle, region, out_width, out_height, selection)
    }

    pub fn read_tile(
        &self,
        handle: &ImageHandle,
        level: usize,
        tx: u32,
        ty: u32,
        selection: &PlaneSelection,
    ) -> Result<Raster, ImageError> {
        self.reader.read_tile(handle, level, tx, ty, selection)
    }

    pub fn read_thumbnail(
        &self,
        handle: &ImageHandle,
        out_width: u32,
        out_height: u32,
    ) -> Result<Raster, ImageError> {
        self.reader.read_thumbnail(handle, out_width, out_height)
    }

    pub fn read_label(&self, handle: &ImageHandle) -> Result<Option<Raster>, ImageError> {
        self.reader.read_label(handle)
    }

    pub fn read_macro(&self, handle: &ImageHandle) -> Result<Option<Raster>, ImageError> {
        self.reader.read_macro(handle)
    }

    /// Drop the cached handle (or unavailable memo) for `path`.
    ///
    /// Callers still holding the handle keep a working reference.
    pub fn evict(&self, path: impl AsRef<Path>) -> bool {
        let evicted = self.cache.invalidate(path.as_ref());
        if evicted {
            debug!("Evicted {}", path.as_ref().display());
        }
        evicted
    }

    // =========================================================================
    // Async Variants
    // =========================================================================

    pub async fn open_or_get_async(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<Arc<ImageHandle>, ImageError> {
        let path = path.into();
        self.blocking(move |service| service.open_or_get(&path))
            .await
    }

    pub async fn get_metadata_async(
        &self,
        handle: Arc<ImageHandle>,
    ) -> Result<Arc<ImageMetadata>, ImageError> {
        self.blocking(move |service| service.get_metadata(&handle))
            .await
    }

    pub async fn read_window_async(
        &self,
        handle: Arc<ImageHandle>,
        region: Region,
        out_width: u32,
        out_height: u32,
        selection: PlaneSelection,
    ) -> Result<Raster, ImageError> {
        self.blocking(move |service| {
            service.read_window(&handle, &region, out_width, out_height, &selection)
        })
        .await
    }

    pub async fn read_tile_async(
        &self,
        handle: Arc<ImageHandle>,
        level: usize,
        tx: u32,
        ty: u32,
        selection: PlaneSelection,
    ) -> Result<Raster, ImageError> {
        self.blocking(move |service| service.read_tile(&handle, level, tx, ty, &selection))
            .await
    }

    pub async fn read_thumbnail_async(
        &self,
        handle: Arc<ImageHandle>,
        out_width: u32,
        out_height: u32,
    ) -> Result<Raster, ImageError> {
        self.blocking(move |service| service.read_thumbnail(&handle, out_width, out_height))
            .await
    }

    /// Run `f` on the blocking pool with a clone of this service.
    async fn blocking<T, F>(&self, f: F) -> Result<T, ImageError>
    where
        T: Send + 'static,
        F: FnOnce(ImageService) -> Result<T, ImageError> + Send + 'static,
    {
        let service = self.clone();
        tokio::task::spawn_blocking(move || f(service))
            .await
            .map_err(|e| ReadError::Task(e.to_string()))?
    }
}

// =============================================================================
// Tests
// =============================================================================
