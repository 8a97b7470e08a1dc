//! Opened image handle with lazily derived metadata and pyramid.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::{ImageError, ParseError};
use crate::format::{AssociatedImages, BackendHandle, ChannelOrder, DecoderBackend};
use crate::metadata::{extract_metadata, ImageMetadata};
use crate::pyramid::Pyramid;

/// An opened image as held by the handle cache.
///
/// Metadata and pyramid are derived on first use and memoized for the
/// lifetime of the handle, failures included.
pub struct ImageHandle {
    /// Canonical path the handle is cached under
    path: PathBuf,

    format: &'static str,
    channel_order: ChannelOrder,
    inner: Box<dyn BackendHandle>,

    metadata: OnceLock<Result<Arc<ImageMetadata>, ParseError>>,
    pyramid: OnceLock<Result<Arc<Pyramid>, ImageError>>,
}

impl ImageHandle {
    pub fn new(path: PathBuf, backend: &dyn DecoderBackend, inner: Box<dyn BackendHandle>) -> Self {
        Self {
            path,
            format: backend.name(),
            channel_order: backend.channel_order(),
            inner,
            metadata: OnceLock::new(),
            pyramid: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the backend that opened this image.
    pub fn format(&self) -> &'static str {
        self.format
    }

    /// The backend handle serving pixel reads.
    pub fn backend(&self) -> &dyn BackendHandle {
        self.inner.as_ref()
    }

    /// Canonical metadata, extracted once.
    pub fn metadata(&self) -> Result<Arc<ImageMetadata>, ParseError> {
        self.metadata
            .get_or_init(|| {
                debug!("Extracting metadata for {}", self.path.display());
                extract_metadata(self.inner.as_ref(), self.format, self.channel_order).map(Arc::new)
            })
            .clone()
    }

    /// Resolution pyramid, built once from the metadata and the backend's
    /// tile size.
    pub fn pyramid(&self) -> Result<Arc<Pyramid>, ImageError> {
        self.pyramid
            .get_or_init(|| {
                let metadata = self.metadata()?;
                let pyramid = Pyramid::build(
                    metadata.width,
                    metadata.height,
                    self.inner.tile_size(),
                )?;
                debug!(
                    "Built {}-level pyramid for {} ({}x{})",
                    pyramid.n_levels(),
                    self.path.display(),
                    metadata.width,
                    metadata.height
                );
                Ok(Arc::new(pyramid))
            })
            .clone()
    }

    pub fn associated_images(&self) -> AssociatedImages {
        self.inner.associated_images()
    }

    pub fn raw_metadata(&self) -> Option<serde_json::Value> {
        self.inner.raw_metadata()
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("path", &self.path)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}
