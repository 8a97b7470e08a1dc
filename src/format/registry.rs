//! Ordered registry of decoder backends.
//!
//! The registry holds every backend the process can use, in priority order.
//! Detection walks the list and returns the first backend whose
//! [`matches`](DecoderBackend::matches) accepts the path, so more specific
//! formats must be registered before generic ones (a vendor TIFF flavour
//! before a plain TIFF reader).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::backend::{BackendHandle, DecoderBackend};
use super::detect::resolve_root;
use super::plain::PlainImageBackend;
use crate::error::OpenError;

/// Priority-ordered list of backends.
#[derive(Clone, Default)]
pub struct FormatRegistry {
    backends: Vec<Arc<dyn DecoderBackend>>,
}

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the backends built into this crate.
    pub fn with_defaults() -> Self {
        Self::new().with_backend(PlainImageBackend::new())
    }

    /// Append a backend with the lowest priority so far.
    pub fn with_backend(mut self, backend: impl DecoderBackend + 'static) -> Self {
        self.register(Arc::new(backend));
        self
    }

    pub fn register(&mut self, backend: Arc<dyn DecoderBackend>) {
        debug!("Registering decoder backend '{}'", backend.name());
        self.backends.push(backend);
    }

    pub fn backends(&self) -> &[Arc<dyn DecoderBackend>] {
        &self.backends
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// First backend recognizing `path`.
    pub fn detect(&self, path: &Path) -> Option<&Arc<dyn DecoderBackend>> {
        self.backends.iter().find(|backend| backend.matches(path))
    }

    /// Detect and open `path`.
    ///
    /// A directory no backend claims is resolved with [`resolve_root`] and
    /// its root file opened instead.
    ///
    /// # Errors
    ///
    /// - [`OpenError::NotFound`] when nothing exists at `path`
    /// - [`OpenError::UnsupportedFormat`] when no backend matches
    /// - whatever the matching backend's `open` reports
    pub fn open(
        &self,
        path: &Path,
    ) -> Result<(Arc<dyn DecoderBackend>, Box<dyn BackendHandle>), OpenError> {
        if !path.exists() {
            return Err(OpenError::NotFound {
                path: path.display().to_string(),
            });
        }

        let unsupported = || OpenError::UnsupportedFormat {
            path: path.display().to_string(),
        };

        let (backend, target) = match self.detect(path) {
            Some(backend) => (backend.clone(), path.to_path_buf()),
            None => {
                let root = resolve_root(path).ok_or_else(unsupported)?;
                let backend = self.detect(&root).ok_or_else(unsupported)?.clone();
                debug!("Resolved {} to root file {}", path.display(), root.display());
                (backend, root)
            }
        };

        debug!("Opening {} with backend '{}'", target.display(), backend.name());
        let handle = backend.open(&target)?;
        Ok((backend, handle))
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
