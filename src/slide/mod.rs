//! Image handles, the handle cache and windowed reads.
//!
//! This module sits between the decoder backends and the callers that want
//! pixels:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              ImageService               │
//! └──────────┬─────────────────┬────────────┘
//!            │                 │
//!            ▼                 ▼
//! ┌────────────────────┐ ┌──────────────────────┐
//! │    HandleCache     │ │   WindowedReader     │
//! │ (single-flight,    │ │ (tier selection,     │
//! │  LRU, path keys)   │ │  band composition)   │
//! └─────────┬──────────┘ └──────────┬───────────┘
//!           │                       │
//!           ▼                       ▼
//! ┌─────────────────────────────────────────┐
//! │              ImageHandle                │
//! │  (backend handle + memoized metadata    │
//! │   and pyramid)                          │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          BackendHandle trait            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use wsi_window::format::FormatRegistry;
//! use wsi_window::geometry::Region;
//! use wsi_window::slide::{HandleCache, PlaneSelection, WindowedReader};
//!
//! let cache = HandleCache::new(FormatRegistry::with_defaults(), 16);
//! let handle = cache.get_or_open("scan.png".as_ref(), false)?;
//!
//! // A 2048x2048 region shown at 512x512 is read from level 2
//! let raster = WindowedReader::new().read_window(
//!     &handle,
//!     &Region::new(0, 0, 2048, 2048),
//!     512,
//!     512,
//!     &PlaneSelection::all(),
//! )?;
//! assert!(raster.width() <= 512);
//! # Ok::<(), wsi_window::ImageError>(())
//! ```

mod handle;
mod reader;
mod registry;

pub use handle::ImageHandle;
pub use reader::{PlaneSelection, WindowedReader};
pub use registry::{canonical_key, HandleCache, DEFAULT_HANDLE_CACHE_CAPACITY};
