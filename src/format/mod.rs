//! Decoder backends and format detection.
//!
//! Pixel decoding is delegated to one [`DecoderBackend`] per file format.
//! The [`FormatRegistry`] picks the backend for a path; the backend opens a
//! [`BackendHandle`] that serves tier-relative region reads.
//!
//! # Format Detection
//!
//! Backends are tried in registration order and the first whose
//! [`matches`](DecoderBackend::matches) accepts the path wins. A directory
//! no backend claims is resolved to its root file first. Helpers in
//! [`detect`] sniff file signatures and multi-file directory layouts.
//!
//! Built-in backends:
//!
//! - **plain**: PNG, JPEG, TIFF and BMP decoded with the `image` crate

mod backend;
pub mod detect;
mod plain;
mod registry;

pub use backend::{
    AssociatedImage, AssociatedImages, AssociatedKind, BackendHandle, ChannelOrder,
    DecoderBackend, ExclusiveHandle, NativeChannel, NativeGeometry, RegionRequest, Serialized,
};
pub use detect::{find_root_file, is_tiff_header, resolve_root, sniff, Signature};
pub use plain::{raster_from_image, PlainImageBackend};
pub use registry::FormatRegistry;
