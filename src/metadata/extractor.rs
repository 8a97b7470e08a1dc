//! Builds [`ImageMetadata`] from a backend handle.
//!
//! Only width, height and pixel type are mandatory. Descriptive fields the
//! backend does not report directly are looked up in its raw metadata tree
//! at a few well-known key paths, and left unset when absent.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde_json::Value;
use tracing::debug;

use super::tree;
use super::{
    AssociatedInfo, AssociatedMetadata, ChannelColor, ChannelInfo, ImageMetadata, ObjectiveInfo,
    PhysicalSize,
};
use crate::error::ParseError;
use crate::format::{
    AssociatedImages, AssociatedKind, BackendHandle, ChannelOrder, NativeChannel, NativeGeometry,
};

// Raw metadata fallbacks, tried in order. Lengths are micrometers.
const PHYSICAL_SIZE_X_KEYS: &[&str] = &[
    "PhysicalSizeX",
    "Image.Pixels.PhysicalSizeX",
    "openslide.mpp-x",
    "aperio.MPP",
];
const PHYSICAL_SIZE_Y_KEYS: &[&str] = &[
    "PhysicalSizeY",
    "Image.Pixels.PhysicalSizeY",
    "openslide.mpp-y",
    "aperio.MPP",
];
const PHYSICAL_SIZE_Z_KEYS: &[&str] = &["PhysicalSizeZ", "Image.Pixels.PhysicalSizeZ"];
const NOMINAL_MAGNIFICATION_KEYS: &[&str] = &[
    "NominalMagnification",
    "Instrument.Objective.NominalMagnification",
    "openslide.objective-power",
    "aperio.AppMag",
];
const CALIBRATED_MAGNIFICATION_KEYS: &[&str] = &[
    "CalibratedMagnification",
    "Instrument.Objective.CalibratedMagnification",
];
const DATETIME_KEYS: &[&str] = &[
    "AcquisitionDate",
    "Information.Image.AcquisitionDateAndTime",
    "tiff.DateTime",
];
const DEVICE_MODEL_KEYS: &[&str] = &[
    "Instrument.Microscope.Model",
    "Information.Instrument.Microscopes.0.Name",
    "tiff.Model",
];

/// Build the canonical metadata of an opened image.
///
/// # Errors
///
/// Returns a [`ParseError`] when the backend cannot report its geometry, or
/// when width, height or pixel type is missing or zero.
pub fn extract_metadata(
    handle: &dyn BackendHandle,
    format: &str,
    order: ChannelOrder,
) -> Result<ImageMetadata, ParseError> {
    let native = handle.native_geometry()?;
    let raw = handle.raw_metadata();
    let associated = handle.associated_images();
    build_metadata(native, raw.as_ref(), &associated, format, order)
}

fn build_metadata(
    native: NativeGeometry,
    raw: Option<&Value>,
    associated: &AssociatedImages,
    format: &str,
    order: ChannelOrder,
) -> Result<ImageMetadata, ParseError> {
    let width = positive(native.width, "width")?;
    let height = positive(native.height, "height")?;
    let pixel_type = native
        .pixel_type
        .ok_or(ParseError::MissingField("pixel_type"))?;

    let n_concrete_channels = native.n_concrete_channels.max(1);
    let n_samples = native.n_samples.max(1);
    let significant_bits = native
        .significant_bits
        .filter(|bits| (1..=pixel_type.bits()).contains(bits))
        .unwrap_or(pixel_type.bits());

    let channels = build_channels(&native.channels, n_concrete_channels, n_samples, order);

    let physical_x = physical_size(native.physical_size_x, raw, PHYSICAL_SIZE_X_KEYS);
    let physical_y = physical_size(native.physical_size_y, raw, PHYSICAL_SIZE_Y_KEYS);
    let physical_z = physical_size(native.physical_size_z, raw, PHYSICAL_SIZE_Z_KEYS);

    let calibrated = native
        .calibrated_magnification
        .or_else(|| raw_f64(raw, CALIBRATED_MAGNIFICATION_KEYS))
        .filter(|m| *m > 0.0);
    let nominal = native
        .nominal_magnification
        .or_else(|| raw_f64(raw, NOMINAL_MAGNIFICATION_KEYS))
        .filter(|m| *m > 0.0)
        .or(calibrated);

    let acquisition_datetime = native
        .acquisition_datetime
        .or_else(|| raw_str(raw, DATETIME_KEYS))
        .and_then(|value| {
            let parsed = parse_datetime(&value);
            if parsed.is_none() {
                debug!("Ignoring unparseable acquisition date: {}", value);
            }
            parsed
        });

    let microscope_model = native
        .device_model
        .or_else(|| raw_str(raw, DEVICE_MODEL_KEYS))
        .filter(|model| !model.trim().is_empty());

    Ok(ImageMetadata {
        format: format.to_string(),
        width,
        height,
        n_concrete_channels,
        n_samples,
        significant_bits,
        pixel_type,
        depth: native.depth.max(1),
        duration: native.duration.max(1),
        frame_rate: native.frame_rate.filter(|rate| *rate > 0.0),
        physical_size_x: physical_x,
        physical_size_y: physical_y,
        physical_size_z: physical_z,
        channels,
        associated: associated_metadata(associated),
        acquisition_datetime,
        objective: ObjectiveInfo {
            nominal_magnification: nominal,
            calibrated_magnification: calibrated,
        },
        microscope_model,
    })
}

fn positive(value: Option<u32>, field: &'static str) -> Result<u32, ParseError> {
    match value {
        None => Err(ParseError::MissingField(field)),
        Some(0) => Err(ParseError::InvalidValue {
            field,
            message: "must be positive".to_string(),
        }),
        Some(v) => Ok(v),
    }
}

// =============================================================================
// Channels
// =============================================================================

/// Name and colour every raster channel.
///
/// Unnamed channels follow the backend's component order: a lone
/// single-sample channel is `L`, 2-3 single-sample channels take the order's
/// letters by index, and 3-sample channels are named after the order.
fn build_channels(
    native: &[NativeChannel],
    n_concrete_channels: usize,
    n_samples: usize,
    order: ChannelOrder,
) -> Vec<ChannelInfo> {
    let letters = order.letters();
    let unnamed = NativeChannel::default();
    let mut channels = Vec::with_capacity(n_concrete_channels * n_samples);

    for cc in 0..n_concrete_channels {
        let source = native.get(cc).unwrap_or(&unnamed);
        let names: Vec<Option<String>> = match &source.name {
            Some(name) => vec![Some(name.clone()); n_samples],
            None if n_samples == 1 && n_concrete_channels == 1 => vec![Some("L".to_string())],
            None if n_samples == 1 && n_concrete_channels <= 3 => {
                vec![Some(letters[cc].to_string())]
            }
            None if n_samples == 3 => letters.iter().map(|l| Some(l.to_string())).collect(),
            None => vec![None; n_samples],
        };

        for (s, name) in names.into_iter().enumerate() {
            let color = source
                .color
                .as_deref()
                .and_then(ChannelColor::parse)
                .or_else(|| name.as_deref().and_then(ChannelColor::parse))
                .or_else(|| indexed_color(cc, n_concrete_channels, n_samples));
            channels.push(ChannelInfo {
                index: cc * n_samples + s,
                name,
                color,
                emission_wavelength: source.emission_wavelength,
                excitation_wavelength: source.excitation_wavelength,
            });
        }
    }
    channels
}

/// Red, green, blue by index for 2-3 single-sample channels.
fn indexed_color(cc: usize, n_concrete_channels: usize, n_samples: usize) -> Option<ChannelColor> {
    if n_samples == 1 && (2..=3).contains(&n_concrete_channels) {
        [ChannelColor::RED, ChannelColor::GREEN, ChannelColor::BLUE]
            .get(cc)
            .copied()
    } else {
        None
    }
}

// =============================================================================
// Optional Fields
// =============================================================================

fn physical_size(
    native: Option<PhysicalSize>,
    raw: Option<&Value>,
    keys: &[&str],
) -> Option<PhysicalSize> {
    native
        .or_else(|| raw_f64(raw, keys).map(PhysicalSize::micrometers))
        .filter(|size| size.value.is_finite() && size.value > 0.0)
}

fn raw_f64(raw: Option<&Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| tree::lookup_f64(raw?, key))
}

fn raw_str(raw: Option<&Value>, keys: &[&str]) -> Option<String> {
    tree::first_of(raw?, keys).and_then(tree::as_string)
}

fn associated_metadata(images: &AssociatedImages) -> AssociatedMetadata {
    let info = |kind: AssociatedKind| {
        images.get(kind).map(|image| AssociatedInfo {
            width: image.width(),
            height: image.height(),
            n_channels: image.n_components(),
        })
    };
    AssociatedMetadata {
        thumbnail: info(AssociatedKind::Thumbnail),
        label: info(AssociatedKind::Label),
        macro_image: info(AssociatedKind::Macro),
        overview: info(AssociatedKind::Overview),
    }
}

/// Parse an acquisition timestamp.
///
/// Accepts RFC 3339, ISO 8601 without offset and the TIFF
/// `YYYY:MM:DD HH:MM:SS` form; naive timestamps are taken as UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y:%m:%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}
