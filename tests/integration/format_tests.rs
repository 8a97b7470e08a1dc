//! Format detection and plain image integration tests.
//!
//! Tests verify:
//! - Backends are tried in registration order, first match wins
//! - Files are recognized by content rather than extension
//! - PNG files of several layouts read through the whole pipeline
//! - Alpha is flattened against the configured background
//! - Windows and tiles encode to valid output files

use wsi_window::error::OpenError;
use wsi_window::format::{FormatRegistry, PlainImageBackend};
use wsi_window::geometry::Region;
use wsi_window::raster::{
    Background, ColorInterpretation, OutputFormat, PixelType, RasterEncoder,
};
use wsi_window::{ImageError, ImageService, PlaneSelection, ReaderConfig};

use super::test_utils::{
    stub_file, write_gray16_png, write_gray_png, write_rgb_png, write_rgba_png, StubBackend,
    StubSlide,
};

// =============================================================================
// Detection
// =============================================================================

#[test]
fn test_first_matching_backend_wins() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_file(dir.path(), "slide");
    let png = write_rgb_png(dir.path(), "photo.png", 32, 32);

    let registry = FormatRegistry::new()
        .with_backend(StubBackend::new(StubSlide::new(64, 64)))
        .with_backend(PlainImageBackend::new());
    assert_eq!(registry.names(), vec!["stub", "plain"]);
    assert_eq!(registry.detect(&stub).map(|b| b.name()), Some("stub"));
    assert_eq!(registry.detect(&png).map(|b| b.name()), Some("plain"));

    let service = ImageService::with_formats(registry, &ReaderConfig::default());
    assert_eq!(service.open_or_get(&stub).unwrap().format(), "stub");
    assert_eq!(service.open_or_get(&png).unwrap().format(), "plain");
}

#[test]
fn test_content_beats_extension() {
    let dir = tempfile::tempdir().unwrap();
    let png = write_rgb_png(dir.path(), "photo.png", 32, 32);
    let disguised = dir.path().join("photo.bin");
    std::fs::copy(&png, &disguised).unwrap();
    let fake = dir.path().join("fake.png");
    std::fs::write(&fake, b"definitely not a png").unwrap();

    let service = ImageService::new(&ReaderConfig::default());
    let handle = service.open_or_get(&disguised).unwrap();
    assert_eq!(service.get_metadata(&handle).unwrap().width, 32);

    assert!(matches!(
        service.open_or_get(&fake),
        Err(ImageError::Open(OpenError::UnsupportedFormat { .. }))
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let service = ImageService::new(&ReaderConfig::default());

    let err = service
        .open_or_get(dir.path().join("nowhere.png"))
        .unwrap_err();
    assert!(matches!(err, ImageError::Open(OpenError::NotFound { .. })));
}

#[test]
fn test_directory_opens_its_image() {
    let dir = tempfile::tempdir().unwrap();
    let upload = dir.path().join("upload");
    std::fs::create_dir(&upload).unwrap();
    std::fs::write(upload.join("README.txt"), b"scanner export").unwrap();
    write_rgb_png(&upload, "scan.png", 120, 80);

    let service = ImageService::new(&ReaderConfig::default());
    let handle = service.open_or_get(&upload).unwrap();
    assert_eq!(handle.format(), "plain");
    let metadata = service.get_metadata(&handle).unwrap();
    assert_eq!((metadata.width, metadata.height), (120, 80));

    let window = service
        .read_window(&handle, &Region::new(5, 6, 10, 10), 10, 10, &PlaneSelection::all())
        .unwrap();
    assert_eq!(window.sample(0, 0, 0), Some(5.0));

    // A second image makes the directory ambiguous
    let other = dir.path().join("pair");
    std::fs::create_dir(&other).unwrap();
    write_rgb_png(&other, "a.png", 8, 8);
    write_rgb_png(&other, "b.png", 8, 8);
    assert!(matches!(
        service.open_or_get(&other),
        Err(ImageError::Open(OpenError::UnsupportedFormat { .. }))
    ));
}

// =============================================================================
// Plain Images
// =============================================================================

#[test]
fn test_rgb_png_metadata_and_window() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rgb_png(dir.path(), "rgb.png", 1_000, 600);
    let service = ImageService::new(&ReaderConfig::default());
    let handle = service.open_or_get(&path).unwrap();

    let metadata = service.get_metadata(&handle).unwrap();
    assert_eq!(metadata.format, "plain");
    assert_eq!(metadata.pixel_type, PixelType::U8);
    assert_eq!(metadata.n_channels(), 3);
    let names: Vec<_> = (0..3).map(|c| metadata.channel_name(c)).collect();
    assert_eq!(names, vec![Some("R"), Some("G"), Some("B")]);

    let window = service
        .read_window(&handle, &Region::new(10, 20, 30, 40), 30, 40, &PlaneSelection::all())
        .unwrap();
    assert_eq!(window.interpretation(), ColorInterpretation::Rgb);
    assert_eq!(window.sample(0, 0, 0), Some(10.0));
    assert_eq!(window.sample(0, 0, 1), Some(20.0));
    assert_eq!(window.sample(0, 0, 2), Some(30.0));

    let green = PlaneSelection::all().with_channels(vec![1]);
    let band = service
        .read_window(&handle, &Region::new(10, 20, 30, 40), 30, 40, &green)
        .unwrap();
    assert_eq!(band.bands(), 1);
    assert_eq!(band.interpretation(), ColorInterpretation::Grayscale);
    assert_eq!(band.sample(3, 4, 0), Some(24.0));
}

#[test]
fn test_downsampled_window_of_plain_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gray_png(dir.path(), "gray.png", 1_024, 512);
    let service = ImageService::new(&ReaderConfig::default());
    let handle = service.open_or_get(&path).unwrap();

    let metadata = service.get_metadata(&handle).unwrap();
    assert_eq!(metadata.channel_name(0), Some("L"));

    let raster = service
        .read_window(&handle, &Region::full(1_024, 512), 256, 128, &PlaneSelection::all())
        .unwrap();
    assert_eq!((raster.width(), raster.height()), (256, 128));
    // Four columns x, x+1, x+2, x+3 average to x + 1.5
    let value = raster.sample(10, 10, 0).unwrap();
    assert!((value - 41.5).abs() <= 1.0, "got {}", value);
}

#[test]
fn test_rgba_png_is_flattened() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rgba_png(dir.path(), "rgba.png", 64, 64, 0);

    let black = ImageService::new(&ReaderConfig::default());
    let handle = black.open_or_get(&path).unwrap();
    assert_eq!(black.get_metadata(&handle).unwrap().n_channels(), 3);
    let raster = black
        .read_window(&handle, &Region::new(0, 0, 8, 8), 8, 8, &PlaneSelection::all())
        .unwrap();
    assert_eq!(raster.bands(), 3);
    assert!(!raster.has_alpha());
    assert_eq!(raster.sample(4, 4, 0), Some(0.0));

    let white = ImageService::new(&ReaderConfig::default().with_background(Background::White));
    let handle = white.open_or_get(&path).unwrap();
    let raster = white
        .read_window(&handle, &Region::new(0, 0, 8, 8), 8, 8, &PlaneSelection::all())
        .unwrap();
    assert_eq!(raster.sample(4, 4, 2), Some(255.0));
}

#[test]
fn test_sixteen_bit_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gray16_png(dir.path(), "deep.png", 300, 200);
    let service = ImageService::new(&ReaderConfig::default());
    let handle = service.open_or_get(&path).unwrap();

    let metadata = service.get_metadata(&handle).unwrap();
    assert_eq!(metadata.pixel_type, PixelType::U16);
    assert_eq!(metadata.significant_bits, 16);

    let raster = service
        .read_window(&handle, &Region::new(250, 150, 10, 10), 10, 10, &PlaneSelection::all())
        .unwrap();
    assert_eq!(raster.pixel_type(), PixelType::U16);
    assert_eq!(raster.sample(1, 2, 0), Some((251 * 100 + 152) as f64));
}

// =============================================================================
// Encoding
// =============================================================================

#[test]
fn test_tile_encodes_to_png_and_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rgb_png(dir.path(), "rgb.png", 600, 400);
    let service = ImageService::new(&ReaderConfig::default());
    let handle = service.open_or_get(&path).unwrap();

    let tile = service
        .read_tile(&handle, 0, 2, 1, &PlaneSelection::all())
        .unwrap();
    assert_eq!((tile.width(), tile.height()), (88, 144));

    let encoder = RasterEncoder::new().with_quality(90);
    let png = encoder.encode(&tile, OutputFormat::Png).unwrap();
    let decoded = image::load_from_memory(&png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (88, 144));

    let jpeg = encoder
        .encode_resized(&tile, OutputFormat::Jpeg, 44, 72)
        .unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (44, 72));
}
