//! Image service integration tests.
//!
//! Tests verify:
//! - Metadata extraction from vendor metadata trees
//! - Channel naming for interleaved and BGR-ordered images
//! - Thumbnail, label and macro reads with their fallbacks
//! - The async service surface and error classification

use wsi_window::error::{ErrorClass, GeometryError};
use wsi_window::format::{ChannelOrder, FormatRegistry};
use wsi_window::geometry::Region;
use wsi_window::raster::ColorInterpretation;
use wsi_window::{ImageError, ImageService, PlaneSelection, ReaderConfig};

use super::test_utils::{
    stub_file, synthetic_value, vendor_metadata, FlatImage, StubBackend, StubSlide,
};

fn service_with(backend: StubBackend) -> ImageService {
    ImageService::with_formats(
        FormatRegistry::new().with_backend(backend),
        &ReaderConfig::default(),
    )
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_metadata_from_vendor_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "scan");
    let slide = StubSlide::new(46_000, 32_914)
        .with_raw(vendor_metadata())
        .with_thumbnail(FlatImage::new(1_024, 732, 200))
        .with_label(FlatImage::new(400, 380, 90));
    let service = service_with(StubBackend::new(slide));

    let handle = service.open_or_get(&path).unwrap();
    let metadata = service.get_metadata(&handle).unwrap();

    assert_eq!(metadata.format, "stub");
    assert_eq!((metadata.width, metadata.height), (46_000, 32_914));
    assert_eq!(metadata.physical_size_x.as_ref().unwrap().value, 0.2527);
    assert_eq!(metadata.physical_size_y.as_ref().unwrap().value, 0.2531);
    assert!(metadata.physical_size_z.is_none());
    assert_eq!(metadata.objective.nominal_magnification, Some(40.0));
    assert_eq!(metadata.microscope_model.as_deref(), Some("Aperio GT 450"));
    assert_eq!(
        metadata.acquisition_datetime.unwrap().to_rfc3339(),
        "2021-03-04T10:20:30+00:00"
    );

    let thumbnail = metadata.associated.thumbnail.unwrap();
    assert_eq!((thumbnail.width, thumbnail.height), (1_024, 732));
    assert!(metadata.associated.label.is_some());
    assert!(metadata.associated.macro_image.is_none());

    let json = serde_json::to_value(&*metadata).unwrap();
    assert_eq!(json["pixel_type"], "u8");
    assert_eq!(json["channels"][0]["name"], "R");
    assert_eq!(json["channels"][0]["color"], "#ff0000");
}

#[test]
fn test_raw_metadata_keeps_dotted_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "scan");
    let slide = StubSlide::new(1_000, 1_000).with_raw(vendor_metadata());
    let service = service_with(StubBackend::new(slide));
    let handle = service.open_or_get(&path).unwrap();

    let raw = service.get_raw_metadata(&handle, "");
    assert_eq!(raw.get("openslide.mpp-x").map(String::as_str), Some("0.2527"));
    assert_eq!(raw.get("aperio.AppMag").map(String::as_str), Some("40"));
    assert_eq!(
        raw.get("Instrument.Microscope.Model").map(String::as_str),
        Some("Aperio GT 450")
    );

    let namespaced = service.get_raw_metadata(&handle, "vendor");
    assert!(namespaced.contains_key("vendor.tiff.DateTime"));
}

#[test]
fn test_bgr_samples_read_as_rgb() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "bgr");
    let backend = StubBackend::new(StubSlide::new(512, 512)).with_order(ChannelOrder::Bgr);
    let service = service_with(backend);
    let handle = service.open_or_get(&path).unwrap();

    let metadata = service.get_metadata(&handle).unwrap();
    let names: Vec<_> = (0..3).map(|c| metadata.channel_name(c)).collect();
    assert_eq!(names, vec![Some("B"), Some("G"), Some("R")]);

    let region = Region::new(0, 0, 8, 8);
    let stored = service
        .read_window(&handle, &region, 8, 8, &PlaneSelection::all())
        .unwrap();
    assert_eq!(stored.interpretation(), ColorInterpretation::Multiband);

    let rgb = PlaneSelection::all().with_channels(vec![2, 1, 0]);
    let raster = service.read_window(&handle, &region, 8, 8, &rgb).unwrap();
    assert_eq!(raster.interpretation(), ColorInterpretation::Rgb);
    assert_eq!(raster.sample(1, 1, 0), Some(synthetic_value(1, 1, 2, 0, 0) as f64));
}

#[test]
fn test_named_channels_and_planes() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "fluo");
    let slide = StubSlide::new(800, 800)
        .with_channels(3, 1)
        .with_channel_names(&["DAPI", "FITC", "Cy5"])
        .with_depth(4);
    let backend = StubBackend::new(slide);
    let counters = backend.counters();
    let service = service_with(backend);
    let handle = service.open_or_get(&path).unwrap();

    let metadata = service.get_metadata(&handle).unwrap();
    assert_eq!(metadata.channel_name(2), Some("Cy5"));
    assert_eq!(metadata.depth, 4);

    let selection = PlaneSelection::all().with_channels(vec![1]).at_z(3);
    service
        .read_window(&handle, &Region::new(0, 0, 32, 32), 32, 32, &selection)
        .unwrap();
    let request = counters.requests()[0];
    assert_eq!((request.concrete_channel, request.z), (1, 3));

    let err = service
        .read_window(
            &handle,
            &Region::new(0, 0, 32, 32),
            32,
            32,
            &PlaneSelection::all().at_z(4),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ImageError::Geometry(GeometryError::InvalidPlane { axis: "z", index: 4, max: 4 })
    ));
    assert_eq!(err.status_class(), ErrorClass::Client);
}

// =============================================================================
// Associated Images
// =============================================================================

#[test]
fn test_associated_images() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "scan");
    let slide = StubSlide::new(4_000, 3_000)
        .with_thumbnail(FlatImage::new(400, 300, 10))
        .with_label(FlatImage::new(100, 90, 20))
        .with_overview(FlatImage::new(800, 300, 30));
    let backend = StubBackend::new(slide);
    let counters = backend.counters();
    let service = service_with(backend);
    let handle = service.open_or_get(&path).unwrap();

    let thumbnail = service.read_thumbnail(&handle, 200, 200).unwrap();
    assert_eq!((thumbnail.width(), thumbnail.height()), (400, 300));
    assert_eq!(thumbnail.sample(0, 0, 0), Some(10.0));

    let label = service.read_label(&handle).unwrap().unwrap();
    assert_eq!(label.sample(0, 0, 0), Some(20.0));

    // No macro image: the overview stands in
    let macro_image = service.read_macro(&handle).unwrap().unwrap();
    assert_eq!((macro_image.width(), macro_image.height()), (800, 300));
    assert_eq!(macro_image.interpretation(), ColorInterpretation::Rgb);

    assert_eq!(counters.read_count(), 0);
}

#[test]
fn test_thumbnail_falls_back_to_pyramid() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "bare");
    let backend = StubBackend::new(StubSlide::new(4_000, 3_000));
    let counters = backend.counters();
    let service = service_with(backend);
    let handle = service.open_or_get(&path).unwrap();

    let thumbnail = service.read_thumbnail(&handle, 500, 500).unwrap();
    // 4000 / 500 = 8 selects level 3 (500x375)
    assert_eq!(counters.requests()[0].level, 3);
    assert_eq!((thumbnail.width(), thumbnail.height()), (500, 375));
    assert!(service.read_label(&handle).unwrap().is_none());
    assert!(service.read_macro(&handle).unwrap().is_none());

    assert!(matches!(
        service.read_thumbnail(&handle, 0, 10),
        Err(ImageError::Geometry(GeometryError::InvalidOutputSize { .. }))
    ));
}

// =============================================================================
// Async Surface
// =============================================================================

#[tokio::test]
async fn test_async_window_and_tile() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "slide");
    let backend = StubBackend::new(StubSlide::new(10_000, 7_000));
    let counters = backend.counters();
    let service = service_with(backend);

    let handle = service.open_or_get_async(path.clone()).await.unwrap();
    let metadata = service.get_metadata_async(handle.clone()).await.unwrap();
    assert_eq!(metadata.width, 10_000);

    let tile = service
        .read_tile_async(handle.clone(), 2, 3, 1, PlaneSelection::all())
        .await
        .unwrap();
    let rect = service
        .get_pyramid(&handle)
        .unwrap()
        .tile(2, 3, 1)
        .unwrap()
        .full_resolution_region();
    let window = service
        .read_window_async(handle.clone(), rect, 256, 256, PlaneSelection::all())
        .await
        .unwrap();
    assert_eq!(tile, window);
    assert_eq!(counters.read_count(), 2);

    let thumbnail = service
        .read_thumbnail_async(handle.clone(), 300, 300)
        .await
        .unwrap();
    assert_eq!((thumbnail.width(), thumbnail.height()), (313, 219));

    let err = service
        .read_window_async(
            handle,
            Region::new(10_000, 0, 10, 10),
            10,
            10,
            PlaneSelection::all(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ImageError::Geometry(GeometryError::EmptyRegion { .. })
    ));
}
