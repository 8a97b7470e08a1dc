//! Handle cache integration tests.
//!
//! Tests verify:
//! - Concurrent first access opens an image exactly once
//! - Silent-fail memoizes failures, strict mode retries them
//! - Capacity eviction and explicit eviction through the service
//! - Non-reentrant backends are never entered concurrently

use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use wsi_window::error::{OpenError, ParseError};
use wsi_window::format::FormatRegistry;
use wsi_window::geometry::Region;
use wsi_window::{ImageError, ImageService, PlaneSelection, ReaderConfig};

use super::test_utils::{stub_file, ExclusiveBackend, StubBackend, StubSlide};

// =============================================================================
// Single-flight Opens
// =============================================================================

#[test]
fn test_parallel_threads_open_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "slide");
    let backend =
        StubBackend::new(StubSlide::new(4_000, 3_000)).with_open_delay(Duration::from_millis(40));
    let counters = backend.counters();
    let service = ImageService::with_formats(
        FormatRegistry::new().with_backend(backend),
        &ReaderConfig::default(),
    );

    let n = 24;
    let barrier = Arc::new(Barrier::new(n));
    let workers: Vec<_> = (0..n)
        .map(|_| {
            let service = service.clone();
            let barrier = barrier.clone();
            let path = path.clone();
            thread::spawn(move || {
                barrier.wait();
                service.open_or_get(&path).unwrap()
            })
        })
        .collect();

    let handles: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(counters.open_count(), 1);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_async_opens_share_one_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "slide");
    let backend =
        StubBackend::new(StubSlide::new(4_000, 3_000)).with_open_delay(Duration::from_millis(40));
    let counters = backend.counters();
    let service = ImageService::with_formats(
        FormatRegistry::new().with_backend(backend),
        &ReaderConfig::default(),
    );

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let service = service.clone();
            let path = path.clone();
            tokio::spawn(async move { service.open_or_get_async(path).await })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }
    assert_eq!(counters.open_count(), 1);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    assert_eq!(service.cache().cached_count(), 1);
}

// =============================================================================
// Failure Memoization
// =============================================================================

#[test]
fn test_silent_fail_never_retries() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "broken");
    let backend = StubBackend::new(StubSlide::new(100, 100)).failing();
    let counters = backend.counters();
    let service = ImageService::with_formats(
        FormatRegistry::new().with_backend(backend),
        &ReaderConfig::default().with_silent_fail(true),
    );

    for _ in 0..3 {
        assert!(matches!(
            service.open_or_get(&path),
            Err(ImageError::Open(OpenError::Unavailable { .. }))
        ));
    }
    assert_eq!(counters.open_count(), 1);

    // Evicting the memo allows one more attempt
    assert!(service.evict(&path));
    assert!(service.open_or_get(&path).is_err());
    assert_eq!(counters.open_count(), 2);
}

#[test]
fn test_strict_mode_retries() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "broken");
    let backend = StubBackend::new(StubSlide::new(100, 100)).failing();
    let counters = backend.counters();
    let service = ImageService::with_formats(
        FormatRegistry::new().with_backend(backend),
        &ReaderConfig::default(),
    );

    for _ in 0..3 {
        let err = service.open_or_get(&path).unwrap_err();
        assert!(matches!(err, ImageError::Open(OpenError::Corrupt { .. })));
    }
    assert_eq!(counters.open_count(), 3);
    assert_eq!(service.cache().cached_count(), 0);
}

#[test]
fn test_unusable_metadata_is_memoized_under_silent_fail() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "headless");
    let backend = StubBackend::new(StubSlide::new(100, 100)).missing_width();
    let counters = backend.counters();
    let service = ImageService::with_formats(
        FormatRegistry::new().with_backend(backend),
        &ReaderConfig::default().with_silent_fail(true),
    );

    for _ in 0..3 {
        assert!(matches!(
            service.open_or_get(&path),
            Err(ImageError::Open(OpenError::Unavailable { .. }))
        ));
    }
    assert_eq!(counters.open_count(), 1);
    assert_eq!(service.cache().cached_count(), 1);
}

#[test]
fn test_unusable_metadata_fails_open_in_strict_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "headless");
    let backend = StubBackend::new(StubSlide::new(100, 100)).missing_width();
    let counters = backend.counters();
    let service = ImageService::with_formats(
        FormatRegistry::new().with_backend(backend),
        &ReaderConfig::default(),
    );

    for _ in 0..2 {
        let err = service.open_or_get(&path).unwrap_err();
        assert!(matches!(
            err,
            ImageError::Open(OpenError::Metadata {
                source: ParseError::MissingField("width"),
                ..
            })
        ));
    }
    assert_eq!(counters.open_count(), 2);
    assert_eq!(service.cache().cached_count(), 0);
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_capacity_eviction_keeps_recent_images() {
    let dir = tempfile::tempdir().unwrap();
    let backend = StubBackend::new(StubSlide::new(512, 512));
    let counters = backend.counters();
    let service = ImageService::with_formats(
        FormatRegistry::new().with_backend(backend),
        &ReaderConfig::default().with_cache_capacity(3),
    );

    let paths: Vec<_> = (0..5)
        .map(|i| stub_file(dir.path(), &format!("slide-{}", i)))
        .collect();
    for path in &paths {
        service.open_or_get(path).unwrap();
    }

    assert_eq!(service.cache().cached_count(), 3);
    assert!(!service.cache().contains(&paths[0]));
    assert!(!service.cache().contains(&paths[1]));
    assert!(service.cache().contains(&paths[4]));

    // Reopening an evicted image opens it again
    service.open_or_get(&paths[0]).unwrap();
    assert_eq!(counters.open_count(), 6);
}

#[test]
fn test_held_handle_survives_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let path = stub_file(dir.path(), "slide");
    let service = ImageService::with_formats(
        FormatRegistry::new().with_backend(StubBackend::new(StubSlide::new(512, 512))),
        &ReaderConfig::default(),
    );

    let handle = service.open_or_get(&path).unwrap();
    assert!(service.evict(&path));

    // The evicted handle still reads
    let raster = service
        .read_window(&handle, &Region::new(0, 0, 16, 16), 16, 16, &PlaneSelection::all())
        .unwrap();
    assert_eq!(raster.width(), 16);

    let reopened = service.open_or_get(&path).unwrap();
    assert!(!Arc::ptr_eq(&handle, &reopened));
}

// =============================================================================
// Serialized Handles
// =============================================================================

#[test]
fn test_exclusive_backend_reads_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slide.excl");
    std::fs::write(&path, b"excl").unwrap();

    let backend = ExclusiveBackend::new(StubSlide::new(2_048, 2_048));
    let overlapped = backend.overlapped();
    let counters = backend.counters();
    let service = ImageService::with_formats(
        FormatRegistry::new().with_backend(backend),
        &ReaderConfig::default(),
    );
    let handle = service.open_or_get(&path).unwrap();

    let workers: Vec<_> = (0..8u32)
        .map(|i| {
            let service = service.clone();
            let handle = handle.clone();
            thread::spawn(move || {
                service
                    .read_tile(&handle, 0, i % 8, i / 8, &PlaneSelection::all())
                    .unwrap()
            })
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap().width(), 256);
    }

    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(counters.read_count(), 8);
}
