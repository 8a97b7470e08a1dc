//! wsi-window - Windowed reads from gigapixel microscopy images.
//!
//! This binary opens an image, prints its metadata or writes a window, tile
//! or associated image to disk.

use std::fmt::Display;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_window::{
    config::{
        AssociatedConfig, Cli, Command, InfoConfig, OutputArgs, PlaneArgs, TileConfig, WindowConfig,
    },
    format::{AssociatedKind, FormatRegistry},
    raster::{Raster, RasterEncoder},
    service::ImageService,
    slide::PlaneSelection,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Info(config) => run_info(config).await,
        Command::Window(config) => run_window(config).await,
        Command::Tile(config) => run_tile(config).await,
        Command::Associated(config) => run_associated(config).await,
        Command::Formats => run_formats(),
    }
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> ExitCode {
    init_logging(config.reader.verbose);

    let reader_config = config.reader.reader_config();
    if let Err(e) = reader_config.validate() {
        return fail("Configuration error", e);
    }

    let service = ImageService::new(&reader_config);
    let handle = match service.open_or_get_async(config.path.clone()).await {
        Ok(handle) => handle,
        Err(e) => return fail("Failed to open image", e),
    };
    let metadata = match service.get_metadata_async(handle.clone()).await {
        Ok(metadata) => metadata,
        Err(e) => return fail("Failed to read metadata", e),
    };
    let pyramid = match service.get_pyramid(&handle) {
        Ok(pyramid) => pyramid,
        Err(e) => return fail("Failed to build pyramid", e),
    };

    let mut output = json!({
        "path": handle.path(),
        "metadata": metadata.as_ref(),
        "pyramid": pyramid.tiers(),
    });
    if config.raw {
        output["raw"] = json!(service.get_raw_metadata(&handle, &config.namespace));
    }

    match serde_json::to_string_pretty(&output) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => fail("Failed to serialize metadata", e),
    }
}

// =============================================================================
// Window Command
// =============================================================================

async fn run_window(config: WindowConfig) -> ExitCode {
    init_logging(config.reader.verbose);

    if let Err(e) = config.validate() {
        return fail("Configuration error", e);
    }

    let service = ImageService::new(&config.reader.reader_config());
    let handle = match service.open_or_get_async(config.path.clone()).await {
        Ok(handle) => handle,
        Err(e) => return fail("Failed to open image", e),
    };

    let raster = match service
        .read_window_async(
            handle,
            config.region(),
            config.out_width,
            config.out_height,
            selection(&config.plane),
        )
        .await
    {
        Ok(raster) => raster,
        Err(e) => return fail("Failed to read window", e),
    };

    let size = (!config.no_resize).then_some((config.out_width, config.out_height));
    write_raster(&raster, &config.output, size)
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(config: TileConfig) -> ExitCode {
    init_logging(config.reader.verbose);

    if let Err(e) = config.validate() {
        return fail("Configuration error", e);
    }

    let service = ImageService::new(&config.reader.reader_config());
    let handle = match service.open_or_get_async(config.path.clone()).await {
        Ok(handle) => handle,
        Err(e) => return fail("Failed to open image", e),
    };

    let raster = match service
        .read_tile_async(
            handle,
            config.level,
            config.tx,
            config.ty,
            selection(&config.plane),
        )
        .await
    {
        Ok(raster) => raster,
        Err(e) => return fail("Failed to read tile", e),
    };

    write_raster(&raster, &config.output, None)
}

// =============================================================================
// Associated Command
// =============================================================================

async fn run_associated(config: AssociatedConfig) -> ExitCode {
    init_logging(config.reader.verbose);

    if let Err(e) = config.validate() {
        return fail("Configuration error", e);
    }

    let service = ImageService::new(&config.reader.reader_config());
    let handle = match service.open_or_get_async(config.path.clone()).await {
        Ok(handle) => handle,
        Err(e) => return fail("Failed to open image", e),
    };

    let result = match config.kind {
        AssociatedKind::Thumbnail => service
            .read_thumbnail_async(handle, config.max_width, config.max_height)
            .await
            .map(Some),
        AssociatedKind::Label => service.read_label(&handle),
        AssociatedKind::Macro => service.read_macro(&handle),
        AssociatedKind::Overview => service
            .reader()
            .read_associated(&handle, AssociatedKind::Overview),
    };

    let raster = match result {
        Ok(Some(raster)) => raster,
        Ok(None) => {
            return fail(
                "Nothing to write",
                format!("{} has no {} image", config.path.display(), config.kind),
            )
        }
        Err(e) => return fail("Failed to read associated image", e),
    };

    let size = fit_within(
        raster.width(),
        raster.height(),
        config.max_width,
        config.max_height,
    );
    write_raster(&raster, &config.output, Some(size))
}

// =============================================================================
// Formats Command
// =============================================================================

fn run_formats() -> ExitCode {
    let registry = FormatRegistry::with_defaults();

    println!("Registered backends (in detection order):");
    for name in registry.names() {
        println!("  {}", name);
    }
    ExitCode::SUCCESS
}

// =============================================================================
// Helpers
// =============================================================================

fn selection(plane: &PlaneArgs) -> PlaneSelection {
    let selection = PlaneSelection::all().at_z(plane.z).at_t(plane.t);
    match &plane.channels {
        Some(channels) => selection.with_channels(channels.clone()),
        None => selection,
    }
}

/// Largest size with the aspect ratio of `width` x `height` that fits in the
/// box, never enlarging.
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let scale = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    let scaled = |value: u32| ((value as f64 * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

fn write_raster(raster: &Raster, output: &OutputArgs, size: Option<(u32, u32)>) -> ExitCode {
    let format = output.output_format();
    let encoder = RasterEncoder::new().with_quality(output.quality);

    let encoded = match size {
        Some((width, height)) => encoder.encode_resized(raster, format, width, height),
        None => encoder.encode(raster, format),
    };
    let bytes = match encoded {
        Ok(bytes) => bytes,
        Err(e) => return fail("Failed to encode output", e),
    };

    if let Err(e) = write_file(&output.output, &bytes) {
        return fail("Failed to write output", e);
    }

    info!(
        "Wrote {} ({}x{}, {} bands, {} bytes)",
        output.output.display(),
        raster.width(),
        raster.height(),
        raster.bands(),
        bytes.len()
    );
    ExitCode::SUCCESS
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

fn fail(context: &str, err: impl Display) -> ExitCode {
    error!("{}: {}", context, err);
    ExitCode::FAILURE
}

/// Initialize logging with tracing-subscriber.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_window=debug"
    } else {
        "wsi_window=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
