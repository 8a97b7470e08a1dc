use thiserror::Error;

/// Errors raised while locating or opening an image file
#[derive(Debug, Clone, Error)]
pub enum OpenError {
    /// The path does not exist
    #[error("File not found: {path}")]
    NotFound { path: String },

    /// No registered backend recognizes the file
    #[error("Unsupported format: {path}")]
    UnsupportedFormat { path: String },

    /// A backend recognized the file but failed to open it
    #[error("Corrupt or unreadable file {path}: {message}")]
    Corrupt { path: String, message: String },

    /// The file opened but its mandatory metadata is unusable
    #[error("Unusable metadata in {path}: {source}")]
    Metadata { path: String, source: ParseError },

    /// A previous silent-fail open of this path failed and was memoized
    #[error("Image unavailable (previous open failed): {path}")]
    Unavailable { path: String },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}

/// Errors raised when mandatory metadata cannot be obtained
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// A mandatory field is missing from the native geometry
    #[error("Missing mandatory metadata field: {0}")]
    MissingField(&'static str),

    /// A mandatory field is present but unusable
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Caller input errors about regions, tiles, planes and output sizes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// Region has zero area once clipped to the image
    #[error("Empty region: left={left}, top={top}, width={width}, height={height}")]
    EmptyRegion {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    },

    /// Requested output dimensions are not positive
    #[error("Invalid output size: {width}x{height}")]
    InvalidOutputSize { width: u32, height: u32 },

    /// Image or tile size cannot build a pyramid
    #[error("Invalid pyramid dimensions: {width}x{height} with tile size {tile_size}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        tile_size: u32,
    },

    /// Pyramid level does not exist
    #[error("Invalid level {level}: pyramid has {max_levels} levels")]
    InvalidLevel { level: usize, max_levels: usize },

    /// Tile coordinates outside the tier grid
    #[error("Tile ({x}, {y}) out of bounds for level {level} (max: {max_x}x{max_y})")]
    TileOutOfBounds {
        level: usize,
        x: u32,
        y: u32,
        max_x: u32,
        max_y: u32,
    },

    /// Channel index beyond the addressable raster channels
    #[error("Invalid channel {index}: image has {max} channels")]
    InvalidChannel { index: usize, max: usize },

    /// Empty channel selection
    #[error("No channels requested")]
    NoChannels,

    /// Focal plane or time point out of range
    #[error("Invalid {axis} index {index}: image has {max}")]
    InvalidPlane {
        axis: &'static str,
        index: u32,
        max: u32,
    },
}

/// Errors raised by a decoder backend while reading pixels
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// Failure reported by the backend
    #[error("Backend read failed: {message}")]
    Backend { message: String },

    /// Backend returned a buffer that does not match the requested geometry
    #[error("Unexpected buffer from backend: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    /// Backend returned a plane with unexpected dimensions or band layout
    #[error("Unexpected plane layout: {message}")]
    Layout { message: String },

    /// Worker thread running a blocking read failed
    #[error("Read task failed: {0}")]
    Task(String),
}

impl ReadError {
    pub fn backend(message: impl Into<String>) -> Self {
        ReadError::Backend {
            message: message.into(),
        }
    }
}

/// Errors raised when converting a raster into an encoded image file
#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    /// Band count or sample type has no matching image layout
    #[error("Cannot encode {bands}-band {pixel_type} raster as {format}")]
    UnsupportedLayout {
        bands: usize,
        pixel_type: String,
        format: &'static str,
    },

    /// Failed to encode image
    #[error("Failed to encode image: {message}")]
    Encode { message: String },
}

/// Status class for mapping errors at a service boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad caller input (4xx)
    Client,
    /// Failure on our side or in the file (5xx)
    Server,
}

/// Top-level error for image access
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Read(#[from] ReadError),
}

impl ImageError {
    /// Classify this error for the service boundary.
    ///
    /// Only geometry errors are the caller's fault.
    pub fn status_class(&self) -> ErrorClass {
        match self {
            ImageError::Geometry(_) => ErrorClass::Client,
            _ => ErrorClass::Server,
        }
    }
}
