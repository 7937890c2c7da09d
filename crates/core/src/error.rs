//! Error types for landsight

use std::time::Duration;
use thiserror::Error;

/// Why an export could not be written.
#[derive(Error, Debug)]
pub enum ExportFailure {
    #[error("pixel count {requested} exceeds cap of {cap}")]
    PixelCap { requested: u64, cap: u64 },

    #[error("destination quota exceeded: need {needed} bytes, {available} available")]
    Quota { needed: u64, available: u64 },

    #[error("permission denied writing {path}")]
    Permission { path: String },

    #[error("write failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Main error type for landsight operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Spatial reference mismatch: {0}")]
    SpatialRefMismatch(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("GeoTIFF error: {0}")]
    GeoTiff(String),

    /// A region lookup matched no boundary feature.
    #[error("no boundary feature matches {query}")]
    Resolution { query: String },

    /// Filters left nothing for a reducer that needs at least one image.
    #[error("empty image collection after filtering ({context})")]
    EmptyCollection { context: String },

    #[error("formula error: {0}")]
    Formula(String),

    #[error("band '{band}' not found (available: {available:?})")]
    MissingBand { band: String, available: Vec<String> },

    #[error("training error: {0}")]
    Training(String),

    #[error("export failed: {0}")]
    Export(#[from] ExportFailure),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn missing_band<S: AsRef<str>>(band: &str, available: impl IntoIterator<Item = S>) -> Self {
        Error::MissingBand {
            band: band.to_string(),
            available: available.into_iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }
}

/// Result type alias for landsight operations
pub type Result<T> = std::result::Result<T, Error>;
