//! Error types for the core raster and vector layer

use thiserror::Error;

/// Main error type for core operations
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

    #[error("GeoBox mismatch: {0} vs {1}")]
    GeoBoxMismatch(String, String),

    #[error("Unsupported CRS: EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Missing band: {0}")]
    MissingBand(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
