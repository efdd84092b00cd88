//! Error types for grid construction

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a tile grid
#[derive(Error, Debug)]
pub enum GridError {
    #[error("Boundary source {path} could not be read: {source}")]
    BoundarySource {
        path: PathBuf,
        #[source]
        source: wofs_core::Error,
    },

    #[error("Boundary source {0} contains no polygons")]
    EmptyBoundary(PathBuf),

    #[error("Feature {index} has no usable '{attribute}' attribute")]
    MissingAttribute { index: usize, attribute: String },

    #[error("Invalid tile key: {0}")]
    InvalidKey(String),

    #[error("Invalid grid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Core(#[from] wofs_core::Error),
}

/// Result type alias for grid operations
pub type Result<T> = std::result::Result<T, GridError>;
