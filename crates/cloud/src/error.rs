//! Error types for catalog search, object storage and raster loading.

use thiserror::Error;

/// Errors produced by the cloud layer.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("catalog returned HTTP {status}: {body}")]
    Catalog { status: u16, body: String },

    #[error("invalid STAC response: {0}")]
    Parse(String),

    /// The search ran but matched nothing. Callers treat this as "no data",
    /// not as a failure.
    #[error("no items found for {0}")]
    EmptyCollection(String),

    #[error("object {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("asset {href}: {reason}")]
    Asset { href: String, reason: String },

    #[error("core error: {0}")]
    Core(#[from] wofs_core::Error),
}

impl CloudError {
    pub fn is_empty_collection(&self) -> bool {
        matches!(self, Self::EmptyCollection(_))
    }
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
