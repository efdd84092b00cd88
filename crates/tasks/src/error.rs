//! Error types for the task layer

use std::path::PathBuf;

use thiserror::Error;
use wofs_cloud::CloudError;
use wofs_grid::GridError;

/// Failures reading or appending the task ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("ledger {path}, line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("ledger lock poisoned")]
    Poisoned,
}

/// Errors produced while planning or running tile tasks
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Core(#[from] wofs_core::Error),

    #[error("no items found: {0}")]
    EmptyCollection(String),

    #[error("processing failed: {0}")]
    Processing(String),

    #[error("invalid datetime {value:?}: {reason}")]
    Period { value: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tile {0} is not in the grid")]
    UnknownTile(String),

    #[error("all {} observations of tile {tile} failed: {}", failed.len(), failed.join(", "))]
    FanOut { tile: String, failed: Vec<String> },

    #[error("tile {tile}: failures could not be dead-lettered: {}", undelivered.join("; "))]
    DeadLetter { tile: String, undelivered: Vec<String> },
}

impl TaskError {
    /// The search matched nothing. This is a terminal, non-fatal outcome.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Self::EmptyCollection(_) => true,
            Self::Cloud(e) => e.is_empty_collection(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
