//! # wofs-grid
//!
//! Partitions a region of interest into addressable tiles.
//!
//! Two independent grid families exist:
//! - [`SummaryGridSpec`]: regular tiling in a projected CRS, keyed `(column, row)`
//! - [`SceneGridSpec`]: Landsat WRS-2 footprints, keyed `(path, row)`
//!
//! Both build an immutable [`Grid`] deterministically from their inputs.

pub mod boundary;
pub mod error;
pub mod key;
pub mod scene;
pub mod summary;
pub mod tile;

pub use error::{GridError, Result};
pub use key::TileKey;
pub use scene::SceneGridSpec;
pub use summary::SummaryGridSpec;
pub use tile::{Grid, GridKind, Tile};
