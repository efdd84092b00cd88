//! # wofs-core
//!
//! Core types and I/O for the WOfS batch engine.
//!
//! This crate provides:
//! - `Raster<T>`: generic raster grid laid out on a [`GeoBox`]
//! - `Crs` and pure-Rust reprojection
//! - `Dataset`: aligned, named variables with attributes
//! - `Observation` / `BandSet`: catalog scenes and their loaded bands
//! - GeoJSON feature reading and GeoTIFF I/O

pub mod crs;
pub mod dataset;
pub mod error;
pub mod io;
pub mod raster;
pub mod scene;
pub mod vector;

pub use crs::Crs;
pub use dataset::{Dataset, Variable};
pub use error::{Error, Result};
pub use raster::{BBox, GeoBox, Raster, RasterElement};
pub use scene::{BandSet, Observation};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::Crs;
    pub use crate::dataset::{Dataset, Variable};
    pub use crate::error::{Error, Result};
    pub use crate::raster::{BBox, GeoBox, Raster, RasterElement};
    pub use crate::scene::{BandSet, Observation};
}
