//! Raster data structures and operations

mod element;
mod geobox;
mod grid;

pub use element::RasterElement;
pub use geobox::{BBox, GeoBox};
pub use grid::Raster;
