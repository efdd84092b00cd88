//! Band indices and reflectance scaling

pub mod indices;
pub mod scaling;

pub use indices::{normalized_difference, water_indices, WaterIndices};
pub use scaling::{scale_c2, scale_c2_value};
