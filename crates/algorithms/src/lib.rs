//! # wofs-algorithms
//!
//! Raster algorithms of the WOfS batch engine.
//!
//! ## Modules
//!
//! - **imagery**: reflectance scaling and normalized-difference indices
//! - **wofl**: the water classification tree, QA and terrain masking
//! - **summary**: temporal counts and frequency, land masking, full history

pub mod imagery;
pub mod summary;
pub mod wofl;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{normalized_difference, scale_c2, water_indices, WaterIndices};
    pub use crate::summary::{full_history, mask_outside, summarize, SummaryAccumulator, WofsSummary};
    pub use crate::wofl::{classify, WoflParams};
    pub use wofs_core::prelude::*;
}
