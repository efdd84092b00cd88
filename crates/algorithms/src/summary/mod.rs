//! Tile summaries over time

pub mod aggregate;
pub mod history;
pub mod mask;

pub use aggregate::{summarize, SummaryAccumulator, WofsSummary};
pub use history::full_history;
pub use mask::{mask_outside, rasterize};
