//! Water observation feature layers (WOFL)

pub mod classify;
pub mod flags;
pub mod qa;
pub mod terrain;
pub mod tree;

pub use classify::{classify, WoflParams, QA_BAND, REQUIRED_BANDS};
pub use flags::{is_clear, is_clear_dry, is_clear_wet};
pub use tree::{classify_pixel, decision_tree};
