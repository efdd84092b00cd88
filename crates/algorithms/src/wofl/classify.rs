//! Per-observation water classification
//!
//! Ties the pieces of the WOFL together: reflectance scaling, the three
//! indices, the decision tree and the optional QA and terrain masks.

use tracing::debug;
use wofs_core::raster::Raster;
use wofs_core::{BandSet, Result};

use super::flags::{with_masks, NODATA};
use super::qa::{qa_mask, DEFAULT_DILATION};
use super::terrain::{terrain_flags, HIGH_SLOPE_DEGREES};
use super::tree::decision_tree;
use crate::imagery::indices::water_indices;
use crate::imagery::scaling::scale_c2;

/// Spectral bands the tree needs, in tree order
pub const REQUIRED_BANDS: [&str; 6] = ["blue", "green", "red", "nir08", "swir16", "swir22"];

/// Name of the optional Landsat QA band
pub const QA_BAND: &str = "qa_pixel";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WoflParams {
    /// Bands are Collection 2 digital numbers and need converting
    pub c2_scaling: bool,
    /// Cloud and shadow dilation in pixels
    pub dilation: usize,
    /// Slope in degrees above which a pixel is flagged
    pub slope_threshold: f64,
}

impl Default for WoflParams {
    fn default() -> Self {
        Self {
            c2_scaling: true,
            dilation: DEFAULT_DILATION,
            slope_threshold: HIGH_SLOPE_DEGREES,
        }
    }
}

/// Classify one observation into WOFL flags.
///
/// Fails with `MissingBand` if any of [`REQUIRED_BANDS`] is absent. Pixels
/// that are missing in a present band are handled per pixel by the tree.
/// `qa_pixel` and `elevation` add masking flags when given; an elevation
/// raster must share the bands' geobox.
pub fn classify(
    bands: &BandSet,
    elevation: Option<&Raster<f32>>,
    params: &WoflParams,
) -> Result<Raster<u8>> {
    let mut scaled = BandSet::new(bands.observation_id(), bands.datetime(), bands.geobox().clone());
    for name in REQUIRED_BANDS {
        let band = bands.require(name)?;
        let band = if params.c2_scaling {
            scale_c2(band)?
        } else {
            band.clone()
        };
        scaled.insert(name, band)?;
    }

    let indices = water_indices(&scaled)?;
    let [blue, green, red, nir08, swir16, swir22] = REQUIRED_BANDS.map(|name| scaled.require(name));
    let mut water = decision_tree([blue?, green?, red?, nir08?, swir16?, swir22?], &indices)?;

    if let Some(qa) = bands.get(QA_BAND) {
        debug!("{}: applying qa_pixel mask", bands.observation_id());
        let masks = qa_mask(qa, params.dilation)?;
        water = water.zip_map(&masks, with_masks)?;
    }

    if let Some(dem) = elevation {
        water.check_aligned(dem)?;
        let masks = terrain_flags(dem, params.slope_threshold)?;
        water = water.zip_map(&masks, with_masks)?;
    }

    Ok(water.with_nodata(Some(NODATA)))
}
