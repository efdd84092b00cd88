//! Normalized-difference indices
//!
//! The water classifier works on three band ratios:
//! `ndi52 = (swir16 - green) / (swir16 + green)`,
//! `ndi43 = (nir08 - red) / (nir08 + red)` and
//! `ndi72 = (swir22 - green) / (swir22 + green)`.

use ndarray::Array2;
use rayon::prelude::*;
use wofs_core::raster::Raster;
use wofs_core::{BandSet, Error, Result};

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Pixels where either band is no-data, or where the denominator is zero,
/// are set to NaN.
pub fn normalized_difference(band_a: &Raster<f32>, band_b: &Raster<f32>) -> Result<Raster<f32>> {
    band_a.check_aligned(band_b)?;

    let (rows, cols) = band_a.shape();
    let (a_data, b_data) = (band_a.data(), band_b.data());

    let data: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f32::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let a = a_data[(row, col)];
                let b = b_data[(row, col)];
                if band_a.is_nodata(a) || band_b.is_nodata(b) {
                    continue;
                }
                *out = nd(a as f64, b as f64).map_or(f32::NAN, |v| v as f32);
            }
            row_data
        })
        .collect();

    build_output(band_a, rows, cols, data)
}

/// Scalar normalized difference; `None` when undefined.
pub fn nd(a: f64, b: f64) -> Option<f64> {
    let sum = a + b;
    if sum.abs() < 1e-10 || sum.is_nan() {
        return None;
    }
    Some((a - b) / sum)
}

/// The three indices used by the water classifier
#[derive(Debug, Clone)]
pub struct WaterIndices {
    pub ndi52: Raster<f32>,
    pub ndi43: Raster<f32>,
    pub ndi72: Raster<f32>,
}

/// Compute `ndi52`, `ndi43` and `ndi72` from scaled bands.
pub fn water_indices(bands: &BandSet) -> Result<WaterIndices> {
    Ok(WaterIndices {
        ndi52: normalized_difference(bands.require("swir16")?, bands.require("green")?)?,
        ndi43: normalized_difference(bands.require("nir08")?, bands.require("red")?)?,
        ndi72: normalized_difference(bands.require("swir22")?, bands.require("green")?)?,
    })
}

pub(crate) fn build_output(
    template: &Raster<f32>,
    rows: usize,
    cols: usize,
    data: Vec<f32>,
) -> Result<Raster<f32>> {
    let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(Raster::from_array(array, template.geobox().clone())?.with_nodata(Some(f32::NAN)))
}
