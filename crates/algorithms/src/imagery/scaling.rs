//! Landsat Collection 2 surface reflectance scaling

use rayon::prelude::*;
use wofs_core::raster::Raster;
use wofs_core::Result;

use super::indices::build_output;

/// Collection 2 Level-2 surface reflectance scale factor
pub const C2_SCALE: f64 = 2.75e-5;
/// Collection 2 Level-2 surface reflectance offset
pub const C2_OFFSET: f64 = -0.2;
/// Reflectance multiplier expected by the water classifier
pub const REFLECTANCE_MULTIPLIER: f64 = 10_000.0;

/// Convert one C2 digital number to reflectance x 10 000.
///
/// DN 0 is the Collection 2 fill value and maps to `None`.
pub fn scale_c2_value(dn: f64) -> Option<f64> {
    if dn.is_nan() || dn == 0.0 {
        return None;
    }
    Some((dn * C2_SCALE + C2_OFFSET) * REFLECTANCE_MULTIPLIER)
}

/// Scale a band of C2 digital numbers; fill and no-data become NaN.
pub fn scale_c2(band: &Raster<f32>) -> Result<Raster<f32>> {
    let (rows, cols) = band.shape();
    let src = band.data();
    let data: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let v = src[(row, col)];
                    if band.is_nodata(v) {
                        return f32::NAN;
                    }
                    scale_c2_value(v as f64).map_or(f32::NAN, |s| s as f32)
                })
                .collect::<Vec<_>>()
        })
        .collect();
    build_output(band, rows, cols, data)
}
