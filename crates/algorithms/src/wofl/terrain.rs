//! Terrain flags from elevation

use ndarray::Array2;
use rayon::prelude::*;
use wofs_core::raster::Raster;
use wofs_core::{Error, Result};

use super::flags::HIGH_SLOPE;

/// Slope above which an observation is flagged, in degrees
pub const HIGH_SLOPE_DEGREES: f64 = 12.0;

/// Slope in degrees using Horn's method.
///
/// Edge cells and cells with a no-data neighbour are NaN. The cell size is
/// the geobox resolution, so the elevation must be in the same units.
pub fn slope_degrees(dem: &Raster<f32>) -> Result<Raster<f32>> {
    let (rows, cols) = dem.shape();
    let (res_x, res_y) = dem.geobox().resolution();
    let eight_dx = 8.0 * res_x.abs();
    let eight_dy = 8.0 * res_y.abs();
    let z = dem.data();
    let value = |r: usize, c: usize| {
        let v = z[(r, c)];
        if dem.is_nodata(v) {
            f64::NAN
        } else {
            v as f64
        }
    };

    let output: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f32::NAN; cols];
            if row == 0 || row + 1 >= rows {
                return row_data;
            }
            for col in 1..cols.saturating_sub(1) {
                let a = value(row - 1, col - 1);
                let b = value(row - 1, col);
                let c = value(row - 1, col + 1);
                let d = value(row, col - 1);
                let e = value(row, col);
                let f = value(row, col + 1);
                let g = value(row + 1, col - 1);
                let h = value(row + 1, col);
                let i = value(row + 1, col + 1);
                if [a, b, c, d, e, f, g, h, i].iter().any(|v| v.is_nan()) {
                    continue;
                }
                let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / eight_dx;
                let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / eight_dy;
                row_data[col] = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan().to_degrees() as f32;
            }
            row_data
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), output).map_err(|e| Error::Other(e.to_string()))?;
    Ok(Raster::from_array(array, dem.geobox().clone())?.with_nodata(Some(f32::NAN)))
}

/// [`HIGH_SLOPE`] where the slope exceeds `threshold` degrees, else 0.
pub fn terrain_flags(elevation: &Raster<f32>, threshold: f64) -> Result<Raster<u8>> {
    let slope = slope_degrees(elevation)?;
    Ok(slope.map(|s| {
        if (s as f64) > threshold {
            HIGH_SLOPE
        } else {
            0
        }
    }))
}
