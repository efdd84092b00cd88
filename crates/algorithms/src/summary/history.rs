//! Multi-year summary from annual summaries

use wofs_core::raster::Raster;
use wofs_core::{Error, GeoBox, Result};

use super::aggregate::{WofsSummary, COUNT_NODATA};

/// Sum annual `count_clear` / `count_wet` pairs and recompute frequency.
///
/// Count no-data (or negative values) contributes nothing. Sums saturate
/// at `i16::MAX`.
pub fn full_history(geobox: &GeoBox, annual: &[(Raster<i16>, Raster<i16>)]) -> Result<WofsSummary> {
    let shape = geobox.shape();
    let mut clear = ndarray::Array2::<i32>::zeros(shape);
    let mut wet = ndarray::Array2::<i32>::zeros(shape);

    for (year_clear, year_wet) in annual {
        for layer in [year_clear, year_wet] {
            if layer.geobox() != geobox {
                return Err(Error::GeoBoxMismatch(geobox.to_string(), layer.geobox().to_string()));
            }
        }
        ndarray::Zip::from(&mut clear)
            .and(&mut wet)
            .and(year_clear.data())
            .and(year_wet.data())
            .for_each(|c, w, &yc, &yw| {
                if yc > 0 && yc != COUNT_NODATA {
                    *c += yc as i32;
                    if yw > 0 && yw != COUNT_NODATA {
                        *w += yw as i32;
                    }
                }
            });
    }

    let to_i16 = |v: &i32| (*v).min(i16::MAX as i32) as i16;
    WofsSummary::from_counts(
        Raster::from_array(clear.map(to_i16), geobox.clone())?,
        Raster::from_array(wet.map(to_i16), geobox.clone())?,
    )
}
