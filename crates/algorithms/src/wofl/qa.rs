//! Landsat Collection 2 `qa_pixel` masking
//!
//! Bits used: 0 fill, 1 dilated cloud, 3 cloud, 4 cloud shadow. Cloud and
//! shadow masks are grown by a square dilation before being turned into
//! WOFL flags.

use ndarray::Array2;
use rayon::prelude::*;
use wofs_core::raster::Raster;
use wofs_core::Result;

use super::flags::{CLOUD, CLOUD_SHADOW, NODATA};

pub const QA_FILL: u16 = 1 << 0;
pub const QA_DILATED_CLOUD: u16 = 1 << 1;
pub const QA_CLOUD: u16 = 1 << 3;
pub const QA_CLOUD_SHADOW: u16 = 1 << 4;

/// Default dilation radius in pixels
pub const DEFAULT_DILATION: usize = 2;

/// Flags for one `qa_pixel` value before dilation
pub fn qa_flags(qa: u16) -> u8 {
    if qa & QA_FILL != 0 {
        return NODATA;
    }
    let mut flags = 0;
    if qa & (QA_CLOUD | QA_DILATED_CLOUD) != 0 {
        flags |= CLOUD;
    }
    if qa & QA_CLOUD_SHADOW != 0 {
        flags |= CLOUD_SHADOW;
    }
    flags
}

/// Binary dilation with a square structuring element of `radius`.
///
/// Each output cell is set when any cell within `radius` rows and columns
/// is set. Edges use the part of the element that lies inside the grid.
pub fn dilate_mask(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    if radius == 0 {
        return mask.clone();
    }
    let (rows, cols) = mask.dim();

    // Separable: a row pass then a column pass equals the square element.
    let horizontal: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let lo = col.saturating_sub(radius);
                    let hi = (col + radius).min(cols - 1);
                    (lo..=hi).any(|c| mask[(row, c)])
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let out: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let lo = row.saturating_sub(radius);
            let hi = (row + radius).min(rows - 1);
            (0..cols)
                .map(|col| (lo..=hi).any(|r| horizontal[r * cols + col]))
                .collect::<Vec<_>>()
        })
        .collect();

    // Shape is unchanged, so this cannot fail.
    Array2::from_shape_vec((rows, cols), out).unwrap_or_else(|_| mask.clone())
}

/// WOFL masking flags from a `qa_pixel` band.
///
/// NaN (or the raster's no-data) means the QA value itself is missing and
/// yields [`NODATA`]. Cloud and shadow are dilated by `dilation` pixels.
pub fn qa_mask(qa: &Raster<f32>, dilation: usize) -> Result<Raster<u8>> {
    let raw: Array2<u8> = qa.data().mapv(|v| {
        if qa.is_nodata(v) || v < 0.0 || v > u16::MAX as f32 {
            NODATA
        } else {
            qa_flags(v as u16)
        }
    });

    let cloud = dilate_mask(&raw.mapv(|f| f != NODATA && f & CLOUD != 0), dilation);
    let shadow = dilate_mask(&raw.mapv(|f| f != NODATA && f & CLOUD_SHADOW != 0), dilation);

    let mut flags = Array2::<u8>::zeros(raw.dim());
    ndarray::Zip::from(&mut flags)
        .and(&raw)
        .and(&cloud)
        .and(&shadow)
        .for_each(|out, &r, &c, &s| {
            *out = if r == NODATA {
                NODATA
            } else {
                (if c { CLOUD } else { 0 }) | (if s { CLOUD_SHADOW } else { 0 })
            };
        });

    Raster::from_array(flags, qa.geobox().clone())
}
