//! Water classification decision tree
//!
//! A fixed tree over surface reflectance (x 10 000) and three normalized
//! difference indices. Every split threshold is a named constant and every
//! wet leaf is computed on its own so it can be inspected.

use ndarray::Zip;
use wofs_core::raster::Raster;
use wofs_core::Result;

use super::flags::{DRY, NODATA, NONCONTIGUOUS, WATER};
use crate::imagery::indices::WaterIndices;

pub const NDI52_D1: f64 = -0.01;
pub const BLUE_L2: f64 = 2083.5;
pub const SWIR22_D3: f64 = 323.5;
pub const NDI43_W1: f64 = 0.61;
pub const BLUE_D5: f64 = 1400.5;
pub const NDI72_D6: f64 = -0.23;
pub const NDI43_D7: f64 = 0.22;
pub const BLUE_W3: f64 = 473.0;
pub const BLUE_W4: f64 = 379.0;
pub const NDI43_W7: f64 = -0.01;
pub const NDI52_D11: f64 = 0.23;
pub const BLUE_L13: f64 = 334.5;
pub const NDI43_L13: f64 = 0.54;
pub const NDI52_D14: f64 = -0.12;
pub const RED_D15: f64 = 364.5;
pub const BLUE_W6: f64 = 129.5;
pub const BLUE_W8: f64 = 300.5;
pub const NDI52_W10: f64 = 0.32;
pub const BLUE_W10: f64 = 249.5;
pub const NDI43_W10: f64 = 0.45;
pub const RED_W10: f64 = 364.5;
pub const BLUE_W10_UPPER: f64 = 129.5;

/// The values the tree splits on, for one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeInput {
    pub blue: f64,
    pub red: f64,
    pub swir22: f64,
    pub ndi52: f64,
    pub ndi43: f64,
    pub ndi72: f64,
}

/// Which wet leaves fired for a pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Leaves {
    pub w1: bool,
    pub w2: bool,
    pub w3: bool,
    pub w4: bool,
    pub w5: bool,
    pub w6: bool,
    pub w7: bool,
    pub w8: bool,
    pub w10: bool,
}

impl Leaves {
    pub fn any(&self) -> bool {
        self.w1
            || self.w2
            || self.w3
            || self.w4
            || self.w5
            || self.w6
            || self.w7
            || self.w8
            || self.w10
    }
}

/// Evaluate every leaf of the tree.
pub fn leaves(p: &TreeInput) -> Leaves {
    let d1 = p.ndi52 <= NDI52_D1;
    let l2 = d1 && p.blue <= BLUE_L2;
    let d3 = p.swir22 <= SWIR22_D3;
    let w1 = l2 && d3 && p.ndi43 <= NDI43_W1;

    let r3 = l2 && !d3;
    let d5 = p.blue <= BLUE_D5;
    let d6 = p.ndi72 <= NDI72_D6;
    let d7 = p.ndi43 <= NDI43_D7;
    let w2 = r3 && d5 && d6 && d7;
    let w3 = r3 && d5 && d6 && !d7 && p.blue <= BLUE_W3;
    let w4 = r3 && d5 && !d6 && p.blue <= BLUE_W4;
    let w7 = r3 && !d5 && p.ndi43 <= NDI43_W7;

    let d11 = p.ndi52 <= NDI52_D11;
    let l13 = !d1 && d11 && p.blue <= BLUE_L13 && p.ndi43 <= NDI43_L13;
    let d14 = p.ndi52 <= NDI52_D14;
    let w5 = l13 && d14;
    let r14 = l13 && !d14;
    let d15 = p.red <= RED_D15;
    let w6 = r14 && d15 && p.blue <= BLUE_W6;
    let w8 = r14 && !d15 && p.blue <= BLUE_W8;

    let w10 = !d1
        && !d11
        && p.ndi52 <= NDI52_W10
        && p.blue <= BLUE_W10
        && p.ndi43 <= NDI43_W10
        && p.red <= RED_W10
        && p.blue <= BLUE_W10_UPPER;

    Leaves {
        w1,
        w2,
        w3,
        w4,
        w5,
        w6,
        w7,
        w8,
        w10,
    }
}

/// Classify one pixel from its reflectance bands and indices.
///
/// `bands` is `[blue, green, red, nir08, swir16, swir22]`, NaN where
/// missing. Missing red is always [`NODATA`]; any other missing band is
/// [`NONCONTIGUOUS`]; an undefined index is [`NODATA`].
pub fn classify_pixel(bands: [f32; 6], ndi52: f32, ndi43: f32, ndi72: f32) -> u8 {
    let [blue, _green, red, _nir, _swir16, swir22] = bands;
    if red.is_nan() {
        return NODATA;
    }
    if bands.iter().any(|b| b.is_nan()) {
        return NONCONTIGUOUS;
    }
    if ndi52.is_nan() || ndi43.is_nan() || ndi72.is_nan() {
        return NODATA;
    }
    let input = TreeInput {
        blue: blue as f64,
        red: red as f64,
        swir22: swir22 as f64,
        ndi52: ndi52 as f64,
        ndi43: ndi43 as f64,
        ndi72: ndi72 as f64,
    };
    if leaves(&input).any() {
        WATER
    } else {
        DRY
    }
}

/// Run the tree over aligned band rasters `[blue, green, red, nir08, swir16, swir22]`.
///
/// Pixels are classified in parallel over the whole grid.
pub fn decision_tree(bands: [&Raster<f32>; 6], indices: &WaterIndices) -> Result<Raster<u8>> {
    let template = bands[2];
    for b in bands.iter() {
        template.check_aligned(*b)?;
    }
    template.check_aligned(&indices.ndi52)?;
    template.check_aligned(&indices.ndi43)?;
    template.check_aligned(&indices.ndi72)?;

    let value = |r: &Raster<f32>, at: (usize, usize)| {
        let v = r.data()[at];
        if r.is_nodata(v) {
            f32::NAN
        } else {
            v
        }
    };

    let classes = Zip::indexed(template.data()).par_map_collect(|at, _| {
        classify_pixel(
            bands.map(|b| value(b, at)),
            value(&indices.ndi52, at),
            value(&indices.ndi43, at),
            value(&indices.ndi72, at),
        )
    });
    Ok(Raster::from_array(classes, template.geobox().clone())?.with_nodata(Some(NODATA)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(blue: f64, red: f64, swir22: f64, ndi52: f64, ndi43: f64, ndi72: f64) -> TreeInput {
        TreeInput {
            blue,
            red,
            swir22,
            ndi52,
            ndi43,
            ndi72,
        }
    }

    #[test]
    fn test_leaf_w1() {
        let l = leaves(&input(1000.0, 500.0, 100.0, -0.5, 0.0, 0.0));
        assert!(l.w1);
        assert_eq!(l, Leaves { w1: true, ..Default::default() });
    }

    #[test]
    fn test_leaf_w2() {
        let l = leaves(&input(1000.0, 500.0, 500.0, -0.5, 0.0, -0.5));
        assert_eq!(l, Leaves { w2: true, ..Default::default() });
    }

    #[test]
    fn test_leaf_w3() {
        let l = leaves(&input(400.0, 500.0, 500.0, -0.5, 0.3, -0.5));
        assert_eq!(l, Leaves { w3: true, ..Default::default() });
        // Same pixel with brighter blue falls through to dry.
        assert!(!leaves(&input(500.0, 500.0, 500.0, -0.5, 0.3, -0.5)).any());
    }

    #[test]
    fn test_leaf_w4() {
        let l = leaves(&input(300.0, 500.0, 500.0, -0.5, 0.3, 0.0));
        assert_eq!(l, Leaves { w4: true, ..Default::default() });
    }

    #[test]
    fn test_leaf_w7() {
        let l = leaves(&input(1500.0, 500.0, 500.0, -0.5, -0.5, 0.0));
        assert_eq!(l, Leaves { w7: true, ..Default::default() });
    }

    #[test]
    fn test_leaf_w5_needs_ndi52_on_both_sides_of_d1() {
        // w5 requires !d1 (ndi52 > -0.01) and d14 (ndi52 <= -0.12).
        for ndi52 in [-0.5, -0.12, -0.05, -0.01, 0.0, 0.2] {
            assert!(!leaves(&input(100.0, 300.0, 100.0, ndi52, 0.0, 0.0)).w5);
        }
    }

    #[test]
    fn test_leaf_w6() {
        let l = leaves(&input(100.0, 300.0, 100.0, 0.0, 0.0, 0.0));
        assert_eq!(l, Leaves { w6: true, ..Default::default() });
    }

    #[test]
    fn test_leaf_w8() {
        let l = leaves(&input(200.0, 400.0, 100.0, 0.0, 0.0, 0.0));
        assert_eq!(l, Leaves { w8: true, ..Default::default() });
    }

    #[test]
    fn test_leaf_w10() {
        let l = leaves(&input(100.0, 300.0, 100.0, 0.3, 0.0, 0.0));
        assert_eq!(l, Leaves { w10: true, ..Default::default() });
        // ndi52 above 0.32 is dry.
        assert!(!leaves(&input(100.0, 300.0, 100.0, 0.33, 0.0, 0.0)).any());
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        assert!(leaves(&input(BLUE_L2, 500.0, SWIR22_D3, NDI52_D1, NDI43_W1, 0.0)).w1);
    }

    #[test]
    fn test_bright_dry_pixel() {
        assert!(!leaves(&input(3000.0, 3000.0, 3000.0, 0.5, 0.5, 0.5)).any());
    }

    #[test]
    fn test_classify_pixel_nodata_rules() {
        let ok = [1000.0, 800.0, 500.0, 500.0, 500.0, 100.0];
        assert_eq!(classify_pixel(ok, -0.5, 0.0, 0.0), WATER);

        let mut no_red = ok;
        no_red[2] = f32::NAN;
        assert_eq!(classify_pixel(no_red, -0.5, 0.0, 0.0), NODATA);
        assert_eq!(classify_pixel([f32::NAN; 6], f32::NAN, f32::NAN, f32::NAN), NODATA);

        let mut no_blue = ok;
        no_blue[0] = f32::NAN;
        assert_eq!(classify_pixel(no_blue, -0.5, 0.0, 0.0), NONCONTIGUOUS);

        assert_eq!(classify_pixel(ok, f32::NAN, 0.0, 0.0), NODATA);
    }

    #[test]
    fn test_decision_tree_over_a_raster() {
        use crate::imagery::indices::normalized_difference;
        use wofs_core::{Crs, GeoBox};

        let gb = GeoBox::new(1, 3, 0.0, 30.0, 30.0, -30.0, Crs::pdc_mercator());
        // Columns: wet, bright dry, missing red
        let band = |wet: f32, dry: f32, third: f32| Raster::from_vec(vec![wet, dry, third], gb.clone()).unwrap();
        let blue = band(1000.0, 3000.0, 1000.0);
        let green = band(800.0, 3000.0, 800.0);
        let red = band(500.0, 3000.0, f32::NAN);
        let nir = band(500.0, 3000.0, 500.0);
        let swir16 = band(500.0, 3000.0, 500.0);
        let swir22 = band(100.0, 3000.0, 100.0);
        let indices = WaterIndices {
            ndi52: normalized_difference(&swir16, &green).unwrap(),
            ndi43: normalized_difference(&nir, &red).unwrap(),
            ndi72: normalized_difference(&swir22, &green).unwrap(),
        };

        let out = decision_tree([&blue, &green, &red, &nir, &swir16, &swir22], &indices).unwrap();
        assert_eq!(out.data().iter().copied().collect::<Vec<_>>(), [WATER, DRY, NODATA]);
        assert_eq!(out.nodata(), Some(NODATA));
    }

    #[test]
    fn test_classify_pixel_is_deterministic() {
        let px = [250.0, 300.0, 200.0, 150.0, 120.0, 90.0];
        let first = classify_pixel(px, -0.4, -0.1, -0.5);
        for _ in 0..10 {
            assert_eq!(classify_pixel(px, -0.4, -0.1, -0.5), first);
        }
    }
}
