//! Land masking of summary layers
//!
//! Pixels are tested by their centre against the polygon rings with a
//! per-row scanline: edge crossings along the row are sorted and the spans
//! between alternate crossings are inside (even-odd rule per polygon).

use geo_types::{LineString, MultiPolygon, Polygon};
use ndarray::Array2;
use rayon::prelude::*;
use wofs_core::raster::Raster;
use wofs_core::{BBox, Error, GeoBox, Result};

fn ring_crossings(ring: &LineString<f64>, y: f64, out: &mut Vec<f64>) {
    for edge in ring.lines() {
        let (a, b) = (edge.start, edge.end);
        if (a.y > y) != (b.y > y) {
            out.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
        }
    }
}

fn fill_polygon_row(poly: &Polygon<f64>, geobox: &GeoBox, y: f64, row: &mut [bool]) {
    let mut xs = Vec::new();
    ring_crossings(poly.exterior(), y, &mut xs);
    for hole in poly.interiors() {
        ring_crossings(hole, y, &mut xs);
    }
    xs.sort_by(|a, b| a.total_cmp(b));

    let (origin_x, _) = geobox.origin();
    let (res_x, _) = geobox.resolution();
    let cols = row.len() as f64;
    for pair in xs.chunks_exact(2) {
        // Columns whose centre x lies in [pair[0], pair[1]).
        let start = ((pair[0] - origin_x) / res_x - 0.5).ceil().clamp(0.0, cols) as usize;
        let end = ((pair[1] - origin_x) / res_x - 0.5).ceil().clamp(0.0, cols) as usize;
        for cell in row.iter_mut().take(end).skip(start) {
            *cell = true;
        }
    }
}

/// Pixels of `geobox` whose centre falls inside `area` (same CRS).
pub fn rasterize(area: &MultiPolygon<f64>, geobox: &GeoBox) -> Result<Array2<bool>> {
    let (rows, cols) = geobox.shape();
    if geobox.resolution().0 <= 0.0 {
        return Err(Error::Other(format!("cannot rasterize onto {geobox}")));
    }
    let cells: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|r| {
            let mut row = vec![false; cols];
            let (_, y) = geobox.pixel_center(r, 0);
            for poly in area.iter() {
                fill_polygon_row(poly, geobox, y, &mut row);
            }
            row
        })
        .collect();
    Array2::from_shape_vec((rows, cols), cells).map_err(|e| Error::Other(e.to_string()))
}

/// Copy of `layer` with pixels outside `extent ∩ land` set to NaN.
///
/// Masking only ever removes values: pixels inside keep their value, NaN
/// included.
pub fn mask_outside(layer: &Raster<f32>, extent: &BBox, land: &MultiPolygon<f64>) -> Result<Raster<f32>> {
    let geobox = layer.geobox();
    let inside = rasterize(land, geobox)?;
    let mut out = layer.clone().with_nodata(Some(f32::NAN));
    for ((r, c), value) in out.data_mut().indexed_iter_mut() {
        let (x, y) = geobox.pixel_center(r, c);
        let in_extent = x >= extent.min_x && x <= extent.max_x && y >= extent.min_y && y <= extent.max_y;
        if !(in_extent && inside[(r, c)]) {
            *value = f32::NAN;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;
    use wofs_core::Crs;

    fn gb() -> GeoBox {
        GeoBox::new(10, 10, 0.0, 100.0, 10.0, -10.0, Crs::pdc_mercator())
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![BBox::new(x0, y0, x1, y1).to_polygon()])
    }

    #[test]
    fn test_rasterize_square() {
        let m = rasterize(&square(20.0, 20.0, 60.0, 50.0), &gb()).unwrap();
        assert_eq!(m.iter().filter(|&&v| v).count(), 4 * 3);
        // Row 5 has centre y = 45, column 2 has centre x = 25.
        assert!(m[(5, 2)]);
        assert!(!m[(4, 2)]);
        assert!(!m[(5, 6)]);
    }

    #[test]
    fn test_rasterize_with_hole() {
        let poly = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 100.0, y: 100.0), (x: 0.0, y: 100.0)],
            interiors: [[(x: 40.0, y: 40.0), (x: 60.0, y: 40.0), (x: 60.0, y: 60.0), (x: 40.0, y: 60.0)]],
        );
        let m = rasterize(&MultiPolygon::new(vec![poly]), &gb()).unwrap();
        assert_eq!(m.iter().filter(|&&v| v).count(), 100 - 4);
        assert!(!m[(5, 5)]);
    }

    #[test]
    fn test_mask_is_subtractive_only() {
        let mut freq = Raster::filled(gb(), 0.5f32);
        freq.set(0, 0, f32::NAN).unwrap();
        let land = square(0.0, 50.0, 100.0, 100.0);
        let masked = mask_outside(&freq, &gb().extent(), &land).unwrap();

        for ((r, c), &v) in masked.data().indexed_iter() {
            let before = freq.get(r, c).unwrap();
            if before.is_nan() {
                assert!(v.is_nan());
            } else {
                assert!(v.is_nan() || v == before);
            }
        }
        assert_eq!(masked.get(2, 2).unwrap(), 0.5);
        assert!(masked.get(7, 2).unwrap().is_nan());
        assert!(masked.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn test_extent_limits_mask() {
        let freq = Raster::filled(gb(), 1.0f32);
        let everywhere = square(-1000.0, -1000.0, 1000.0, 1000.0);
        let masked = mask_outside(&freq, &BBox::new(0.0, 0.0, 30.0, 100.0), &everywhere).unwrap();
        assert_eq!(masked.get(0, 2).unwrap(), 1.0);
        assert!(masked.get(0, 3).unwrap().is_nan());
    }

    #[test]
    fn test_empty_land_masks_everything() {
        let freq = Raster::filled(gb(), 1.0f32);
        let masked = mask_outside(&freq, &gb().extent(), &MultiPolygon::new(vec![])).unwrap();
        assert!(masked.data().iter().all(|v| v.is_nan()));
    }
}
