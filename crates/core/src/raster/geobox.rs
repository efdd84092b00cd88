//! GeoBox: the pixel grid of a raster in a coordinate reference system
//!
//! A geobox is the shape of a raster plus the affine mapping from pixel
//! indices to map coordinates and the CRS those coordinates live in. Two
//! rasters line up pixel-for-pixel exactly when their geoboxes are equal.

use geo::{LineString, Polygon};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crs::{reproject, Crs};
use crate::error::Result;

/// Axis-aligned bounding box `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Grow to include a point.
    pub fn expand(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// As a closed polygon ring.
    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ]),
            vec![],
        )
    }

    /// `[west, south, east, north]`, the STAC ordering.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    fn empty() -> Self {
        Self::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN)
    }
}

/// Pixel grid of a raster: shape, north-up affine and CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    rows: usize,
    cols: usize,
    /// X of the upper-left corner of pixel (0, 0)
    origin_x: f64,
    /// Y of the upper-left corner of pixel (0, 0)
    origin_y: f64,
    /// Pixel width (positive)
    res_x: f64,
    /// Pixel height (negative for north-up)
    res_y: f64,
    crs: Crs,
}

impl GeoBox {
    /// Create a north-up geobox.
    pub fn new(
        rows: usize,
        cols: usize,
        origin_x: f64,
        origin_y: f64,
        res_x: f64,
        res_y: f64,
        crs: Crs,
    ) -> Self {
        Self {
            rows,
            cols,
            origin_x,
            origin_y,
            res_x,
            res_y,
            crs,
        }
    }

    /// Cover `bbox` with square pixels of `resolution`, anchored on the
    /// upper-left corner. Partial pixels at the right/bottom edge are kept.
    pub fn from_bbox(bbox: &BBox, resolution: f64, crs: Crs) -> Self {
        let cols = (bbox.width() / resolution).ceil().max(0.0) as usize;
        let rows = (bbox.height() / resolution).ceil().max(0.0) as usize;
        Self::new(rows, cols, bbox.min_x, bbox.max_y, resolution, -resolution, crs)
    }

    /// A geobox with the same grid alignment covering a pixel window.
    pub fn window(&self, row_off: usize, col_off: usize, rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            origin_x: self.origin_x + col_off as f64 * self.res_x,
            origin_y: self.origin_y + row_off as f64 * self.res_y,
            ..self.clone()
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Pixel size as (x, y); y is negative for north-up grids
    pub fn resolution(&self) -> (f64, f64) {
        (self.res_x, self.res_y)
    }

    /// Upper-left corner
    pub fn origin(&self) -> (f64, f64) {
        (self.origin_x, self.origin_y)
    }

    /// Map coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.res_x,
            self.origin_y + (row as f64 + 0.5) * self.res_y,
        )
    }

    /// Fractional (col, row) of a map coordinate; floor to get indices
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.origin_x) / self.res_x, (y - self.origin_y) / self.res_y)
    }

    /// Pixel containing a map coordinate, if inside the grid
    pub fn pixel_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = self.world_to_pixel(x, y);
        if col < 0.0 || row < 0.0 || !col.is_finite() || !row.is_finite() {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        (row < self.rows && col < self.cols).then_some((row, col))
    }

    /// Extent in map coordinates
    pub fn extent(&self) -> BBox {
        let x1 = self.origin_x + self.cols as f64 * self.res_x;
        let y1 = self.origin_y + self.rows as f64 * self.res_y;
        BBox::new(
            self.origin_x.min(x1),
            self.origin_y.min(y1),
            self.origin_x.max(x1),
            self.origin_y.max(y1),
        )
    }

    /// Extent as a polygon in the geobox CRS
    pub fn polygon(&self) -> Polygon<f64> {
        self.extent().to_polygon()
    }

    /// Longitude/latitude envelope(s) of the geobox.
    ///
    /// The boundary is densified before unprojecting. When the envelope
    /// crosses the antimeridian it is returned as two boxes, one on each
    /// side, each within `[-180, 180]`.
    pub fn wgs84_bboxes(&self) -> Result<Vec<BBox>> {
        const STEPS: usize = 16;
        let ext = self.extent();
        let mut env = BBox::empty();
        for i in 0..=STEPS {
            let t = i as f64 / STEPS as f64;
            let x = ext.min_x + t * ext.width();
            let y = ext.min_y + t * ext.height();
            for (px, py) in [(x, ext.min_y), (x, ext.max_y), (ext.min_x, y), (ext.max_x, y)] {
                let (lon, lat) = reproject::to_wgs84(&self.crs, px, py)?;
                env.expand(lon, lat);
            }
        }

        // Shift so the western edge sits in [-180, 180).
        let shift = reproject::normalize_lon(env.min_x) - env.min_x;
        let (west, east) = (env.min_x + shift, env.max_x + shift);
        if east > 180.0 {
            Ok(vec![
                BBox::new(west, env.min_y, 180.0, env.max_y),
                BBox::new(-180.0, env.min_y, east - 360.0, env.max_y),
            ])
        } else {
            Ok(vec![BBox::new(west, env.min_y, east, env.max_y)])
        }
    }
}

impl fmt::Display for GeoBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GeoBox({}x{} @ ({}, {}) res {} {})",
            self.rows, self.cols, self.origin_x, self.origin_y, self.res_x, self.crs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn utm_box() -> GeoBox {
        GeoBox::new(100, 200, 500_000.0, 8_000_000.0, 30.0, -30.0, Crs::from_epsg(32760))
    }

    #[test]
    fn test_pixel_center_and_index() {
        let gb = utm_box();
        let (x, y) = gb.pixel_center(0, 0);
        assert_relative_eq!(x, 500_015.0);
        assert_relative_eq!(y, 7_999_985.0);
        assert_eq!(gb.pixel_index(x, y), Some((0, 0)));
        assert_eq!(gb.pixel_index(499_000.0, y), None);
    }

    #[test]
    fn test_extent() {
        let ext = utm_box().extent();
        assert_relative_eq!(ext.min_x, 500_000.0);
        assert_relative_eq!(ext.max_x, 506_000.0);
        assert_relative_eq!(ext.min_y, 7_997_000.0);
        assert_relative_eq!(ext.max_y, 8_000_000.0);
    }

    #[test]
    fn test_from_bbox_rounds_up() {
        let gb = GeoBox::from_bbox(&BBox::new(0.0, 0.0, 95.0, 60.0), 30.0, Crs::from_epsg(3832));
        assert_eq!(gb.shape(), (2, 4));
    }

    #[test]
    fn test_window_keeps_alignment() {
        let gb = utm_box();
        let w = gb.window(10, 20, 5, 5);
        assert_eq!(w.pixel_center(0, 0), gb.pixel_center(10, 20));
    }

    #[test]
    fn test_equality_is_exact() {
        let a = utm_box();
        let mut b = utm_box();
        assert_eq!(a, b);
        b = b.window(0, 0, 100, 199);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wgs84_bboxes_split_at_antimeridian() {
        let crs = Crs::pdc_mercator();
        let (x0, y0) = reproject::from_wgs84(&crs, 179.5, -16.5).unwrap();
        let (x1, y1) = reproject::from_wgs84(&crs, 180.5, -16.0).unwrap();
        let gb = GeoBox::from_bbox(&BBox::new(x0, y0, x1, y1), 30.0, crs);
        let boxes = gb.wgs84_bboxes().unwrap();
        assert_eq!(boxes.len(), 2);
        assert_relative_eq!(boxes[0].max_x, 180.0);
        assert_relative_eq!(boxes[1].min_x, -180.0);
        assert!(boxes[1].max_x < -179.4 && boxes[1].max_x > -179.6);
    }

    #[test]
    fn test_wgs84_bboxes_single() {
        let boxes = utm_box().wgs84_bboxes().unwrap();
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].min_x > 176.0 && boxes[0].max_x < 178.0);
    }
}
