//! Regular summary grid
//!
//! The summary grid tiles a projected CRS into square cells of
//! `tile_pixels x tile_pixels` pixels anchored at a fixed origin. Cell
//! `(column, row)` spans `origin + column * size` eastwards and
//! `origin + row * size` northwards. Only cells touching the region of
//! interest become tiles.

use geo::{BoundingRect, Intersects};
use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wofs_core::vector::reproject_multipolygon;
use wofs_core::{BBox, Crs, GeoBox};

use crate::error::{GridError, Result};
use crate::key::TileKey;
use crate::tile::{polygons_near, Grid, GridKind, Tile};

/// Layout of a regular tiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryGridSpec {
    pub crs: Crs,
    pub origin_x: f64,
    pub origin_y: f64,
    /// Pixel size in CRS units
    pub resolution: f64,
    /// Tile edge length in pixels
    pub tile_pixels: usize,
    /// Cells outside this extent (grid CRS) are never produced
    pub bounds: Option<BBox>,
}

impl Default for SummaryGridSpec {
    /// The Pacific 30 m grid: PDC Mercator, 96 km tiles.
    fn default() -> Self {
        Self {
            crs: Crs::pdc_mercator(),
            origin_x: -3_000_000.0,
            origin_y: -4_000_000.0,
            resolution: 30.0,
            tile_pixels: 3200,
            bounds: None,
        }
    }
}

impl SummaryGridSpec {
    /// Edge length of one tile in CRS units
    pub fn tile_size(&self) -> f64 {
        self.resolution * self.tile_pixels as f64
    }

    /// Extent of cell `(column, row)`
    pub fn cell_bbox(&self, column: i64, row: i64) -> BBox {
        let size = self.tile_size();
        let x0 = self.origin_x + column as f64 * size;
        let y0 = self.origin_y + row as f64 * size;
        BBox::new(x0, y0, x0 + size, y0 + size)
    }

    /// Pixel grid of cell `(column, row)`
    pub fn cell_geobox(&self, column: i64, row: i64) -> GeoBox {
        let bbox = self.cell_bbox(column, row);
        GeoBox::new(
            self.tile_pixels,
            self.tile_pixels,
            bbox.min_x,
            bbox.max_y,
            self.resolution,
            -self.resolution,
            self.crs,
        )
    }

    fn validate(&self) -> Result<()> {
        if self.resolution.is_nan() || self.resolution <= 0.0 || self.tile_pixels == 0 {
            return Err(GridError::InvalidParameter(format!(
                "resolution {} and tile size {} must be positive",
                self.resolution, self.tile_pixels
            )));
        }
        Ok(())
    }

    /// Build the grid of cells touching `region` (given in `region_crs`).
    ///
    /// Each tile carries the nearby region polygons as its clip geometry.
    pub fn build(&self, region: &MultiPolygon<f64>, region_crs: &Crs) -> Result<Grid> {
        self.validate()?;
        let region = reproject_multipolygon(region, region_crs, &self.crs)?;
        let Some(rect) = region.bounding_rect() else {
            return Ok(Grid::new(GridKind::Summary, Vec::new()));
        };

        let mut env = BBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y);
        if let Some(b) = &self.bounds {
            if !env.intersects(b) {
                return Ok(Grid::new(GridKind::Summary, Vec::new()));
            }
            env = BBox::new(
                env.min_x.max(b.min_x),
                env.min_y.max(b.min_y),
                env.max_x.min(b.max_x),
                env.max_y.min(b.max_y),
            );
        }

        let size = self.tile_size();
        let cells = CellIterator::new(
            ((env.min_x - self.origin_x) / size).floor() as i64,
            ((env.max_x - self.origin_x) / size).ceil() as i64,
            ((env.min_y - self.origin_y) / size).floor() as i64,
            ((env.max_y - self.origin_y) / size).ceil() as i64,
        );

        let mut tiles = Vec::new();
        for (column, row) in cells {
            let bbox = self.cell_bbox(column, row);
            if let Some(b) = &self.bounds {
                if !b.intersects(&bbox) {
                    continue;
                }
            }
            if !bbox.to_polygon().intersects(&region) {
                continue;
            }
            let tile = Tile::new(TileKey::from_ints(column, row), self.cell_geobox(column, row))
                .with_clip(polygons_near(&region, &bbox));
            tiles.push(tile);
        }
        debug!("Summary grid: {} tiles", tiles.len());
        Ok(Grid::new(GridKind::Summary, tiles))
    }
}

/// Row-major iterator over a half-open range of cell indices
struct CellIterator {
    col_start: i64,
    col_end: i64,
    row_end: i64,
    current_col: i64,
    current_row: i64,
}

impl CellIterator {
    fn new(col_start: i64, col_end: i64, row_start: i64, row_end: i64) -> Self {
        Self {
            col_start,
            col_end,
            row_end,
            current_col: col_start,
            current_row: row_start,
        }
    }
}

impl Iterator for CellIterator {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.col_start >= self.col_end || self.current_row >= self.row_end {
            return None;
        }
        let cell = (self.current_col, self.current_row);
        self.current_col += 1;
        if self.current_col >= self.col_end {
            self.current_col = self.col_start;
            self.current_row += 1;
        }
        Some(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_spec() -> SummaryGridSpec {
        SummaryGridSpec {
            crs: Crs::pdc_mercator(),
            origin_x: 0.0,
            origin_y: 0.0,
            resolution: 10.0,
            tile_pixels: 100,
            bounds: None,
        }
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![BBox::new(x0, y0, x1, y1).to_polygon()])
    }

    #[test]
    fn test_cell_iterator() {
        let cells: Vec<_> = CellIterator::new(0, 2, 5, 7).collect();
        assert_eq!(cells, vec![(0, 5), (1, 5), (0, 6), (1, 6)]);
        assert_eq!(CellIterator::new(3, 3, 0, 5).count(), 0);
    }

    #[test]
    fn test_cell_geobox() {
        let gb = small_spec().cell_geobox(2, -1);
        assert_eq!(gb.shape(), (100, 100));
        let ext = gb.extent();
        assert_relative_eq!(ext.min_x, 2000.0);
        assert_relative_eq!(ext.max_y, 0.0);
        assert_relative_eq!(ext.min_y, -1000.0);
    }

    #[test]
    fn test_region_spanning_cells() {
        let spec = small_spec();
        let grid = spec
            .build(&square(500.0, 500.0, 1500.0, 1200.0), &spec.crs)
            .unwrap();
        let keys: Vec<_> = grid.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["(0, 0)", "(0, 1)", "(1, 0)", "(1, 1)"]);
        assert!(grid.iter().all(|t| t.clip.is_some()));
    }

    #[test]
    fn test_deterministic() {
        let spec = small_spec();
        let region = square(0.0, 0.0, 2500.0, 900.0);
        let a: Vec<_> = spec.build(&region, &spec.crs).unwrap().keys().cloned().collect();
        let b: Vec<_> = spec.build(&region, &spec.crs).unwrap().keys().cloned().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_region_outside_bounds_yields_no_tiles() {
        let spec = SummaryGridSpec {
            bounds: Some(BBox::new(0.0, 0.0, 5000.0, 5000.0)),
            ..small_spec()
        };
        let grid = spec
            .build(&square(-9000.0, -9000.0, -8000.0, -8000.0), &spec.crs)
            .unwrap();
        assert!(grid.is_empty());
    }

    #[test]
    fn test_empty_region_yields_no_tiles() {
        let spec = small_spec();
        let grid = spec.build(&MultiPolygon::new(vec![]), &spec.crs).unwrap();
        assert_eq!(grid.len(), 0);
    }

    #[test]
    fn test_invalid_spec() {
        let spec = SummaryGridSpec {
            tile_pixels: 0,
            ..small_spec()
        };
        assert!(spec.build(&square(0.0, 0.0, 1.0, 1.0), &spec.crs).is_err());
    }
}
