//! Tiles and the grids that own them

use geo::{BoundingRect, Intersects};
use geo_types::MultiPolygon;
use std::collections::BTreeMap;
use wofs_core::{BBox, GeoBox};

use crate::key::TileKey;

/// Which family of grid a tile belongs to. Tasks never mix the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    /// Regular tiling in a projected CRS, keyed `(column, row)`
    Summary,
    /// Landsat WRS-2 footprints, keyed `(path, row)`
    Scene,
}

impl GridKind {
    /// Names of the two key parts, in key order
    pub fn key_names(&self) -> (&'static str, &'static str) {
        match self {
            Self::Summary => ("column", "row"),
            Self::Scene => ("path", "row"),
        }
    }
}

/// One addressable unit of work
#[derive(Debug, Clone)]
pub struct Tile {
    pub key: TileKey,
    pub geobox: GeoBox,
    /// Land geometry in the geobox CRS, used to mask summaries
    pub clip: Option<MultiPolygon<f64>>,
}

impl Tile {
    pub fn new(key: TileKey, geobox: GeoBox) -> Self {
        Self {
            key,
            geobox,
            clip: None,
        }
    }

    pub fn with_clip(mut self, clip: MultiPolygon<f64>) -> Self {
        self.clip = Some(clip);
        self
    }
}

/// An immutable set of tiles keyed by [`TileKey`]
#[derive(Debug, Clone)]
pub struct Grid {
    kind: GridKind,
    tiles: BTreeMap<TileKey, Tile>,
}

impl Grid {
    pub fn new(kind: GridKind, tiles: impl IntoIterator<Item = Tile>) -> Self {
        Self {
            kind,
            tiles: tiles.into_iter().map(|t| (t.key.clone(), t)).collect(),
        }
    }

    pub fn kind(&self) -> GridKind {
        self.kind
    }

    pub fn get(&self, key: &TileKey) -> Option<&Tile> {
        self.tiles.get(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &TileKey> {
        self.tiles.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// The tiles whose extent intersects `area` (same CRS as the tiles)
    pub fn intersecting(&self, area: &MultiPolygon<f64>) -> Grid {
        let tiles = self
            .tiles
            .values()
            .filter(|t| t.geobox.polygon().intersects(area))
            .cloned();
        Grid::new(self.kind, tiles)
    }
}

/// Polygons of `region` whose envelope touches `bbox`
pub(crate) fn polygons_near(region: &MultiPolygon<f64>, bbox: &BBox) -> MultiPolygon<f64> {
    let polys = region
        .0
        .iter()
        .filter(|p| {
            p.bounding_rect().is_some_and(|r| {
                bbox.intersects(&BBox::new(r.min().x, r.min().y, r.max().x, r.max().y))
            })
        })
        .cloned()
        .collect();
    MultiPolygon::new(polys)
}
