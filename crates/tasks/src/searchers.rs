//! Catalog-backed and fixed-item searchers

use std::sync::Arc;

use tracing::debug;
use wofs_cloud::{ItemSearch, StacClientBlocking};
use wofs_core::Observation;
use wofs_grid::Tile;

use crate::error::{Result, TaskError};
use crate::stages::Searcher;

/// How a tile is turned into a catalog query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchArea {
    /// Intersect the tile's WGS84 envelope (split at the antimeridian)
    Bounds,
    /// Match `landsat:wrs_path`/`landsat:wrs_row` against the tile key
    LandsatPathRow,
}

/// Searches a STAC catalog for the observations covering a tile
pub struct StacSearcher {
    client: Arc<StacClientBlocking>,
    collections: Vec<String>,
    datetime: Option<String>,
    area: SearchArea,
    exclude_platforms: Vec<String>,
    alternate: Option<String>,
}

impl StacSearcher {
    pub fn new<S: AsRef<str>>(client: Arc<StacClientBlocking>, collections: &[S]) -> Self {
        Self {
            client,
            collections: collections.iter().map(|c| c.as_ref().to_string()).collect(),
            datetime: None,
            area: SearchArea::Bounds,
            exclude_platforms: Vec::new(),
            alternate: None,
        }
    }

    pub fn datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    pub fn area(mut self, area: SearchArea) -> Self {
        self.area = area;
        self
    }

    pub fn exclude_platforms<S: AsRef<str>>(mut self, platforms: &[S]) -> Self {
        self.exclude_platforms = platforms.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    /// Use the `alternate.<name>.href` of each asset when present
    pub fn alternate(mut self, name: impl Into<String>) -> Self {
        self.alternate = Some(name.into());
        self
    }

    /// The catalog query for `tile`
    pub fn query(&self, tile: &Tile) -> Result<ItemSearch> {
        let mut search = ItemSearch::new(self.collections.as_slice()).exclude_platforms(self.exclude_platforms.as_slice());
        if let Some(dt) = &self.datetime {
            search = search.datetime(dt.clone());
        }
        search = match self.area {
            SearchArea::Bounds => search.bboxes(tile.geobox.wgs84_bboxes()?),
            SearchArea::LandsatPathRow => {
                let parse = |part: &str| {
                    part.parse::<u32>()
                        .map_err(|_| TaskError::UnknownTile(tile.key.to_string()))
                };
                search.landsat_path_row(parse(tile.key.first())?, parse(tile.key.second())?)
            }
        };
        Ok(search)
    }
}

impl Searcher for StacSearcher {
    fn search(&self, tile: &Tile) -> Result<Vec<Observation>> {
        let search = self.query(tile)?;
        let items = self.client.search_items(&search)?;
        let mut observations = items
            .iter()
            .map(|item| item.to_observation(self.alternate.as_deref()))
            .collect::<wofs_cloud::Result<Vec<_>>>()?;
        observations.sort_by(|a, b| a.datetime.cmp(&b.datetime).then_with(|| a.id.cmp(&b.id)));
        debug!("Tile {}: catalog returned {} items", tile.key, observations.len());
        Ok(observations)
    }
}

/// Yields one fixed observation regardless of the tile
#[derive(Debug, Clone)]
pub struct ItemSearcher {
    observation: Observation,
}

impl ItemSearcher {
    pub fn new(observation: Observation) -> Self {
        Self { observation }
    }
}

impl Searcher for ItemSearcher {
    fn search(&self, _tile: &Tile) -> Result<Vec<Observation>> {
        Ok(vec![self.observation.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wofs_cloud::{StacCatalog, StacClientOptions};
    use wofs_core::{Crs, GeoBox};
    use wofs_grid::TileKey;

    fn client() -> Arc<StacClientBlocking> {
        Arc::new(StacClientBlocking::new(StacCatalog::LandsatLook, StacClientOptions::default()).unwrap())
    }

    fn tile(key: TileKey) -> Tile {
        let gb = GeoBox::new(100, 100, 1_900_000.0, -1_900_000.0, 30.0, -30.0, Crs::pdc_mercator());
        Tile::new(key, gb)
    }

    #[test]
    fn path_row_query() {
        let searcher = StacSearcher::new(client(), &["landsat-c2l2-sr"])
            .datetime("2023")
            .area(SearchArea::LandsatPathRow)
            .exclude_platforms(&["landsat-7"]);
        let search = searcher.query(&tile(TileKey::from_ints(73, 72))).unwrap();
        let requests = search.requests(100);
        assert_eq!(requests.len(), 1);
        let query = requests[0].query.as_ref().unwrap();
        assert_eq!(query["landsat:wrs_path"]["eq"], "073");
        assert_eq!(query["landsat:wrs_row"]["eq"], "072");
    }

    #[test]
    fn path_row_needs_numeric_key() {
        let searcher = StacSearcher::new(client(), &["landsat-c2l2-sr"]).area(SearchArea::LandsatPathRow);
        assert!(matches!(
            searcher.query(&tile(TileKey::new("FJ", "1"))),
            Err(TaskError::UnknownTile(_))
        ));
    }

    #[test]
    fn bounds_query_uses_tile_envelope() {
        let searcher = StacSearcher::new(client(), &["cop-dem-glo-30"]);
        let search = searcher.query(&tile(TileKey::from_ints(0, 0))).unwrap();
        assert!(!search.requests(100).is_empty());
        assert!(search.requests(100)[0].bbox.is_some());
    }

    #[test]
    fn item_searcher_returns_its_item() {
        let obs = Observation::new("LC09_L2SP_073072_20230501_02_T1", Utc::now());
        let found = ItemSearcher::new(obs.clone()).search(&tile(TileKey::from_ints(1, 1))).unwrap();
        assert_eq!(found, vec![obs]);
    }
}
