//! Elevation for terrain masking
//!
//! Each worker owns one [`ElevationCache`] through its processor. The cache
//! holds at most one DEM, keyed by exact geobox equality, because a worker
//! processes one tile at a time and consecutive observations of a tile share
//! its geobox.

use std::sync::Arc;

use tracing::debug;
use wofs_cloud::{AssetSource, RasterLoader, StacClientBlocking};
use wofs_core::{GeoBox, Raster};
use wofs_grid::Tile;

use crate::error::{Result, TaskError};
use crate::searchers::StacSearcher;
use crate::stages::Searcher;

pub const DEM_COLLECTION: &str = "cop-dem-glo-30";
pub const DEM_BAND: &str = "data";

/// Anything that can produce a DEM on a geobox
pub trait ElevationSource: Send + Sync {
    fn elevation(&self, geobox: &GeoBox) -> Result<Raster<f32>>;
}

/// Copernicus DEM tiles found through a STAC catalog and mosaicked onto the
/// requested geobox
pub struct StacElevation<S: AssetSource> {
    searcher: StacSearcher,
    loader: RasterLoader<S>,
}

impl<S: AssetSource> StacElevation<S> {
    pub fn new(client: Arc<StacClientBlocking>, collection: &str, loader: RasterLoader<S>) -> Self {
        Self {
            searcher: StacSearcher::new(client, &[collection]),
            loader,
        }
    }
}

impl<S: AssetSource> ElevationSource for StacElevation<S> {
    fn elevation(&self, geobox: &GeoBox) -> Result<Raster<f32>> {
        // Only the geobox matters for the query; the key is a placeholder.
        let probe = Tile::new(wofs_grid::TileKey::new("dem", "dem"), geobox.clone());
        let items = self.searcher.search(&probe)?;
        if items.is_empty() {
            return Err(TaskError::EmptyCollection(format!("no DEM items for {geobox}")));
        }
        Ok(self.loader.mosaic(&items, DEM_BAND, geobox)?)
    }
}

/// Single-entry DEM cache owned by one worker
pub struct ElevationCache {
    source: Box<dyn ElevationSource>,
    entry: Option<(GeoBox, Raster<f32>)>,
    fetches: usize,
}

impl ElevationCache {
    pub fn new(source: Box<dyn ElevationSource>) -> Self {
        Self {
            source,
            entry: None,
            fetches: 0,
        }
    }

    /// DEM on `geobox`, fetched unless the cached one has the same geobox
    pub fn get(&mut self, geobox: &GeoBox) -> Result<&Raster<f32>> {
        let hit = matches!(&self.entry, Some((cached, _)) if cached == geobox);
        if !hit {
            debug!("Elevation cache miss for {geobox}");
            let dem = self.source.elevation(geobox)?;
            self.fetches += 1;
            self.entry = Some((geobox.clone(), dem));
        }
        match &self.entry {
            Some((_, dem)) => Ok(dem),
            None => Err(TaskError::Processing("elevation cache is empty".into())),
        }
    }

    /// Number of times the source was read
    pub fn fetches(&self) -> usize {
        self.fetches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wofs_core::Crs;

    struct Flat(Arc<AtomicUsize>);

    impl ElevationSource for Flat {
        fn elevation(&self, geobox: &GeoBox) -> Result<Raster<f32>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Raster::filled(geobox.clone(), 10.0))
        }
    }

    fn gb(x: f64) -> GeoBox {
        GeoBox::new(4, 4, x, 120.0, 30.0, -30.0, Crs::pdc_mercator())
    }

    #[test]
    fn hit_on_identical_geobox() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cache = ElevationCache::new(Box::new(Flat(calls.clone())));
        cache.get(&gb(0.0)).unwrap();
        cache.get(&gb(0.0)).unwrap();
        assert_eq!(cache.fetches(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn miss_replaces_the_single_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cache = ElevationCache::new(Box::new(Flat(calls.clone())));
        cache.get(&gb(0.0)).unwrap();
        let dem = cache.get(&gb(120.0)).unwrap();
        assert_eq!(dem.geobox(), &gb(120.0));
        cache.get(&gb(0.0)).unwrap();
        assert_eq!(cache.fetches(), 3);
    }
}
