//! Capabilities a tile pipeline is assembled from
//!
//! Each stage is a small trait so tests (and alternative backends) can swap
//! any one of them without touching the others.

use wofs_cloud::{AssetSource, RasterLoader};
use wofs_core::{BandSet, Dataset, GeoBox, Observation};
use wofs_grid::Tile;

use crate::error::Result;
use crate::item_path::ItemPath;

/// Finds the observations covering a tile.
///
/// Nothing found is reported either as an empty list or as
/// [`TaskError::EmptyCollection`](crate::error::TaskError::EmptyCollection).
pub trait Searcher: Send + Sync {
    fn search(&self, tile: &Tile) -> Result<Vec<Observation>>;
}

/// Band sets in observation order, read as they are pulled
pub type BandStream<'a> = Box<dyn Iterator<Item = Result<BandSet>> + 'a>;

/// Reads observation bands onto a geobox.
///
/// Nothing is read until the stream is pulled, so a processor only ever
/// holds the observation it is working on.
pub trait Loader: Send + Sync {
    fn load<'a>(&'a self, observations: &'a [Observation], geobox: &'a GeoBox) -> BandStream<'a>;
}

/// Turns loaded bands into output variables.
///
/// Takes `&mut self` so a processor can own per-worker state such as an
/// elevation cache.
pub trait Processor {
    fn process(&mut self, bands: BandStream<'_>, tile: &Tile) -> Result<Dataset>;
}

/// Final dtype conversion and attribute stamping
pub trait PostProcessor: Send + Sync {
    fn post_process(&self, dataset: Dataset, observations: &[Observation]) -> Result<Dataset>;
}

/// Persists a dataset and returns the written paths
pub trait Writer: Send + Sync {
    fn write(&self, dataset: &Dataset, tile: &Tile, item_path: &ItemPath) -> Result<Vec<String>>;
}

impl<S: AssetSource> Loader for RasterLoader<S> {
    fn load<'a>(&'a self, observations: &'a [Observation], geobox: &'a GeoBox) -> BandStream<'a> {
        Box::new(
            observations
                .iter()
                .map(move |obs| Ok(self.load_observation(obs, geobox)?)),
        )
    }
}
