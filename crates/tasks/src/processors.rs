//! Processors for the three products: daily WOFLs, annual summaries and the
//! full-history summary

use tracing::debug;
use wofs_algorithms::summary::aggregate::{COUNT_CLEAR, COUNT_NODATA, COUNT_WET, FREQUENCY, FREQUENCY_MASKED};
use wofs_algorithms::summary::{full_history, mask_outside, SummaryAccumulator, WofsSummary};
use wofs_algorithms::wofl::{classify, WoflParams};
use wofs_core::{BandSet, Dataset, Raster};
use wofs_grid::Tile;

use crate::elevation::ElevationCache;
use crate::error::{Result, TaskError};
use crate::stages::{BandStream, Processor};

/// Name of the WOFL output variable
pub const WATER: &str = "water";

fn dem<'c>(cache: &'c mut Option<ElevationCache>, tile: &Tile) -> Result<Option<&'c Raster<f32>>> {
    match cache {
        Some(cache) => Ok(Some(cache.get(&tile.geobox)?)),
        None => Ok(None),
    }
}

/// Adds `frequency_masked` when the tile carries a land clip
fn with_land_mask(summary: WofsSummary, tile: &Tile) -> Result<Dataset> {
    let masked = match &tile.clip {
        Some(land) => Some(mask_outside(&summary.frequency, &tile.geobox.extent(), land)?),
        None => None,
    };
    let mut dataset = summary.into_dataset()?;
    if let Some(masked) = masked {
        dataset.insert(FREQUENCY_MASKED, masked)?;
    }
    Ok(dataset)
}

/// One observation in, one `water` flag layer out
pub struct WoflProcessor {
    params: WoflParams,
    elevation: Option<ElevationCache>,
}

impl WoflProcessor {
    pub fn new(params: WoflParams) -> Self {
        Self {
            params,
            elevation: None,
        }
    }

    /// Flag steep terrain using DEMs from `cache`
    pub fn with_elevation(mut self, cache: ElevationCache) -> Self {
        self.elevation = Some(cache);
        self
    }

    pub fn elevation(&self) -> Option<&ElevationCache> {
        self.elevation.as_ref()
    }
}

impl Processor for WoflProcessor {
    fn process(&mut self, mut bands: BandStream<'_>, tile: &Tile) -> Result<Dataset> {
        let bandset = bands
            .next()
            .ok_or_else(|| TaskError::Processing("a WOFL needs one observation, got none".into()))??;
        if bands.next().is_some() {
            return Err(TaskError::Processing(
                "a WOFL needs exactly one observation, got several".into(),
            ));
        }
        let elevation = dem(&mut self.elevation, tile)?;
        let water = classify(&bandset, elevation, &self.params)?;
        Ok(Dataset::new(tile.geobox.clone()).with(WATER, water)?)
    }
}

/// Classifies every observation of a period and summarizes the results
pub struct WofsSummaryProcessor {
    params: WoflParams,
    elevation: Option<ElevationCache>,
}

impl WofsSummaryProcessor {
    pub fn new(params: WoflParams) -> Self {
        Self {
            params,
            elevation: None,
        }
    }

    pub fn with_elevation(mut self, cache: ElevationCache) -> Self {
        self.elevation = Some(cache);
        self
    }
}

impl Processor for WofsSummaryProcessor {
    fn process(&mut self, bands: BandStream<'_>, tile: &Tile) -> Result<Dataset> {
        let elevation = dem(&mut self.elevation, tile)?;
        let mut acc = SummaryAccumulator::new(tile.geobox.clone());
        for bandset in bands {
            let wofl = classify(&bandset?, elevation, &self.params)?;
            acc.add(&wofl)?;
        }
        debug!("Tile {}: summarized {} observations", tile.key, acc.steps());
        with_land_mask(acc.finish()?, tile)
    }
}

/// Sums annual `count_clear`/`count_wet` layers into an all-time summary
#[derive(Debug, Clone, Copy, Default)]
pub struct FullHistoryProcessor;

fn counts(bandset: &BandSet, name: &str) -> Result<Raster<i16>> {
    let band = bandset.require(name)?;
    Ok(band
        .map(|v| {
            if v.is_nan() || band.is_nodata(v) {
                COUNT_NODATA
            } else {
                v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
            }
        })
        .with_nodata(Some(COUNT_NODATA)))
}

impl Processor for FullHistoryProcessor {
    fn process(&mut self, bands: BandStream<'_>, tile: &Tile) -> Result<Dataset> {
        let annual = bands
            .map(|b| {
                let b = b?;
                Ok((counts(&b, COUNT_CLEAR)?, counts(&b, COUNT_WET)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let summary = full_history(&tile.geobox, &annual)?;
        with_land_mask(summary, tile)
    }
}

/// Variables a summary dataset is written with, in order
pub fn summary_variables(masked: bool) -> Vec<&'static str> {
    let mut names = vec![COUNT_CLEAR, COUNT_WET, FREQUENCY];
    if masked {
        names.push(FREQUENCY_MASKED);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::ElevationSource;
    use chrono::Utc;
    use geo_types::MultiPolygon;
    use wofs_algorithms::wofl::flags::{NODATA, WATER as WATER_FLAG};
    use wofs_algorithms::wofl::REQUIRED_BANDS;
    use wofs_core::{BBox, Crs, GeoBox, Variable};
    use wofs_grid::TileKey;

    fn gb() -> GeoBox {
        GeoBox::new(3, 3, 0.0, 90.0, 30.0, -30.0, Crs::pdc_mercator())
    }

    fn tile() -> Tile {
        Tile::new(TileKey::from_ints(7, 8), gb())
    }

    /// Reflectance already scaled: a clear water pixel everywhere
    fn water_bands(id: &str) -> BandSet {
        let values = [1000.0, 800.0, 500.0, 500.0, 500.0, 100.0];
        let mut set = BandSet::new(id, Utc::now(), gb());
        for (name, v) in REQUIRED_BANDS.iter().zip(values) {
            set.insert(*name, Raster::filled(gb(), v)).unwrap();
        }
        set
    }

    fn unscaled() -> WoflParams {
        WoflParams {
            c2_scaling: false,
            ..WoflParams::default()
        }
    }

    fn stream(sets: Vec<BandSet>) -> BandStream<'static> {
        Box::new(sets.into_iter().map(Ok))
    }

    #[test]
    fn wofl_from_one_observation() {
        let ds = WoflProcessor::new(unscaled())
            .process(stream(vec![water_bands("a")]), &tile())
            .unwrap();
        let water = ds.get(WATER).and_then(Variable::as_u8).unwrap();
        assert_eq!(water.get(1, 1).unwrap(), WATER_FLAG);
        assert_eq!(water.nodata(), Some(NODATA));
    }

    #[test]
    fn wofl_rejects_several_observations() {
        let err = WoflProcessor::new(unscaled())
            .process(stream(vec![water_bands("a"), water_bands("b")]), &tile())
            .unwrap_err();
        assert!(matches!(err, TaskError::Processing(_)));
    }

    #[test]
    fn wofl_missing_band_fails() {
        let set = BandSet::new("a", Utc::now(), gb());
        assert!(WoflProcessor::new(unscaled()).process(stream(vec![set]), &tile()).is_err());
    }

    struct Flat;
    impl ElevationSource for Flat {
        fn elevation(&self, geobox: &GeoBox) -> Result<Raster<f32>> {
            Ok(Raster::filled(geobox.clone(), 5.0))
        }
    }

    #[test]
    fn cache_is_reused_across_observations() {
        let mut processor = WoflProcessor::new(unscaled()).with_elevation(ElevationCache::new(Box::new(Flat)));
        processor.process(stream(vec![water_bands("a")]), &tile()).unwrap();
        processor.process(stream(vec![water_bands("b")]), &tile()).unwrap();
        assert_eq!(processor.elevation().map(ElevationCache::fetches), Some(1));
    }

    #[test]
    fn summary_counts_and_mask() {
        let land = MultiPolygon::new(vec![BBox::new(0.0, 0.0, 45.0, 90.0).to_polygon()]);
        let tile = tile().with_clip(land);
        let ds = WofsSummaryProcessor::new(unscaled())
            .process(stream(vec![water_bands("a"), water_bands("b")]), &tile)
            .unwrap();
        assert_eq!(ds.names().collect::<Vec<_>>(), summary_variables(true));

        let clear = ds.get(COUNT_CLEAR).and_then(Variable::as_i16).unwrap();
        assert_eq!(clear.get(0, 0).unwrap(), 2);
        let freq = ds.get(FREQUENCY).and_then(Variable::as_f32).unwrap();
        assert_eq!(freq.get(0, 2).unwrap(), 1.0);
        let masked = ds.get(FREQUENCY_MASKED).and_then(Variable::as_f32).unwrap();
        assert_eq!(masked.get(0, 0).unwrap(), 1.0);
        assert!(masked.get(0, 2).unwrap().is_nan());
    }

    #[test]
    fn summary_without_clip_has_no_masked_layer() {
        let ds = WofsSummaryProcessor::new(unscaled())
            .process(stream(vec![water_bands("a")]), &tile())
            .unwrap();
        assert_eq!(ds.names().collect::<Vec<_>>(), summary_variables(false));
    }

    #[test]
    fn summary_stops_at_the_first_unreadable_observation() {
        let pulled = std::cell::Cell::new(0);
        let bands: BandStream<'_> = Box::new((0..3).map(|i| {
            pulled.set(pulled.get() + 1);
            if i == 1 {
                Err(TaskError::Processing("corrupt asset".into()))
            } else {
                Ok(water_bands("a"))
            }
        }));
        let err = WofsSummaryProcessor::new(unscaled()).process(bands, &tile()).unwrap_err();
        assert!(matches!(err, TaskError::Processing(_)));
        assert_eq!(pulled.get(), 2);
    }

    fn annual(clear: f32, wet: f32) -> BandSet {
        let mut set = BandSet::new("annual", Utc::now(), gb());
        set.insert(COUNT_CLEAR, Raster::filled(gb(), clear)).unwrap();
        set.insert(COUNT_WET, Raster::filled(gb(), wet)).unwrap();
        set
    }

    #[test]
    fn full_history_sums_years() {
        let ds = FullHistoryProcessor
            .process(
                stream(vec![annual(10.0, 2.0), annual(6.0, 6.0), annual(f32::NAN, f32::NAN)]),
                &tile(),
            )
            .unwrap();
        let clear = ds.get(COUNT_CLEAR).and_then(Variable::as_i16).unwrap();
        let wet = ds.get(COUNT_WET).and_then(Variable::as_i16).unwrap();
        let freq = ds.get(FREQUENCY).and_then(Variable::as_f32).unwrap();
        assert_eq!(clear.get(1, 1).unwrap(), 16);
        assert_eq!(wet.get(1, 1).unwrap(), 8);
        assert_eq!(freq.get(1, 1).unwrap(), 0.5);
    }
}
