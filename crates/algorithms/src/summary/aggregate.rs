//! Temporal WOFS summary
//!
//! Reduces a stack of WOFLs for one tile into per-pixel counts. Only the two
//! clear states are counted, so any masking flag takes a pixel out of the
//! denominator for that time step.

use ndarray::{Array2, Zip};
use wofs_core::raster::Raster;
use wofs_core::{Dataset, Error, GeoBox, Result};

use crate::wofl::flags::{is_clear, is_clear_wet};

/// No-data value written for count layers
pub const COUNT_NODATA: i16 = -999;

pub const COUNT_CLEAR: &str = "count_clear";
pub const COUNT_WET: &str = "count_wet";
pub const FREQUENCY: &str = "frequency";
pub const FREQUENCY_MASKED: &str = "frequency_masked";

/// Summary layers for one tile
#[derive(Debug, Clone)]
pub struct WofsSummary {
    pub count_clear: Raster<i16>,
    pub count_wet: Raster<i16>,
    /// `count_wet / count_clear`, NaN where nothing was clear
    pub frequency: Raster<f32>,
}

impl WofsSummary {
    /// Build a summary from existing counts, recomputing the frequency.
    pub fn from_counts(count_clear: Raster<i16>, count_wet: Raster<i16>) -> Result<Self> {
        let frequency = count_clear.zip_map(&count_wet, frequency_of)?;
        Ok(Self {
            count_clear: count_clear.with_nodata(Some(COUNT_NODATA)),
            count_wet: count_wet.with_nodata(Some(COUNT_NODATA)),
            frequency: frequency.with_nodata(Some(f32::NAN)),
        })
    }

    pub fn geobox(&self) -> &GeoBox {
        self.frequency.geobox()
    }

    /// The three layers as a dataset, in output order
    pub fn into_dataset(self) -> Result<Dataset> {
        Dataset::new(self.frequency.geobox().clone())
            .with(COUNT_CLEAR, self.count_clear)?
            .with(COUNT_WET, self.count_wet)?
            .with(FREQUENCY, self.frequency)
    }
}

fn frequency_of(clear: i16, wet: i16) -> f32 {
    if clear <= 0 || clear == COUNT_NODATA || wet == COUNT_NODATA {
        f32::NAN
    } else {
        wet as f32 / clear as f32
    }
}

/// Running per-pixel counts.
///
/// Adding layers is commutative and two accumulators over the same geobox
/// can be merged, so layers may be reduced in any order or in parallel.
#[derive(Debug, Clone)]
pub struct SummaryAccumulator {
    geobox: GeoBox,
    clear: Array2<u32>,
    wet: Array2<u32>,
    steps: usize,
}

impl SummaryAccumulator {
    pub fn new(geobox: GeoBox) -> Self {
        let shape = geobox.shape();
        Self {
            geobox,
            clear: Array2::zeros(shape),
            wet: Array2::zeros(shape),
            steps: 0,
        }
    }

    /// Number of layers added so far
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn check(&self, geobox: &GeoBox) -> Result<()> {
        if geobox != &self.geobox {
            return Err(Error::GeoBoxMismatch(self.geobox.to_string(), geobox.to_string()));
        }
        Ok(())
    }

    /// Count one WOFL time step.
    pub fn add(&mut self, wofl: &Raster<u8>) -> Result<()> {
        self.check(wofl.geobox())?;
        Zip::from(&mut self.clear)
            .and(&mut self.wet)
            .and(wofl.data())
            .for_each(|clear, wet, &flags| {
                if is_clear(flags) {
                    *clear += 1;
                    if is_clear_wet(flags) {
                        *wet += 1;
                    }
                }
            });
        self.steps += 1;
        Ok(())
    }

    /// Fold another accumulator's counts into this one.
    pub fn merge(mut self, other: SummaryAccumulator) -> Result<Self> {
        self.check(&other.geobox)?;
        self.clear += &other.clear;
        self.wet += &other.wet;
        self.steps += other.steps;
        Ok(self)
    }

    /// Convert to output layers; counts saturate at `i16::MAX`.
    pub fn finish(self) -> Result<WofsSummary> {
        let to_i16 = |v: &u32| (*v).min(i16::MAX as u32) as i16;
        let clear = Raster::from_array(self.clear.map(to_i16), self.geobox.clone())?;
        let wet = Raster::from_array(self.wet.map(to_i16), self.geobox)?;
        WofsSummary::from_counts(clear, wet)
    }
}

/// Summarize a time series of WOFLs that share `geobox`.
///
/// An empty series gives zero counts and an all-NaN frequency.
pub fn summarize(geobox: &GeoBox, wofls: &[Raster<u8>]) -> Result<WofsSummary> {
    let mut acc = SummaryAccumulator::new(geobox.clone());
    for wofl in wofls {
        acc.add(wofl)?;
    }
    acc.finish()
}
