//! Observations and their loaded bands

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::raster::{BBox, GeoBox, Raster};

/// One acquisition as returned by a catalog search.
///
/// `assets` maps band names (`red`, `qa_pixel`, ...) to their hrefs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub collection: Option<String>,
    pub datetime: DateTime<Utc>,
    pub bbox: Option<BBox>,
    pub assets: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Observation {
    pub fn new(id: impl Into<String>, datetime: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            collection: None,
            datetime,
            bbox: None,
            assets: BTreeMap::new(),
            properties: Map::new(),
        }
    }

    /// Builder-style asset registration
    pub fn with_asset(mut self, band: impl Into<String>, href: impl Into<String>) -> Self {
        self.assets.insert(band.into(), href.into());
        self
    }

    pub fn href(&self, band: &str) -> Option<&str> {
        self.assets.get(band).map(String::as_str)
    }

    /// A string property, if present
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// Bands of one observation loaded onto a common geobox.
///
/// Every band is stored as `f32` with NaN as no-data, whatever the source
/// sample type was. 16-bit digital numbers are exact in `f32`.
#[derive(Debug, Clone)]
pub struct BandSet {
    observation_id: String,
    datetime: DateTime<Utc>,
    geobox: GeoBox,
    bands: BTreeMap<String, Raster<f32>>,
}

impl BandSet {
    pub fn new(observation_id: impl Into<String>, datetime: DateTime<Utc>, geobox: GeoBox) -> Self {
        Self {
            observation_id: observation_id.into(),
            datetime,
            geobox,
            bands: BTreeMap::new(),
        }
    }

    pub fn observation_id(&self) -> &str {
        &self.observation_id
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.datetime
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }

    /// Add a band; it must lie on the band set's geobox.
    pub fn insert(&mut self, name: impl Into<String>, band: Raster<f32>) -> Result<()> {
        if band.geobox() != &self.geobox {
            return Err(Error::GeoBoxMismatch(
                self.geobox.to_string(),
                band.geobox().to_string(),
            ));
        }
        self.bands.insert(name.into(), band);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Raster<f32>> {
        self.bands.get(name)
    }

    /// A band that must be present
    pub fn require(&self, name: &str) -> Result<&Raster<f32>> {
        self.get(name)
            .ok_or_else(|| Error::MissingBand(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}
