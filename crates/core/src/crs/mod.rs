//! Coordinate Reference System handling
//!
//! Only EPSG-coded systems are modelled. Transformations between the
//! systems the engine meets in practice (WGS84, UTM zones and the Mercator
//! variants used for the Pacific grids) live in [`reproject`].

pub mod reproject;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Coordinate Reference System identified by its EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    epsg: u32,
}

impl Crs {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: code }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// WGS 84 / PDC Mercator (EPSG:3832), the projection of the Pacific grid
    pub fn pdc_mercator() -> Self {
        Self::from_epsg(3832)
    }

    /// EPSG code
    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        reproject::is_wgs84(self.epsg)
    }

    /// Whether [`reproject`] can transform to and from this CRS
    pub fn is_supported(&self) -> bool {
        reproject::Projection::from_epsg(self.epsg).is_some()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl FromStr for Crs {
    type Err = Error;

    /// Parse `"EPSG:3832"`, `"epsg:3832"` or a bare `"3832"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let code = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .unwrap_or(trimmed);
        code.parse::<u32>()
            .map(Self::from_epsg)
            .map_err(|_| Error::InvalidParameter {
                name: "crs",
                value: s.to_string(),
                reason: "expected an EPSG code".to_string(),
            })
    }
}
