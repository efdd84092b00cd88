//! Named collections of aligned rasters
//!
//! A [`Dataset`] is what processors hand to post-processors and writers:
//! a set of variables sharing one [`GeoBox`], plus free-form attributes
//! that end up in the item sidecar.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::raster::{GeoBox, Raster};

/// One variable of a dataset, tagged with its sample type
#[derive(Debug, Clone)]
pub enum Variable {
    U8(Raster<u8>),
    I16(Raster<i16>),
    F32(Raster<f32>),
}

impl Variable {
    pub fn geobox(&self) -> &GeoBox {
        match self {
            Self::U8(r) => r.geobox(),
            Self::I16(r) => r.geobox(),
            Self::F32(r) => r.geobox(),
        }
    }

    /// Sample type name as used in sidecar metadata
    pub fn dtype(&self) -> &'static str {
        match self {
            Self::U8(_) => "uint8",
            Self::I16(_) => "int16",
            Self::F32(_) => "float32",
        }
    }

    /// No-data value widened to f64, if any
    pub fn nodata(&self) -> Option<f64> {
        match self {
            Self::U8(r) => r.nodata().map(f64::from),
            Self::I16(r) => r.nodata().map(f64::from),
            Self::F32(r) => r.nodata().map(f64::from),
        }
    }

    pub fn as_u8(&self) -> Option<&Raster<u8>> {
        match self {
            Self::U8(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&Raster<i16>> {
        match self {
            Self::I16(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&Raster<f32>> {
        match self {
            Self::F32(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Raster<u8>> for Variable {
    fn from(r: Raster<u8>) -> Self {
        Self::U8(r)
    }
}

impl From<Raster<i16>> for Variable {
    fn from(r: Raster<i16>) -> Self {
        Self::I16(r)
    }
}

impl From<Raster<f32>> for Variable {
    fn from(r: Raster<f32>) -> Self {
        Self::F32(r)
    }
}

/// Aligned variables plus attributes. Variables keep insertion order.
#[derive(Debug, Clone)]
pub struct Dataset {
    geobox: GeoBox,
    variables: Vec<(String, Variable)>,
    attrs: Map<String, Value>,
}

impl Dataset {
    pub fn new(geobox: GeoBox) -> Self {
        Self {
            geobox,
            variables: Vec::new(),
            attrs: Map::new(),
        }
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }

    /// Add or replace a variable. Its geobox must match the dataset's.
    pub fn insert(&mut self, name: impl Into<String>, var: impl Into<Variable>) -> Result<()> {
        let var = var.into();
        if var.geobox() != &self.geobox {
            return Err(Error::GeoBoxMismatch(
                self.geobox.to_string(),
                var.geobox().to_string(),
            ));
        }
        let name = name.into();
        match self.variables.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = var,
            None => self.variables.push((name, var)),
        }
        Ok(())
    }

    /// Builder-style [`Dataset::insert`]
    pub fn with(mut self, name: impl Into<String>, var: impl Into<Variable>) -> Result<Self> {
        self.insert(name, var)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// A variable that must be present
    pub fn require(&self, name: &str) -> Result<&Variable> {
        self.get(name)
            .ok_or_else(|| Error::MissingBand(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        let idx = self.variables.iter().position(|(n, _)| n == name)?;
        Some(self.variables.remove(idx).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.variables.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.attrs
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attrs.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;

    fn gb(cols: usize) -> GeoBox {
        GeoBox::new(2, cols, 0.0, 60.0, 30.0, -30.0, Crs::pdc_mercator())
    }

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut ds = Dataset::new(gb(2));
        ds.insert("count_wet", Raster::<i16>::filled(gb(2), 1)).unwrap();
        ds.insert("count_clear", Raster::<i16>::filled(gb(2), 2)).unwrap();
        ds.insert("count_wet", Raster::<i16>::filled(gb(2), 5)).unwrap();

        let names: Vec<_> = ds.names().collect();
        assert_eq!(names, ["count_wet", "count_clear"]);
        let wet = ds.get("count_wet").and_then(Variable::as_i16).unwrap();
        assert_eq!(wet.get(0, 0).unwrap(), 5);
    }

    #[test]
    fn test_insert_rejects_misaligned() {
        let mut ds = Dataset::new(gb(2));
        let err = ds.insert("water", Raster::<u8>::new(gb(3))).unwrap_err();
        assert!(matches!(err, Error::GeoBoxMismatch(..)));
    }

    #[test]
    fn test_require_missing() {
        let ds = Dataset::new(gb(2));
        assert!(matches!(ds.require("frequency"), Err(Error::MissingBand(_))));
    }

    #[test]
    fn test_attrs() {
        let mut ds = Dataset::new(gb(1));
        ds.set_attr("start_datetime", "2020-01-01T00:00:00Z");
        assert_eq!(ds.attrs()["start_datetime"], "2020-01-01T00:00:00Z");
    }
}
