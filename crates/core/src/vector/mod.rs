//! Vector features read from GeoJSON
//!
//! Grids are built from polygon layers (tile footprints, WRS-2 path/rows)
//! and summaries are clipped by a land boundary; both arrive as GeoJSON.

use geo::MapCoords;
use geo_types::{Coord, Geometry, MultiPolygon};
use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::crs::{reproject, Crs};
use crate::error::{Error, Result};

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// The value rendered as text; numbers keep their shortest form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&Value> for AttributeValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: HashMap<String, AttributeValue>,
    pub id: Option<String>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Polygonal geometry of the feature
    pub fn multipolygon(&self) -> Result<MultiPolygon<f64>> {
        match &self.geometry {
            Some(g) => to_multipolygon(g),
            None => Err(Error::InvalidGeometry("feature has no geometry".into())),
        }
    }

    fn from_geojson(f: geojson::Feature) -> Result<Self> {
        let geometry = f
            .geometry
            .map(Geometry::<f64>::try_from)
            .transpose()?;
        let properties = f
            .properties
            .unwrap_or_default()
            .iter()
            .map(|(k, v)| (k.clone(), AttributeValue::from(v)))
            .collect();
        let id = f.id.map(|id| match id {
            geojson::feature::Id::String(s) => s,
            geojson::feature::Id::Number(n) => n.to_string(),
        });
        Ok(Self {
            geometry,
            properties,
            id,
        })
    }
}

/// Parse features from GeoJSON text (a collection, a feature or a bare geometry).
pub fn features_from_str(text: &str) -> Result<Vec<Feature>> {
    let gj: GeoJson = text.parse()?;
    match gj {
        GeoJson::FeatureCollection(fc) => fc.features.into_iter().map(Feature::from_geojson).collect(),
        GeoJson::Feature(f) => Ok(vec![Feature::from_geojson(f)?]),
        GeoJson::Geometry(g) => Ok(vec![Feature::new(Geometry::<f64>::try_from(g)?)]),
    }
}

/// Read features from a GeoJSON file.
pub fn read_features<P: AsRef<Path>>(path: P) -> Result<Vec<Feature>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    features_from_str(&text)
}

/// Collect the polygons of a geometry. Non-polygonal parts are an error.
pub fn to_multipolygon(geom: &Geometry<f64>) -> Result<MultiPolygon<f64>> {
    match geom {
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Ok(mp.clone()),
        Geometry::Rect(r) => Ok(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::GeometryCollection(gc) => {
            let mut polys = Vec::new();
            for g in gc.iter() {
                polys.extend(to_multipolygon(g)?.0);
            }
            Ok(MultiPolygon::new(polys))
        }
        other => Err(Error::InvalidGeometry(format!(
            "expected polygons, got {}",
            geo_type_name(other)
        ))),
    }
}

/// All polygons of a feature list merged into one multipolygon.
pub fn merge_polygons(features: &[Feature]) -> Result<MultiPolygon<f64>> {
    let mut polys = Vec::new();
    for f in features {
        polys.extend(f.multipolygon()?.0);
    }
    Ok(MultiPolygon::new(polys))
}

/// Reproject every coordinate of a multipolygon.
pub fn reproject_multipolygon(
    mp: &MultiPolygon<f64>,
    from: &Crs,
    to: &Crs,
) -> Result<MultiPolygon<f64>> {
    if from == to {
        return Ok(mp.clone());
    }
    mp.try_map_coords(|c: Coord<f64>| {
        let (x, y) = reproject::transform_point(from, to, c.x, c.y)?;
        Ok::<_, Error>(Coord { x, y })
    })
}

fn geo_type_name(g: &Geometry<f64>) -> &'static str {
    match g {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
