//! Output dtype conversion and metadata stamping

use serde_json::{Map, Value};
use wofs_core::{Dataset, Observation, Raster, Variable};

use crate::error::Result;
use crate::stages::PostProcessor;

/// Attribute holding the properties that end up in the item sidecar
pub const STAC_PROPERTIES: &str = "stac_properties";

/// Fixed-point factor for fractional layers written as `int16`
pub const INT16_MULTIPLIER: f32 = 100.0;
pub const INT16_NODATA: i16 = -32767;

/// `round(v * multiplier)` as `int16`; NaN becomes `nodata`
pub fn to_fixed_point(raster: &Raster<f32>, multiplier: f32, nodata: i16) -> Raster<i16> {
    raster
        .map(|v| {
            if v.is_nan() || raster.is_nodata(v) {
                nodata
            } else {
                (v * multiplier).round().clamp(i16::MIN as f32 + 1.0, i16::MAX as f32) as i16
            }
        })
        .with_nodata(Some(nodata))
}

fn datetime_range(observations: &[Observation]) -> Option<(String, String)> {
    let start = observations.iter().map(|o| o.datetime).min()?;
    let end = observations.iter().map(|o| o.datetime).max()?;
    Some((start.to_rfc3339(), end.to_rfc3339()))
}

/// Converts float layers to fixed point and stamps sidecar properties
#[derive(Debug, Clone)]
pub struct StandardPostProcessor {
    pub convert_to_int16: bool,
    pub multiplier: f32,
    pub nodata: i16,
    pub extra_attrs: Map<String, Value>,
}

impl Default for StandardPostProcessor {
    fn default() -> Self {
        Self {
            convert_to_int16: true,
            multiplier: INT16_MULTIPLIER,
            nodata: INT16_NODATA,
            extra_attrs: Map::new(),
        }
    }
}

impl StandardPostProcessor {
    pub fn new(convert_to_int16: bool) -> Self {
        Self {
            convert_to_int16,
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_attrs.insert(key.into(), value.into());
        self
    }
}

impl PostProcessor for StandardPostProcessor {
    fn post_process(&self, dataset: Dataset, observations: &[Observation]) -> Result<Dataset> {
        let mut out = Dataset::new(dataset.geobox().clone());
        for (name, var) in dataset.iter() {
            match var {
                Variable::F32(r) if self.convert_to_int16 => {
                    out.insert(name, to_fixed_point(r, self.multiplier, self.nodata))?
                }
                other => out.insert(name, other.clone())?,
            }
        }
        *out.attrs_mut() = dataset.attrs().clone();

        let mut props = match out.attrs().get(STAC_PROPERTIES) {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        };
        props.extend(self.extra_attrs.clone());
        if let Some((start, end)) = datetime_range(observations) {
            props.entry("start_datetime").or_insert(Value::from(start));
            props.entry("end_datetime").or_insert(Value::from(end));
        }
        if self.convert_to_int16 {
            props.insert("dep:int16_multiplier".into(), Value::from(self.multiplier));
        }
        out.set_attr(STAC_PROPERTIES, props);
        Ok(out)
    }
}

/// For daily products: the source item's properties are carried over and
/// the start and end datetimes are pinned to the acquisition time.
#[derive(Debug, Clone)]
pub struct DailyPostProcessor {
    inner: StandardPostProcessor,
}

impl DailyPostProcessor {
    pub fn new(inner: StandardPostProcessor) -> Self {
        Self { inner }
    }
}

impl PostProcessor for DailyPostProcessor {
    fn post_process(&self, dataset: Dataset, observations: &[Observation]) -> Result<Dataset> {
        let mut out = self.inner.post_process(dataset, observations)?;
        let Some(observation) = observations.first() else {
            return Ok(out);
        };
        let mut props = match out.attrs().get(STAC_PROPERTIES) {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        };
        props.extend(observation.properties.clone());
        let datetime = match props.get("datetime") {
            Some(Value::String(s)) => s.clone(),
            _ => observation.datetime.to_rfc3339(),
        };
        props.insert("datetime".into(), Value::from(datetime.clone()));
        props.insert("start_datetime".into(), Value::from(datetime.clone()));
        props.insert("end_datetime".into(), Value::from(datetime));
        out.set_attr(STAC_PROPERTIES, props);
        Ok(out)
    }
}
