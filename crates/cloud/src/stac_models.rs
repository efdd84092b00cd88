//! STAC Item Search wire types
//!
//! Only what the engine reads is modelled: the search body, one page of
//! results with its `next` link, and the item fields that become an
//! [`Observation`]. Anything else in `properties` or on an asset is kept in
//! the flattened `extra` maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use wofs_core::{BBox, Observation};

use crate::error::{CloudError, Result};

/// JSON body of `POST /search`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    /// `[west, south, east, north]` in WGS84
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    /// RFC 3339 instant or `start/end` interval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    /// Query-extension filter, e.g. `{"landsat:wrs_path": {"eq": "073"}}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    /// Page size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl StacSearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collections<S: AsRef<str>>(mut self, collections: &[S]) -> Self {
        self.collections = collections.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.bbox = Some([west, south, east, north]);
        self
    }

    pub fn datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of search results
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(default)]
    pub features: Vec<StacItem>,
    #[serde(default)]
    pub links: Vec<StacLink>,
    #[serde(rename = "numberMatched", default, skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,
}

impl StacItemCollection {
    /// The `rel: next` link, when there are more pages
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    pub properties: StacItemProperties,
    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,
}

impl StacItem {
    /// Get an asset by key.
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// Acquisition time from `properties.datetime`.
    pub fn datetime(&self) -> Result<DateTime<Utc>> {
        let raw = self
            .properties
            .datetime
            .as_deref()
            .ok_or_else(|| CloudError::Parse(format!("item {} has no datetime", self.id)))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CloudError::Parse(format!("item {} datetime {raw:?}: {e}", self.id)))
    }

    /// Href of an asset, or of its `alternate.<name>` entry when asked for
    /// and present.
    pub fn asset_href(&self, key: &str, alternate: Option<&str>) -> Option<&str> {
        let asset = self.assets.get(key)?;
        alternate
            .and_then(|alt| asset.extra.get("alternate")?.get(alt)?.get("href")?.as_str())
            .or(Some(asset.href.as_str()))
    }

    /// Convert to the engine's observation record.
    pub fn to_observation(&self, alternate: Option<&str>) -> Result<Observation> {
        let mut obs = Observation::new(self.id.clone(), self.datetime()?);
        obs.collection = self.collection.clone();
        obs.bbox = self
            .bbox
            .as_ref()
            .filter(|b| b.len() >= 4)
            .map(|b| BBox::new(b[0], b[1], b[2], b[3]));
        obs.assets = self
            .assets
            .keys()
            .filter_map(|k| Some((k.clone(), self.asset_href(k, alternate)?.to_string())))
            .collect::<BTreeMap<_, _>>();
        let props = serde_json::to_value(&self.properties).map_err(|e| CloudError::Parse(e.to_string()))?;
        if let Value::Object(map) = props {
            obs.properties = map;
        }
        Ok(obs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    /// Used for platform exclusion (`LANDSAT_7`, `landsat-7`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,
    /// `type`, `roles`, `alternate` and friends
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Pagination link. `next` links may be POST with a body to merge into the
/// previous request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    pub rel: String,
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}
