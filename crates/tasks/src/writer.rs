//! GeoTIFF writer with a JSON item sidecar
//!
//! Every variable becomes `<basename>_<variable>.tif`. The sidecar
//! `<basename>.stac-item.json` lists those assets and is written last, so
//! its presence means the whole item is complete.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info};
use wofs_cloud::ObjectStore;
use wofs_core::io::write_geotiff_to_buffer;
use wofs_core::{BBox, Dataset};
use wofs_grid::Tile;

use crate::error::Result;
use crate::item_path::ItemPath;
use crate::post_process::STAC_PROPERTIES;
use crate::stages::Writer;

const GEOTIFF_MEDIA_TYPE: &str = "image/tiff; application=geotiff";

pub struct GeoTiffWriter {
    store: Arc<dyn ObjectStore>,
    collection: Option<String>,
}

impl GeoTiffWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            collection: None,
        }
    }

    /// Collection id recorded in the sidecar
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }
}

/// STAC bbox of the tile. Across the antimeridian west is greater than east.
fn stac_bbox(boxes: &[BBox]) -> Option<[f64; 4]> {
    let first = boxes.first()?;
    let last = boxes.last()?;
    let south = boxes.iter().map(|b| b.min_y).fold(f64::INFINITY, f64::min);
    let north = boxes.iter().map(|b| b.max_y).fold(f64::NEG_INFINITY, f64::max);
    Some([first.min_x, south, last.max_x, north])
}

/// The item sidecar for a written dataset
pub fn item_sidecar(
    dataset: &Dataset,
    tile: &Tile,
    item_path: &ItemPath,
    assets: &Map<String, Value>,
    collection: Option<&str>,
) -> Result<Value> {
    let mut properties = match dataset.attrs().get(STAC_PROPERTIES) {
        Some(Value::Object(m)) => m.clone(),
        _ => Map::new(),
    };
    let geobox = dataset.geobox();
    let (res_x, res_y) = geobox.resolution();
    let (origin_x, origin_y) = geobox.origin();
    properties.insert("proj:epsg".into(), json!(geobox.crs().epsg()));
    properties.insert("proj:shape".into(), json!([geobox.rows(), geobox.cols()]));
    properties.insert(
        "proj:transform".into(),
        json!([res_x, 0.0, origin_x, 0.0, res_y, origin_y]),
    );
    let (a, b) = tile.key.padded(3);
    properties.insert("dep:tile".into(), json!([a, b]));
    if !properties.contains_key("datetime") {
        let start = properties.get("start_datetime").cloned().unwrap_or(Value::Null);
        properties.insert("datetime".into(), start);
    }

    Ok(json!({
        "type": "Feature",
        "stac_version": "1.0.0",
        "id": item_path.basename(&tile.key),
        "collection": collection,
        "bbox": stac_bbox(&geobox.wgs84_bboxes()?),
        "geometry": Value::Null,
        "properties": properties,
        "assets": assets,
        "links": [],
    }))
}

impl Writer for GeoTiffWriter {
    fn write(&self, dataset: &Dataset, tile: &Tile, item_path: &ItemPath) -> Result<Vec<String>> {
        let mut paths = Vec::with_capacity(dataset.len() + 1);
        let mut assets = Map::new();
        for (name, var) in dataset.iter() {
            let bytes = write_geotiff_to_buffer(var)?;
            let key = item_path.path(&tile.key, name, "tif");
            let uri = self.store.put(&key, &bytes)?;
            debug!("Wrote {uri} ({} bytes)", bytes.len());
            assets.insert(
                name.to_string(),
                json!({
                    "href": uri,
                    "type": GEOTIFF_MEDIA_TYPE,
                    "roles": ["data"],
                    "raster:bands": [{"data_type": var.dtype(), "nodata": var.nodata()}],
                }),
            );
            paths.push(uri);
        }

        let sidecar = item_sidecar(dataset, tile, item_path, &assets, self.collection.as_deref())?;
        let uri = self
            .store
            .put(&item_path.stac_path(&tile.key), &serde_json::to_vec_pretty(&sidecar)?)?;
        info!("Tile {}: wrote {} assets and {uri}", tile.key, assets.len());
        paths.push(uri);
        Ok(paths)
    }
}
