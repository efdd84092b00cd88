//! Scene grid: one tile per Landsat WRS-2 path/row footprint

use geo::{BoundingRect, Intersects};
use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wofs_core::vector::{reproject_multipolygon, Feature};
use wofs_core::{BBox, Crs, GeoBox};

use crate::error::{GridError, Result};
use crate::key::TileKey;
use crate::tile::{Grid, GridKind, Tile};

/// How footprints become tiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneGridSpec {
    /// CRS of the tile geoboxes
    pub crs: Crs,
    pub resolution: f64,
    /// CRS the footprint features are in
    pub footprint_crs: Crs,
    pub path_attribute: String,
    pub row_attribute: String,
}

impl Default for SceneGridSpec {
    fn default() -> Self {
        Self {
            crs: Crs::pdc_mercator(),
            resolution: 30.0,
            footprint_crs: Crs::wgs84(),
            path_attribute: "PATH".to_string(),
            row_attribute: "ROW".to_string(),
        }
    }
}

impl SceneGridSpec {
    /// Build tiles from footprint features, keeping those that touch
    /// `region` (in `region_crs`). With no region every footprint is kept.
    pub fn build(
        &self,
        footprints: &[Feature],
        region: Option<(&MultiPolygon<f64>, &Crs)>,
    ) -> Result<Grid> {
        if self.resolution.is_nan() || self.resolution <= 0.0 {
            return Err(GridError::InvalidParameter(format!(
                "resolution {} must be positive",
                self.resolution
            )));
        }
        let region = region
            .map(|(r, crs)| reproject_multipolygon(r, crs, &self.crs))
            .transpose()?;

        let mut tiles = Vec::new();
        for (index, feature) in footprints.iter().enumerate() {
            let key = TileKey::new(
                attribute(feature, index, &self.path_attribute)?,
                attribute(feature, index, &self.row_attribute)?,
            );
            let footprint =
                reproject_multipolygon(&feature.multipolygon()?, &self.footprint_crs, &self.crs)?;
            if let Some(region) = &region {
                if !footprint.intersects(region) {
                    continue;
                }
            }
            let Some(rect) = footprint.bounding_rect() else {
                continue;
            };
            let res = self.resolution;
            let snapped = BBox::new(
                (rect.min().x / res).floor() * res,
                (rect.min().y / res).floor() * res,
                (rect.max().x / res).ceil() * res,
                (rect.max().y / res).ceil() * res,
            );
            let geobox = GeoBox::from_bbox(&snapped, res, self.crs);
            tiles.push(Tile::new(key, geobox).with_clip(footprint));
        }
        debug!("Scene grid: {} tiles", tiles.len());
        Ok(Grid::new(GridKind::Scene, tiles))
    }
}

fn attribute(feature: &Feature, index: usize, name: &str) -> Result<String> {
    let value = feature.get_property(name);
    value
        .and_then(|v| v.as_i64().map(|n| n.to_string()).or_else(|| v.to_text()))
        .ok_or_else(|| GridError::MissingAttribute {
            index,
            attribute: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wofs_core::vector::{features_from_str, AttributeValue};

    const WRS2: &str = r#"{"type": "FeatureCollection", "features": [
      {"type": "Feature", "properties": {"PATH": 73, "ROW": 72},
       "geometry": {"type": "Polygon", "coordinates":
         [[[177.0,-18.5],[178.5,-18.5],[178.5,-17.0],[177.0,-17.0],[177.0,-18.5]]]}},
      {"type": "Feature", "properties": {"PATH": 10, "ROW": 10},
       "geometry": {"type": "Polygon", "coordinates":
         [[[-60.0,60.0],[-59.0,60.0],[-59.0,61.0],[-60.0,61.0],[-60.0,60.0]]]}}
    ]}"#;

    fn fiji() -> MultiPolygon<f64> {
        MultiPolygon::new(vec![BBox::new(177.5, -18.0, 178.0, -17.5).to_polygon()])
    }

    #[test]
    fn test_keys_from_attributes() {
        let features = features_from_str(WRS2).unwrap();
        let grid = SceneGridSpec::default().build(&features, None).unwrap();
        assert_eq!(grid.kind(), GridKind::Scene);
        assert_eq!(grid.len(), 2);
        let tile = grid.get(&TileKey::from_ints(73, 72)).unwrap();
        let (rx, ry) = tile.geobox.resolution();
        assert_eq!((rx, ry), (30.0, -30.0));
        assert_eq!(tile.geobox.origin().0 % 30.0, 0.0);
    }

    #[test]
    fn test_region_filter() {
        let features = features_from_str(WRS2).unwrap();
        let region = fiji();
        let grid = SceneGridSpec::default()
            .build(&features, Some((&region, &Crs::wgs84())))
            .unwrap();
        assert_eq!(grid.keys().cloned().collect::<Vec<_>>(), vec![TileKey::from_ints(73, 72)]);
    }

    #[test]
    fn test_region_outside_all_footprints() {
        let features = features_from_str(WRS2).unwrap();
        let nowhere = MultiPolygon::new(vec![BBox::new(10.0, 10.0, 11.0, 11.0).to_polygon()]);
        let grid = SceneGridSpec::default()
            .build(&features, Some((&nowhere, &Crs::wgs84())))
            .unwrap();
        assert!(grid.is_empty());
    }

    #[test]
    fn test_missing_attribute_is_error() {
        let mut features = features_from_str(WRS2).unwrap();
        features[1].set_property("ROW", AttributeValue::Null);
        let err = SceneGridSpec::default().build(&features, None).unwrap_err();
        assert!(matches!(err, GridError::MissingAttribute { index: 1, .. }));
    }
}
