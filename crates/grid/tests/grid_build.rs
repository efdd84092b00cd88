//! Building grids from GeoJSON sources on disk

use std::fs;
use wofs_core::Crs;
use wofs_grid::boundary::{load_boundary, load_features};
use wofs_grid::{GridKind, SceneGridSpec, SummaryGridSpec, TileKey};

const LAND: &str = r#"{"type": "FeatureCollection", "features": [
  {"type": "Feature", "properties": {"name": "Viti Levu"},
   "geometry": {"type": "Polygon", "coordinates":
     [[[177.2,-18.3],[178.7,-18.3],[178.7,-17.3],[177.2,-17.3],[177.2,-18.3]]]}}
]}"#;

const WRS2: &str = r#"{"type": "FeatureCollection", "features": [
  {"type": "Feature", "properties": {"PATH": 74, "ROW": 72},
   "geometry": {"type": "Polygon", "coordinates":
     [[[176.5,-19.0],[178.0,-19.0],[178.0,-17.0],[176.5,-17.0],[176.5,-19.0]]]}},
  {"type": "Feature", "properties": {"PATH": 100, "ROW": 20},
   "geometry": {"type": "Polygon", "coordinates":
     [[[100.0,50.0],[101.0,50.0],[101.0,51.0],[100.0,51.0],[100.0,50.0]]]}}
]}"#;

#[test]
fn summary_grid_covers_land() {
    let dir = tempfile::tempdir().unwrap();
    let land_path = dir.path().join("land.geojson");
    fs::write(&land_path, LAND).unwrap();
    let land = load_boundary(&land_path).unwrap();

    let grid = SummaryGridSpec::default().build(&land, &Crs::wgs84()).unwrap();
    assert_eq!(grid.kind(), GridKind::Summary);
    assert!(!grid.is_empty());
    // 1.5 degrees of longitude is about 160 km; 96 km tiles need 2 or 3 columns.
    assert!(grid.len() >= 2 && grid.len() <= 9, "got {} tiles", grid.len());
    for tile in grid.iter() {
        assert_eq!(tile.geobox.shape(), (3200, 3200));
        assert_eq!(tile.geobox.crs(), &Crs::pdc_mercator());
    }
}

#[test]
fn scene_grid_keeps_only_land_footprints() {
    let dir = tempfile::tempdir().unwrap();
    let land_path = dir.path().join("land.geojson");
    let wrs_path = dir.path().join("wrs2.geojson");
    fs::write(&land_path, LAND).unwrap();
    fs::write(&wrs_path, WRS2).unwrap();

    let land = load_boundary(&land_path).unwrap();
    let footprints = load_features(&wrs_path).unwrap();
    let grid = SceneGridSpec::default()
        .build(&footprints, Some((&land, &Crs::wgs84())))
        .unwrap();
    let keys: Vec<_> = grid.keys().cloned().collect();
    assert_eq!(keys, vec![TileKey::from_ints(74, 72)]);
}
