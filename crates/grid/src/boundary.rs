//! Authoritative polygon sources (land boundary, WRS-2 footprints)
//!
//! A missing or unreadable source is always an error: a grid built from
//! nothing would silently schedule no work.

use geo_types::MultiPolygon;
use std::path::Path;
use tracing::info;
use wofs_core::vector::{merge_polygons, read_features, Feature};

use crate::error::{GridError, Result};

/// Read every feature of a GeoJSON polygon source.
pub fn load_features(path: &Path) -> Result<Vec<Feature>> {
    let features = read_features(path).map_err(|source| GridError::BoundarySource {
        path: path.to_path_buf(),
        source,
    })?;
    if features.is_empty() {
        return Err(GridError::EmptyBoundary(path.to_path_buf()));
    }
    info!("Loaded {} features from {}", features.len(), path.display());
    Ok(features)
}

/// Read a GeoJSON source and merge all its polygons.
pub fn load_boundary(path: &Path) -> Result<MultiPolygon<f64>> {
    let features = load_features(path)?;
    let merged = merge_polygons(&features).map_err(|source| GridError::BoundarySource {
        path: path.to_path_buf(),
        source,
    })?;
    if merged.0.is_empty() {
        return Err(GridError::EmptyBoundary(path.to_path_buf()));
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_source_is_fatal() {
        let err = load_boundary(Path::new("/nonexistent/land.geojson")).unwrap_err();
        assert!(matches!(err, GridError::BoundarySource { .. }));
    }

    #[test]
    fn test_empty_collection_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("land.geojson");
        fs::write(&path, r#"{"type": "FeatureCollection", "features": []}"#).unwrap();
        assert!(matches!(load_boundary(&path), Err(GridError::EmptyBoundary(_))));
    }

    #[test]
    fn test_load_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("land.geojson");
        fs::write(
            &path,
            r#"{"type": "Feature", "properties": {},
               "geometry": {"type": "Polygon",
                 "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}"#,
        )
        .unwrap();
        assert_eq!(load_boundary(&path).unwrap().0.len(), 1);
    }
}
