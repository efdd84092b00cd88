//! Run configuration
//!
//! Defaults, then an optional JSON file, then environment overrides.
//! Per-run values (tile, period, version) come from the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use wofs_grid::{SceneGridSpec, SummaryGridSpec};

use crate::elevation::DEM_COLLECTION;
use crate::error::{Result, TaskError};

/// Environment variable overriding [`Config::output_root`]
pub const BUCKET_ENV: &str = "WOFS_BUCKET";
pub const DEFAULT_BUCKET: &str = "dep-public-data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root every output key is written under
    pub output_root: PathBuf,
    pub sensor: String,

    pub landsat_catalog: String,
    pub landsat_collection: String,
    /// Asset alternate to read instead of the default href
    pub landsat_alternate: Option<String>,
    pub exclude_platforms: Vec<String>,

    pub elevation_catalog: String,
    pub elevation_collection: String,
    /// Flag steep terrain in WOFLs and summaries
    pub terrain_mask: bool,

    pub summaries_catalog: String,
    pub annual_summary_collection: String,

    /// Land polygons the summary grid is built from
    pub land_boundary: PathBuf,
    /// Landsat WRS-2 footprints the scene grid is built from
    pub scene_footprints: PathBuf,
    pub summary_grid: SummaryGridSpec,
    pub scene_grid: SceneGridSpec,

    pub request_timeout_secs: u64,
    /// Worker threads for batch runs; 0 uses every core
    pub threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_BUCKET),
            sensor: "ls".into(),
            landsat_catalog: "https://landsatlook.usgs.gov/stac-server".into(),
            landsat_collection: "landsat-c2l2-sr".into(),
            landsat_alternate: Some("s3".into()),
            exclude_platforms: vec!["landsat-7".into()],
            elevation_catalog: "https://earth-search.aws.element84.com/v1".into(),
            elevation_collection: DEM_COLLECTION.into(),
            terrain_mask: true,
            summaries_catalog: "https://stac.prod.digitalearthpacific.io".into(),
            annual_summary_collection: "dep_ls_wofs_summary_annual".into(),
            land_boundary: PathBuf::from("data/pacific_land.geojson"),
            scene_footprints: PathBuf::from("data/wrs2_pacific.geojson"),
            summary_grid: SummaryGridSpec::default(),
            scene_grid: SceneGridSpec::default(),
            request_timeout_secs: 60,
            threads: 0,
        }
    }
}

impl Config {
    /// Defaults, overlaid by `path` when given, then by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env(|name| std::env::var(name).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TaskError::Config(format!("{}: {e}", path.display())))?;
        let config = serde_json::from_str(&text)
            .map_err(|e| TaskError::Config(format!("{}: {e}", path.display())))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(bucket) = lookup(BUCKET_ENV).filter(|b| !b.trim().is_empty()) {
            debug!("{BUCKET_ENV} overrides output root: {bucket}");
            self.output_root = PathBuf::from(bucket);
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.output_root, PathBuf::from("dep-public-data"));
        assert_eq!(config.exclude_platforms, ["landsat-7"]);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wofs.json");
        std::fs::write(&path, r#"{"sensor": "s2", "threads": 4}"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.sensor, "s2");
        assert_eq!(config.threads, 4);
        assert_eq!(config.landsat_collection, "landsat-c2l2-sr");
    }

    #[test]
    fn bad_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wofs.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Config::from_file(&path), Err(TaskError::Config(_))));
        assert!(Config::from_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn bucket_from_environment() {
        let config = Config::default().with_env(|name| (name == BUCKET_ENV).then(|| "/mnt/outputs".to_string()));
        assert_eq!(config.output_root, PathBuf::from("/mnt/outputs"));
        let unchanged = Config::default().with_env(|_| Some("  ".to_string()));
        assert_eq!(unchanged.output_root, PathBuf::from(DEFAULT_BUCKET));
    }
}
