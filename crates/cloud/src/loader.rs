//! Raster loading onto a target geobox
//!
//! Each band asset is fetched whole, decoded as a GeoTIFF and resampled by
//! nearest neighbour onto the requested [`GeoBox`]. In tolerant mode a
//! missing or unreadable asset becomes an all-NaN band and the caller sees
//! no-data instead of an error.

use std::path::Path;
use std::time::Duration;

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, warn};
use wofs_core::crs::reproject::transform_point;
use wofs_core::io::read_geotiff_from_buffer;
use wofs_core::raster::Raster;
use wofs_core::{BandSet, GeoBox, Observation};

use crate::error::{CloudError, Result};
use crate::sync_api::HttpFetcher;

/// Where asset bytes come from
pub trait AssetSource: Send + Sync {
    fn fetch(&self, href: &str) -> Result<Vec<u8>>;
}

/// Fetches `http(s)://` and `s3://` hrefs over HTTP, everything else from
/// the local filesystem (`file://` prefix optional).
pub struct DefaultSource {
    http: HttpFetcher,
}

impl DefaultSource {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(request_timeout)?,
        })
    }
}

/// `s3://bucket/key` as a virtual-hosted HTTPS URL
pub fn s3_to_https(href: &str) -> Option<String> {
    let rest = href.strip_prefix("s3://")?;
    let (bucket, key) = rest.split_once('/')?;
    Some(format!("https://{bucket}.s3.amazonaws.com/{key}"))
}

fn read_local(href: &str) -> Result<Vec<u8>> {
    let path = href.strip_prefix("file://").unwrap_or(href);
    std::fs::read(Path::new(path)).map_err(|e| CloudError::Asset {
        href: href.to_string(),
        reason: e.to_string(),
    })
}

impl AssetSource for DefaultSource {
    fn fetch(&self, href: &str) -> Result<Vec<u8>> {
        if href.starts_with("http://") || href.starts_with("https://") {
            self.http.get(href)
        } else if let Some(url) = s3_to_https(href) {
            self.http.get(&url)
        } else {
            read_local(href)
        }
    }
}

/// Filesystem-only source
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSource;

impl AssetSource for LocalSource {
    fn fetch(&self, href: &str) -> Result<Vec<u8>> {
        read_local(href)
    }
}

impl<S: AssetSource + ?Sized> AssetSource for std::sync::Arc<S> {
    fn fetch(&self, href: &str) -> Result<Vec<u8>> {
        (**self).fetch(href)
    }
}

/// A band to load and the no-data value its source files use
#[derive(Debug, Clone, PartialEq)]
pub struct BandSpec {
    pub name: String,
    /// Overrides the file's own no-data value
    pub nodata: Option<f32>,
}

impl BandSpec {
    pub fn new(name: impl Into<String>, nodata: Option<f32>) -> Self {
        Self {
            name: name.into(),
            nodata,
        }
    }
}

/// Loads observation bands onto a geobox
pub struct RasterLoader<S: AssetSource> {
    source: S,
    bands: Vec<BandSpec>,
    tolerant: bool,
}

impl<S: AssetSource> RasterLoader<S> {
    /// A tolerant loader for `bands`
    pub fn new(source: S, bands: Vec<BandSpec>) -> Self {
        Self {
            source,
            bands,
            tolerant: true,
        }
    }

    /// Fail on missing or unreadable assets instead of filling with NaN.
    pub fn strict(mut self) -> Self {
        self.tolerant = false;
        self
    }

    pub fn bands(&self) -> &[BandSpec] {
        &self.bands
    }

    fn read_band(&self, href: &str, spec: &BandSpec, geobox: &GeoBox) -> Result<Raster<f32>> {
        let bytes = self.source.fetch(href)?;
        let mut src: Raster<f32> = read_geotiff_from_buffer(&bytes)?;
        if spec.nodata.is_some() {
            src.set_nodata(spec.nodata);
        }
        reproject_nearest(&src, geobox)
    }

    fn band_or_nodata(&self, obs: &Observation, spec: &BandSpec, geobox: &GeoBox) -> Result<Raster<f32>> {
        let result = match obs.href(&spec.name) {
            Some(href) => self.read_band(href, spec, geobox),
            None => Err(CloudError::Asset {
                href: obs.id.clone(),
                reason: format!("no '{}' asset", spec.name),
            }),
        };
        match result {
            Ok(band) => Ok(band),
            Err(e) if self.tolerant => {
                warn!("{}: band {} unavailable, filling with no-data: {e}", obs.id, spec.name);
                Ok(Raster::filled(geobox.clone(), f32::NAN).with_nodata(Some(f32::NAN)))
            }
            Err(e) => Err(e),
        }
    }

    /// Load every configured band of one observation.
    pub fn load_observation(&self, obs: &Observation, geobox: &GeoBox) -> Result<BandSet> {
        debug!("Loading {} bands of {} onto {geobox}", self.bands.len(), obs.id);
        let mut set = BandSet::new(obs.id.clone(), obs.datetime, geobox.clone());
        for spec in &self.bands {
            set.insert(spec.name.clone(), self.band_or_nodata(obs, spec, geobox)?)?;
        }
        Ok(set)
    }

    /// Mosaic band `name` of several observations; the first valid value
    /// wins at each pixel.
    pub fn mosaic(&self, observations: &[Observation], name: &str, geobox: &GeoBox) -> Result<Raster<f32>> {
        let spec = self
            .bands
            .iter()
            .find(|b| b.name == name)
            .cloned()
            .unwrap_or_else(|| BandSpec::new(name, None));
        let mut out = Raster::filled(geobox.clone(), f32::NAN).with_nodata(Some(f32::NAN));
        for obs in observations {
            let band = self.band_or_nodata(obs, &spec, geobox)?;
            ndarray::Zip::from(out.data_mut())
                .and(band.data())
                .for_each(|o, &v| {
                    if o.is_nan() && !v.is_nan() {
                        *o = v;
                    }
                });
        }
        Ok(out)
    }
}

/// Nearest-neighbour resample of `src` onto `target`.
///
/// Target pixel centres are transformed into the source CRS and looked up
/// in the source grid. Outside the source, or on source no-data, the result
/// is NaN.
pub fn reproject_nearest(src: &Raster<f32>, target: &GeoBox) -> Result<Raster<f32>> {
    let (rows, cols) = target.shape();
    let (from, to) = (*target.crs(), *src.geobox().crs());
    // Surface unsupported CRS pairs once rather than as silent NaN.
    let (ox, oy) = target.pixel_center(0, 0);
    transform_point(&from, &to, ox, oy)?;

    let src_geobox = src.geobox();
    let data = src.data();
    let out: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let (x, y) = target.pixel_center(row, col);
                    let Ok((sx, sy)) = transform_point(&from, &to, x, y) else {
                        return f32::NAN;
                    };
                    match src_geobox.pixel_index(sx, sy) {
                        Some(idx) if !src.is_nodata(data[idx]) => data[idx],
                        _ => f32::NAN,
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), out).map_err(|e| wofs_core::Error::Other(e.to_string()))?;
    Ok(Raster::from_array(array, target.clone())?.with_nodata(Some(f32::NAN)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wofs_core::io::write_geotiff;
    use wofs_core::{Crs, Variable};

    fn source_geobox() -> GeoBox {
        GeoBox::new(4, 4, 0.0, 120.0, 30.0, -30.0, Crs::pdc_mercator())
    }

    fn write_band(dir: &Path, name: &str) -> String {
        let mut r: Raster<f32> = Raster::new(source_geobox());
        for row in 0..4 {
            for col in 0..4 {
                r.set(row, col, (row * 4 + col) as f32).unwrap();
            }
        }
        let path = dir.join(format!("{name}.tif"));
        write_geotiff(&Variable::from(r), &path).unwrap();
        path.display().to_string()
    }

    fn observation(dir: &Path) -> Observation {
        Observation::new("scene-1", Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap())
            .with_asset("red", write_band(dir, "red"))
            .with_asset("green", format!("file://{}", write_band(dir, "green")))
    }

    #[test]
    fn s3_rewrite() {
        assert_eq!(
            s3_to_https("s3://usgs-landsat/collection02/B4.TIF").as_deref(),
            Some("https://usgs-landsat.s3.amazonaws.com/collection02/B4.TIF")
        );
        assert_eq!(s3_to_https("https://x/y"), None);
    }

    #[test]
    fn identity_alignment() {
        let dir = tempfile::tempdir().unwrap();
        let loader = RasterLoader::new(LocalSource, vec![BandSpec::new("red", None)]);
        let set = loader.load_observation(&observation(dir.path()), &source_geobox()).unwrap();
        let red = set.get("red").unwrap();
        assert_eq!(red.get(2, 3).unwrap(), 11.0);
        assert_eq!(red.geobox(), &source_geobox());
    }

    #[test]
    fn window_alignment_pads_with_nan() {
        let dir = tempfile::tempdir().unwrap();
        let loader = RasterLoader::new(LocalSource, vec![BandSpec::new("green", None)]);
        // Shifted one pixel right and one down, extending past the source.
        let target = GeoBox::new(4, 4, 30.0, 90.0, 30.0, -30.0, Crs::pdc_mercator());
        let set = loader.load_observation(&observation(dir.path()), &target).unwrap();
        let green = set.get("green").unwrap();
        assert_eq!(green.get(0, 0).unwrap(), 5.0);
        assert!(green.get(3, 3).unwrap().is_nan());
    }

    #[test]
    fn nodata_override() {
        let dir = tempfile::tempdir().unwrap();
        let loader = RasterLoader::new(LocalSource, vec![BandSpec::new("red", Some(0.0))]);
        let set = loader.load_observation(&observation(dir.path()), &source_geobox()).unwrap();
        assert!(set.get("red").unwrap().get(0, 0).unwrap().is_nan());
        assert_eq!(set.get("red").unwrap().get(0, 1).unwrap(), 1.0);
    }

    #[test]
    fn tolerant_missing_band() {
        let dir = tempfile::tempdir().unwrap();
        let bands = vec![BandSpec::new("red", None), BandSpec::new("swir16", None)];
        let loader = RasterLoader::new(LocalSource, bands.clone());
        let set = loader.load_observation(&observation(dir.path()), &source_geobox()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.get("swir16").unwrap().data().iter().all(|v| v.is_nan()));

        let strict = RasterLoader::new(LocalSource, bands).strict();
        assert!(strict.load_observation(&observation(dir.path()), &source_geobox()).is_err());
    }

    #[test]
    fn corrupt_asset_is_nodata_when_tolerant() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.tif");
        std::fs::write(&bad, b"not a tiff").unwrap();
        let obs = Observation::new("s", Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap())
            .with_asset("red", bad.display().to_string());
        let loader = RasterLoader::new(LocalSource, vec![BandSpec::new("red", None)]);
        let set = loader.load_observation(&obs, &source_geobox()).unwrap();
        assert!(set.get("red").unwrap().get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn mosaic_first_valid_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = Observation::new("a", Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap())
            .with_asset("data", write_band(dir.path(), "dem"));
        let loader = RasterLoader::new(LocalSource, vec![BandSpec::new("data", Some(0.0))]);
        let target = GeoBox::new(4, 4, 30.0, 120.0, 30.0, -30.0, Crs::pdc_mercator());
        let second = Observation::new("b", first.datetime).with_asset("data", first.href("data").unwrap());
        let dem = loader.mosaic(&[first, second], "data", &target).unwrap();
        assert_eq!(dem.get(0, 0).unwrap(), 1.0);
        assert!(dem.get(0, 3).unwrap().is_nan());
    }
}
