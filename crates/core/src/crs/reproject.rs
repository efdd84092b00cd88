//! Pure-Rust reprojection between WGS84 and the projected systems the
//! engine works in (Snyder 1987, USGS Prof. Paper 1395).
//!
//! Supported: EPSG 4326, UTM North/South (326xx / 327xx), Web Mercator
//! (3857) and the ellipsoidal PDC Mercator used by the Pacific grid (3832).
//! Inverse transforms return longitudes relative to the projection's central
//! meridian without wrapping, so extents that straddle the antimeridian keep
//! a contiguous longitude range (e.g. 179.5 .. 180.5).

use super::Crs;
use crate::error::{Error, Result};

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0_UTM: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;
const PDC_CENTRAL_MERIDIAN: f64 = 150.0;

/// A supported map projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Longitude/latitude degrees (EPSG:4326)
    Geographic,
    /// Transverse Mercator, UTM zone and hemisphere
    Utm { zone: u32, north: bool },
    /// Spherical Web Mercator (EPSG:3857)
    WebMercator,
    /// Ellipsoidal Mercator with a central meridian in degrees
    Mercator { lon0: f64 },
}

impl Projection {
    /// Resolve an EPSG code to a projection, if supported.
    pub fn from_epsg(epsg: u32) -> Option<Self> {
        if is_wgs84(epsg) {
            return Some(Self::Geographic);
        }
        if let Some((zone, north)) = parse_utm_epsg(epsg) {
            return Some(Self::Utm { zone, north });
        }
        match epsg {
            3857 => Some(Self::WebMercator),
            3832 => Some(Self::Mercator {
                lon0: PDC_CENTRAL_MERIDIAN,
            }),
            _ => None,
        }
    }

    /// Project WGS84 degrees to this projection's coordinates.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Self::Geographic => (lon, lat),
            Self::Utm { zone, north } => wgs84_to_utm(lon, lat, zone, north),
            Self::WebMercator => {
                let x = A * lon.to_radians();
                let y = A * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
            Self::Mercator { lon0 } => {
                let phi = lat.to_radians();
                let e = E2.sqrt();
                let es = e * phi.sin();
                let x = A * normalize_lon(lon - lon0).to_radians();
                let y = A
                    * ((std::f64::consts::FRAC_PI_4 + phi / 2.0).tan()
                        * ((1.0 - es) / (1.0 + es)).powf(e / 2.0))
                    .ln();
                (x, y)
            }
        }
    }

    /// Unproject coordinates to WGS84 degrees (longitude not wrapped).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Self::Geographic => (x, y),
            Self::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
            Self::WebMercator => {
                let lon = (x / A).to_degrees();
                let lat = (2.0 * (y / A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
                (lon, lat)
            }
            Self::Mercator { lon0 } => {
                let e = E2.sqrt();
                let t = (-y / A).exp();
                let mut phi = std::f64::consts::FRAC_PI_2 - 2.0 * t.atan();
                for _ in 0..15 {
                    let es = e * phi.sin();
                    let next = std::f64::consts::FRAC_PI_2
                        - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
                    let done = (next - phi).abs() < 1e-12;
                    phi = next;
                    if done {
                        break;
                    }
                }
                ((x / A).to_degrees() + lon0, phi.to_degrees())
            }
        }
    }
}

/// Check if an EPSG code represents WGS84 geographic.
pub fn is_wgs84(epsg: u32) -> bool {
    epsg == 4326
}

/// Parse an EPSG code into UTM zone info: `Some((zone, is_north))`.
pub fn parse_utm_epsg(epsg: u32) -> Option<(u32, bool)> {
    if (32601..=32660).contains(&epsg) {
        Some((epsg - 32600, true))
    } else if (32701..=32760).contains(&epsg) {
        Some((epsg - 32700, false))
    } else {
        None
    }
}

fn projection(crs: &Crs) -> Result<Projection> {
    Projection::from_epsg(crs.epsg()).ok_or(Error::UnsupportedCrs(crs.epsg()))
}

/// Transform a point from `from` to `to`.
pub fn transform_point(from: &Crs, to: &Crs, x: f64, y: f64) -> Result<(f64, f64)> {
    if from == to {
        return Ok((x, y));
    }
    let (lon, lat) = projection(from)?.inverse(x, y);
    Ok(projection(to)?.forward(lon, lat))
}

/// Unproject a point in `crs` to WGS84 (longitude not wrapped).
pub fn to_wgs84(crs: &Crs, x: f64, y: f64) -> Result<(f64, f64)> {
    Ok(projection(crs)?.inverse(x, y))
}

/// Project a WGS84 point into `crs`.
pub fn from_wgs84(crs: &Crs, lon: f64, lat: f64) -> Result<(f64, f64)> {
    Ok(projection(crs)?.forward(lon, lat))
}

/// Wrap a longitude into `[-180, 180)`.
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

// ── Transverse Mercator (Snyder eqs. 8-9, 8-10, 8-17 .. 8-25) ───────────

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    // Wrap the longitude difference so zones near the antimeridian work.
    let dlon = (lon - lon0 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI)
        - std::f64::consts::PI;
    let a_coeff = cos_lat * dlon;
    let m = meridional_arc(lat);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    let easting = K0_UTM
        * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    let northing = K0_UTM
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    let northing = if north {
        northing
    } else {
        northing + FALSE_NORTHING_SOUTH
    };

    (easting, northing)
}

fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0_UTM;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0_UTM);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                * d5
                / 120.0)
            / cos_phi1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from equator to latitude `lat` (radians). Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}
