//! WOFL bit flags
//!
//! A water observation feature layer stores one byte per pixel. Zero is a
//! clear dry observation and exactly `WATER` is a clear wet one; every other
//! value means the observation is unusable for the summary.

/// Clear and dry
pub const DRY: u8 = 0;
/// No valid observation; also the output no-data value
pub const NODATA: u8 = 1;
/// At least one spectral band is missing
pub const NONCONTIGUOUS: u8 = 1 << 1;
/// Slope above the terrain threshold
pub const HIGH_SLOPE: u8 = 1 << 4;
/// Cloud shadow
pub const CLOUD_SHADOW: u8 = 1 << 5;
/// Cloud
pub const CLOUD: u8 = 1 << 6;
/// Water detected
pub const WATER: u8 = 1 << 7;

/// Observation was clear and dry
#[inline]
pub fn is_clear_dry(flags: u8) -> bool {
    flags == DRY
}

/// Observation was clear and wet
#[inline]
pub fn is_clear_wet(flags: u8) -> bool {
    flags == WATER
}

/// Observation can be counted by the summary
#[inline]
pub fn is_clear(flags: u8) -> bool {
    is_clear_dry(flags) || is_clear_wet(flags)
}

/// Combine a classification with masking flags. No-data on either side wins
/// over everything.
#[inline]
pub fn with_masks(classification: u8, masks: u8) -> u8 {
    if classification == NODATA || masks & NODATA != 0 {
        NODATA
    } else {
        classification | masks
    }
}
