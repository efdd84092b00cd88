//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Covers the sample types the engine reads and writes: 8/16-bit integers
/// for flags, counts and fixed-point outputs, and floats for reflectance,
/// indices and frequencies.
pub trait RasterElement:
    Copy + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Default no-data value for this type
    fn default_nodata() -> Self;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Check if this value represents no-data. NaN is always no-data.
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Convert from f64, saturating to no-data when out of range
    fn from_f64(value: f64) -> Self {
        NumCast::from(value).unwrap_or_else(Self::default_nodata)
    }
}

macro_rules! impl_raster_element {
    ($t:ty, nodata = $nd:expr, float = false) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                $nd
            }

            fn is_float() -> bool {
                false
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata == Some(*self)
            }
        }
    };
    ($t:ty, nodata = $nd:expr, float = true) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                $nd
            }

            fn is_float() -> bool {
                true
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                self.is_nan() || matches!(nodata, Some(nd) if !nd.is_nan() && *self == nd)
            }
        }
    };
}

impl_raster_element!(u8, nodata = u8::MAX, float = false);
impl_raster_element!(u16, nodata = 0, float = false);
impl_raster_element!(i16, nodata = -32767, float = false);
impl_raster_element!(i32, nodata = i32::MIN, float = false);
impl_raster_element!(f32, nodata = f32::NAN, float = true);
impl_raster_element!(f64, nodata = f64::NAN, float = true);
