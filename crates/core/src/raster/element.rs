//! Cell value types

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// A type that can be stored in a raster cell.
pub trait RasterElement:
    Copy + Debug + PartialOrd + NumCast + Zero + Send + Sync + 'static
{
    /// Value written to cells without data when no explicit nodata is set
    fn default_nodata() -> Self;

    /// Whether `self` is a missing value under the given nodata marker.
    ///
    /// Floating point NaN is always missing.
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Lossy conversion from `f64`, `None` when out of range or NaN for
    /// integer types
    fn from_f64(v: f64) -> Option<Self> {
        NumCast::from(v)
    }
}

macro_rules! raster_element {
    (int: $($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MAX
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata == Some(*self)
            }
        }
    )*};
    (float: $($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                self.is_nan() || nodata.is_some_and(|nd| (self - nd).abs() <= <$t>::EPSILON * 100.0)
            }
        }
    )*};
}

raster_element!(int: u8, i16, u16, i32, u32);
raster_element!(float: f32, f64);
