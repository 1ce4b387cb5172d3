//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Direction codes, raw direction values and watershed ids are all integer
/// rasters; float support exists so GeoTIFFs written as float samples can
/// still be read and cast.
pub trait RasterElement:
    Copy + Debug + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Placeholder for NaN samples and for a no-data value this type cannot hold
    fn fallback() -> Self;
}

macro_rules! impl_raster_element_int {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata == Some(*self)
            }

            fn is_float() -> bool {
                false
            }

            fn fallback() -> Self {
                0
            }
        }
    )*};
}

macro_rules! impl_raster_element_float {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    None => false,
                }
            }

            fn is_float() -> bool {
                true
            }

            fn fallback() -> Self {
                <$t>::NAN
            }
        }
    )*};
}

impl_raster_element_int!(u8, i16, u16, i32, u32);
impl_raster_element_float!(f32, f64);
