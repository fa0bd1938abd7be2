//! Cell value types

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Numeric type that can be stored in a [`Raster`](crate::Raster) cell.
///
/// Samples cross the raster store boundary as `f64`, so an element only
/// has to convert to and from it.
pub trait RasterElement:
    Copy + Debug + PartialOrd + NumCast + Zero + Send + Sync + 'static
{
    /// Widen to `f64`
    fn into_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Narrow from `f64`; `None` when the value is out of range for `Self`
    fn from_f64(value: f64) -> Option<Self> {
        NumCast::from(value)
    }
}

macro_rules! raster_elements {
    ($($t:ty),*) => {
        $(impl RasterElement for $t {})*
    };
}

raster_elements!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(200u8.into_f64(), Some(200.0));
        assert_eq!(<u8 as RasterElement>::from_f64(300.0), None);
        assert_eq!(<i16 as RasterElement>::from_f64(-2.0), Some(-2));
        assert_eq!(<f32 as RasterElement>::from_f64(0.25), Some(0.25));
    }

    #[test]
    fn test_float_narrowing_keeps_nan() {
        let narrowed = <f32 as RasterElement>::from_f64(f64::NAN).unwrap();
        assert!(narrowed.is_nan());
    }
}
