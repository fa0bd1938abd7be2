//! Affine georeferencing

/// Six-coefficient affine map from cell corners to map coordinates:
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// Coefficients are stored as given and never recomputed, so a transform
/// read from one dataset can be written to another bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Axis-aligned transform
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::from_gdal([origin_x, pixel_width, 0.0, origin_y, 0.0, pixel_height])
    }

    /// From GDAL coefficient order
    /// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        let [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height] = coeffs;
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation,
            col_rotation,
        }
    }

    /// Inverse of [`GeoTransform::from_gdal`]
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// No rotation terms and rows running southwards.
    ///
    /// Only these can be written as a GeoTIFF pixel-scale/tiepoint pair;
    /// anything else needs a full model transformation.
    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0 && self.pixel_height < 0.0
    }
}

impl Default for GeoTransform {
    /// Unit cells with the origin at (0, 0)
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gdal_coefficient_order() {
        let gt = GeoTransform::from_gdal([440720.0, 60.0, 0.5, 3751320.0, 0.25, -60.0]);
        assert_eq!(gt.origin_x, 440720.0);
        assert_eq!(gt.pixel_width, 60.0);
        assert_eq!(gt.row_rotation, 0.5);
        assert_eq!(gt.origin_y, 3751320.0);
        assert_eq!(gt.col_rotation, 0.25);
        assert_eq!(gt.pixel_height, -60.0);
        assert_eq!(gt.to_gdal(), [440720.0, 60.0, 0.5, 3751320.0, 0.25, -60.0]);
    }

    #[test]
    fn test_north_up() {
        assert!(GeoTransform::new(0.0, 100.0, 1.0, -1.0).is_north_up());
        assert!(!GeoTransform::new(0.0, 100.0, 1.0, 1.0).is_north_up());
        assert!(!GeoTransform::from_gdal([0.0, 1.0, 0.1, 0.0, 0.0, -1.0]).is_north_up());
    }
}
