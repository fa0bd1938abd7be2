//! In-memory raster grid

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::Array2;

/// Single-band grid of `T` with the spatial metadata a focal filter
/// has to carry from source to destination.
///
/// Cells are addressed as `(row, col)` with `(0, 0)` at the top-left.
///
/// ```ignore
/// use geofocal_core::Raster;
///
/// let mut dem: Raster<f32> = Raster::filled(4, 4, 1.0);
/// dem.set(2, 3, 7.5)?;
/// assert_eq!(dem.get(2, 3)?, 7.5);
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    cells: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// All-zero grid with an identity-like transform and no CRS
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Grid from `rows * cols` values in row-major order
    pub fn from_vec(values: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        Array2::from_shape_vec((rows, cols), values)
            .map(Self::from_array)
            .map_err(|e| Error::Other(e.to_string()))
    }

    pub fn from_array(cells: Array2<T>) -> Self {
        Self {
            cells,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Zeroed `rows x cols` grid of element type `U` with this grid's
    /// transform and CRS. The no-data value is left unset because it may
    /// not be representable in `U`.
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            cells: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    pub fn rows(&self) -> usize {
        self.cells.nrows()
    }

    pub fn cols(&self) -> usize {
        self.cells.ncols()
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.cells.dim()
    }

    fn out_of_bounds(&self, row: usize, col: usize) -> Error {
        let (rows, cols) = self.shape();
        Error::IndexOutOfBounds { row, col, rows, cols }
    }

    /// Value of cell (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        match self.cells.get((row, col)) {
            Some(&value) => Ok(value),
            None => Err(self.out_of_bounds(row, col)),
        }
    }

    /// Overwrite cell (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(self.out_of_bounds(row, col));
        }
        self.cells[[row, col]] = value;
        Ok(())
    }

    /// Cell values as an ndarray
    pub fn data(&self) -> &Array2<T> {
        &self.cells
    }

    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.cells
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Sentinel marking missing cells, if any
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed_and_unreferenced() {
        let raster: Raster<i16> = Raster::new(3, 5);
        assert_eq!((raster.rows(), raster.cols()), (3, 5));
        assert!(raster.data().iter().all(|&v| v == 0));
        assert_eq!(raster.transform(), &GeoTransform::default());
        assert!(raster.crs().is_none());
        assert!(raster.nodata().is_none());
    }

    #[test]
    fn test_from_vec_is_row_major() {
        let mut raster = Raster::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
        assert_eq!(raster.get(0, 2).unwrap(), 3.0);
        assert_eq!(raster.get(1, 0).unwrap(), 4.0);
        raster.set(1, 2, 42.0).unwrap();
        assert_eq!(raster.get(1, 2).unwrap(), 42.0);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut raster: Raster<f64> = Raster::filled(2, 3, 1.0);
        assert!(matches!(
            raster.get(2, 0),
            Err(Error::IndexOutOfBounds { row: 2, col: 0, rows: 2, cols: 3 })
        ));
        assert!(raster.set(0, 3, 0.0).is_err());
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let result = Raster::<f64>::from_vec(vec![1.0; 5], 2, 3);
        assert!(matches!(
            result,
            Err(Error::InvalidDimensions { width: 3, height: 2 })
        ));
    }

    #[test]
    fn test_with_same_meta() {
        let mut raster: Raster<f64> = Raster::new(4, 4);
        raster.set_transform(GeoTransform::new(10.0, 20.0, 2.0, -2.0));
        raster.set_crs(Some(CRS::from_epsg(32719)));
        raster.set_nodata(Some(-9999.0));

        let derived: Raster<f32> = raster.with_same_meta(2, 3);
        assert_eq!(derived.shape(), (2, 3));
        assert_eq!(derived.transform(), raster.transform());
        assert_eq!(derived.crs(), raster.crs());
        assert_eq!(derived.nodata(), None);
    }
}
