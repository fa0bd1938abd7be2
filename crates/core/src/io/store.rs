//! Raster store abstraction
//!
//! A raster store opens source grids for cell-by-cell reading and creates
//! destination grids for cell-by-cell writing. The focal filter drives all
//! of its I/O through these traits, so it never depends on a concrete
//! format library.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::collections::BTreeMap;
use std::path::Path;

/// Read handle on band 1 of an opened raster.
pub trait GridReader {
    /// Number of rows
    fn rows(&self) -> usize;

    /// Number of columns
    fn cols(&self) -> usize;

    /// Number of bands in the underlying dataset (only band 1 is read)
    fn band_count(&self) -> usize {
        1
    }

    /// No-data sentinel of band 1
    fn nodata(&self) -> Option<f64>;

    /// Affine transform of the dataset
    fn geo_transform(&self) -> GeoTransform;

    /// Projection descriptor of the dataset
    fn projection(&self) -> Option<CRS>;

    /// Read one sample of band 1
    fn read_cell(&self, row: usize, col: usize) -> Result<f64>;

    /// Release the handle. Calling it more than once is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Write handle on band 1 of a newly created raster.
pub trait GridWriter {
    /// Number of rows
    fn rows(&self) -> usize;

    /// Number of columns
    fn cols(&self) -> usize;

    /// Set the affine transform of the destination
    fn set_geo_transform(&mut self, transform: GeoTransform) -> Result<()>;

    /// Set the projection descriptor of the destination
    fn set_projection(&mut self, crs: Option<&CRS>) -> Result<()>;

    /// Set the no-data sentinel of band 1
    fn set_nodata(&mut self, nodata: Option<f64>) -> Result<()>;

    /// Write one sample of band 1
    fn write_cell(&mut self, row: usize, col: usize, value: f64) -> Result<()>;

    /// Flush and finalize the destination. Calling it more than once is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Abandon the destination without finalizing it.
    ///
    /// Stores that create files remove them, so a failed run never leaves
    /// a half-written raster behind. Closing after a discard is a no-op.
    fn discard(&mut self) -> Result<()>;
}

/// Factory for grid handles.
pub trait RasterStore {
    type Reader: GridReader;
    type Writer: GridWriter;

    /// Open an existing raster for reading
    fn open_for_read(&self, path: &Path) -> Result<Self::Reader>;

    /// Create a single-band raster of `rows x cols` for writing
    fn create_for_write(
        &self,
        path: &Path,
        rows: usize,
        cols: usize,
        format: &str,
        options: &CreationOptions,
    ) -> Result<Self::Writer>;
}

/// Creation options passed to a store, GDAL style (`COMPRESS=DEFLATE`).
///
/// Keys are stored upper-cased; values are kept as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationOptions {
    entries: BTreeMap<String, String>,
}

impl CreationOptions {
    /// Option key selecting the compression algorithm
    pub const COMPRESS: &'static str = "COMPRESS";

    /// No options at all
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Builder-style [`CreationOptions::set`]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Set an option, replacing any previous value
    pub fn set(&mut self, key: &str, value: &str) {
        self.entries
            .insert(key.to_ascii_uppercase(), value.to_string());
    }

    /// Look up an option (key is case-insensitive)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// The requested compression algorithm, if any
    pub fn compression(&self) -> Option<&str> {
        self.get(Self::COMPRESS)
    }

    /// Iterate over `(KEY, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Default for CreationOptions {
    fn default() -> Self {
        Self::empty().with(Self::COMPRESS, "DEFLATE")
    }
}

const MEMORY_PATH: &str = "<memory>";

impl<T: RasterElement> GridReader for Raster<T> {
    fn rows(&self) -> usize {
        Raster::rows(self)
    }

    fn cols(&self) -> usize {
        Raster::cols(self)
    }

    fn nodata(&self) -> Option<f64> {
        Raster::nodata(self).and_then(RasterElement::into_f64)
    }

    fn geo_transform(&self) -> GeoTransform {
        *self.transform()
    }

    fn projection(&self) -> Option<CRS> {
        self.crs().cloned()
    }

    fn read_cell(&self, row: usize, col: usize) -> Result<f64> {
        let value = self
            .get(row, col)
            .map_err(|e| Error::cell_io(MEMORY_PATH, row, col, e))?;
        value
            .into_f64()
            .ok_or_else(|| Error::cell_io(MEMORY_PATH, row, col, "sample is not representable as f64"))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: RasterElement> GridWriter for Raster<T> {
    fn rows(&self) -> usize {
        Raster::rows(self)
    }

    fn cols(&self) -> usize {
        Raster::cols(self)
    }

    fn set_geo_transform(&mut self, transform: GeoTransform) -> Result<()> {
        self.set_transform(transform);
        Ok(())
    }

    fn set_projection(&mut self, crs: Option<&CRS>) -> Result<()> {
        self.set_crs(crs.cloned());
        Ok(())
    }

    fn set_nodata(&mut self, nodata: Option<f64>) -> Result<()> {
        let converted = match nodata {
            Some(v) => Some(T::from_f64(v).ok_or_else(|| Error::InvalidParameter {
                name: "nodata",
                value: v.to_string(),
                reason: "not representable in the raster element type".to_string(),
            })?),
            None => None,
        };
        Raster::set_nodata(self, converted);
        Ok(())
    }

    fn write_cell(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let converted = T::from_f64(value).ok_or_else(|| {
            Error::cell_io(MEMORY_PATH, row, col, format!("value {} is not representable", value))
        })?;
        self.set(row, col, converted)
            .map_err(|e| Error::cell_io(MEMORY_PATH, row, col, e))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        Ok(())
    }
}
