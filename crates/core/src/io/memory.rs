//! In-memory raster store
//!
//! Rasters live in a path-keyed map shared by all handles of one store.
//! A destination only becomes visible once its writer is closed.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::store::{CreationOptions, GridReader, GridWriter, RasterStore};
use crate::raster::{GeoTransform, Raster};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

type Datasets = Rc<RefCell<BTreeMap<PathBuf, Raster<f64>>>>;

/// Store keeping rasters in memory under a path key. Accepts the `MEM` format.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    datasets: Datasets,
}

impl MemoryStore {
    /// Format name accepted by [`RasterStore::create_for_write`]
    pub const FORMAT: &'static str = "MEM";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raster under `path`, replacing any previous one
    pub fn insert(&self, path: impl Into<PathBuf>, raster: Raster<f64>) {
        self.datasets.borrow_mut().insert(path.into(), raster);
    }

    /// Copy of the raster stored under `path`
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Raster<f64>> {
        self.datasets.borrow().get(path.as_ref()).cloned()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.datasets.borrow().contains_key(path.as_ref())
    }
}

impl RasterStore for MemoryStore {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn open_for_read(&self, path: &Path) -> Result<MemoryReader> {
        let raster = self
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_path_buf()))?;
        Ok(MemoryReader {
            path: path.to_path_buf(),
            raster,
            closed: false,
        })
    }

    fn create_for_write(
        &self,
        path: &Path,
        rows: usize,
        cols: usize,
        format: &str,
        _options: &CreationOptions,
    ) -> Result<MemoryWriter> {
        if !format.eq_ignore_ascii_case(Self::FORMAT) {
            return Err(Error::WriteTarget {
                path: path.to_path_buf(),
                reason: format!("unsupported format '{}', expected {}", format, Self::FORMAT),
            });
        }
        if rows == 0 || cols == 0 {
            return Err(Error::WriteTarget {
                path: path.to_path_buf(),
                reason: format!("cannot create a {}x{} raster", rows, cols),
            });
        }

        // creating a dataset truncates whatever was there before
        self.datasets.borrow_mut().remove(path);

        Ok(MemoryWriter {
            path: path.to_path_buf(),
            raster: Raster::new(rows, cols),
            datasets: Rc::clone(&self.datasets),
            closed: false,
        })
    }
}

/// Read handle of a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryReader {
    path: PathBuf,
    raster: Raster<f64>,
    closed: bool,
}

impl GridReader for MemoryReader {
    fn rows(&self) -> usize {
        self.raster.rows()
    }

    fn cols(&self) -> usize {
        self.raster.cols()
    }

    fn nodata(&self) -> Option<f64> {
        self.raster.nodata()
    }

    fn geo_transform(&self) -> GeoTransform {
        *self.raster.transform()
    }

    fn projection(&self) -> Option<CRS> {
        self.raster.crs().cloned()
    }

    fn read_cell(&self, row: usize, col: usize) -> Result<f64> {
        if self.closed {
            return Err(Error::cell_io(&self.path, row, col, "read on a closed handle"));
        }
        self.raster
            .get(row, col)
            .map_err(|e| Error::cell_io(&self.path, row, col, e))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Write handle of a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryWriter {
    path: PathBuf,
    raster: Raster<f64>,
    datasets: Datasets,
    closed: bool,
}

impl MemoryWriter {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::raster_io(&self.path, "write on a closed handle"));
        }
        Ok(())
    }
}

impl GridWriter for MemoryWriter {
    fn rows(&self) -> usize {
        self.raster.rows()
    }

    fn cols(&self) -> usize {
        self.raster.cols()
    }

    fn set_geo_transform(&mut self, transform: GeoTransform) -> Result<()> {
        self.ensure_open()?;
        self.raster.set_transform(transform);
        Ok(())
    }

    fn set_projection(&mut self, crs: Option<&CRS>) -> Result<()> {
        self.ensure_open()?;
        self.raster.set_crs(crs.cloned());
        Ok(())
    }

    fn set_nodata(&mut self, nodata: Option<f64>) -> Result<()> {
        self.ensure_open()?;
        self.raster.set_nodata(nodata);
        Ok(())
    }

    fn write_cell(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if self.closed {
            return Err(Error::cell_io(&self.path, row, col, "write on a closed handle"));
        }
        self.raster
            .set(row, col, value)
            .map_err(|e| Error::cell_io(&self.path, row, col, e))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.datasets
            .borrow_mut()
            .insert(self.path.clone(), self.raster.clone());
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
