//! GDAL-backed raster store
//!
//! Every `read_cell` / `write_cell` is a single-pixel `RasterIO` call on
//! band 1, the access pattern of the classic GDAL focal tools.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::store::{CreationOptions, GridReader, GridWriter, RasterStore};
use crate::raster::GeoTransform;
use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Store delegating to the GDAL driver registry. Any GDAL format can be read;
/// any driver supporting `Create` can be written.
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalStore;

impl GdalStore {
    pub fn new() -> Self {
        Self
    }
}

impl RasterStore for GdalStore {
    type Reader = GdalReader;
    type Writer = GdalWriter;

    fn open_for_read(&self, path: &Path) -> Result<GdalReader> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let unreadable = |reason: String| Error::UnreadableFormat {
            path: path.to_path_buf(),
            reason,
        };

        let dataset = Dataset::open(path).map_err(|e| unreadable(e.to_string()))?;
        let (cols, rows) = dataset.raster_size();
        let band_count = dataset.raster_count();
        if band_count == 0 {
            return Err(unreadable("dataset has no raster bands".to_string()));
        }
        let nodata = dataset
            .rasterband(1)
            .map_err(|e| unreadable(e.to_string()))?
            .no_data_value();
        let transform = dataset
            .geo_transform()
            .map(GeoTransform::from_gdal)
            .unwrap_or_default();
        let crs = CRS::parse(&dataset.projection());

        debug!("Opened {} with GDAL ({} x {}, {} band(s))", path.display(), cols, rows, band_count);

        Ok(GdalReader {
            path: path.to_path_buf(),
            dataset: Some(dataset),
            rows,
            cols,
            band_count,
            nodata,
            transform,
            crs,
        })
    }

    fn create_for_write(
        &self,
        path: &Path,
        rows: usize,
        cols: usize,
        format: &str,
        options: &CreationOptions,
    ) -> Result<GdalWriter> {
        let target_error = |reason: String| Error::WriteTarget {
            path: path.to_path_buf(),
            reason,
        };

        let driver = DriverManager::get_driver_by_name(format)
            .map_err(|e| target_error(format!("unknown driver '{}': {}", format, e)))?;

        let mut create_options = CslStringList::new();
        for (key, value) in options.iter() {
            create_options
                .set_name_value(key, value)
                .map_err(|e| target_error(e.to_string()))?;
        }

        let dataset = driver
            .create_with_band_type_with_options::<f32, _>(path, cols, rows, 1, &create_options)
            .map_err(|e| target_error(e.to_string()))?;

        Ok(GdalWriter {
            path: path.to_path_buf(),
            dataset: Some(dataset),
            rows,
            cols,
            closed: false,
        })
    }
}

/// Read handle of a [`GdalStore`]
pub struct GdalReader {
    path: PathBuf,
    dataset: Option<Dataset>,
    rows: usize,
    cols: usize,
    band_count: usize,
    nodata: Option<f64>,
    transform: GeoTransform,
    crs: Option<CRS>,
}

impl GridReader for GdalReader {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn band_count(&self) -> usize {
        self.band_count
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn geo_transform(&self) -> GeoTransform {
        self.transform
    }

    fn projection(&self) -> Option<CRS> {
        self.crs.clone()
    }

    fn read_cell(&self, row: usize, col: usize) -> Result<f64> {
        let fail = |reason: String| Error::cell_io(&self.path, row, col, reason);
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| fail("read on a closed handle".to_string()))?;
        let band = dataset.rasterband(1).map_err(|e| fail(e.to_string()))?;
        let buffer = band
            .read_as::<f64>((col as isize, row as isize), (1, 1), (1, 1), None)
            .map_err(|e| fail(e.to_string()))?;
        buffer
            .data()
            .first()
            .copied()
            .ok_or_else(|| fail("empty read buffer".to_string()))
    }

    fn close(&mut self) -> Result<()> {
        // GDALClose runs on drop
        self.dataset = None;
        Ok(())
    }
}

/// Write handle of a [`GdalStore`]
///
/// The dataset is released only once its cache has been flushed; a writer
/// that is discarded, or dropped before a successful close, deletes its file.
pub struct GdalWriter {
    path: PathBuf,
    dataset: Option<Dataset>,
    rows: usize,
    cols: usize,
    closed: bool,
}

impl GdalWriter {
    fn dataset(&mut self) -> Result<&mut Dataset> {
        let path = &self.path;
        self.dataset
            .as_mut()
            .ok_or_else(|| Error::raster_io(path, "write on a closed handle"))
    }
}

impl GridWriter for GdalWriter {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn set_geo_transform(&mut self, transform: GeoTransform) -> Result<()> {
        self.dataset()?.set_geo_transform(&transform.to_gdal())?;
        Ok(())
    }

    fn set_projection(&mut self, crs: Option<&CRS>) -> Result<()> {
        let dataset = self.dataset()?;
        match crs {
            Some(CRS::Wkt(wkt)) => dataset.set_projection(wkt)?,
            Some(crs) => match (crs.wkt(), crs.epsg()) {
                (Some(wkt), _) => dataset.set_projection(wkt)?,
                (None, Some(code)) => {
                    let srs = SpatialRef::from_epsg(code)?;
                    dataset.set_spatial_ref(&srs)?;
                }
                (None, None) => warn!("Cannot express {} for GDAL, leaving projection unset", crs),
            },
            None => {}
        }
        Ok(())
    }

    fn set_nodata(&mut self, nodata: Option<f64>) -> Result<()> {
        let dataset = self.dataset()?;
        let mut band = dataset.rasterband(1)?;
        band.set_no_data_value(nodata)?;
        Ok(())
    }

    fn write_cell(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let path = self.path.clone();
        let fail = |reason: String| Error::cell_io(&path, row, col, reason);
        let dataset = self.dataset()?;
        let mut band = dataset.rasterband(1).map_err(|e| fail(e.to_string()))?;
        let mut buffer = Buffer::new((1, 1), vec![value as f32]);
        band.write((col as isize, row as isize), (1, 1), &mut buffer)
            .map_err(|e| fail(e.to_string()))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let path = &self.path;
        if let Some(dataset) = self.dataset.as_mut() {
            dataset
                .flush_cache()
                .map_err(|e| Error::raster_io(path, format!("cannot flush dataset: {}", e)))?;
        }
        // GDALClose runs on drop
        self.dataset = None;
        self.closed = true;
        debug!("Finalized {}", self.path.display());
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.dataset = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::raster_io(&self.path, format!("cannot remove unfinished raster: {}", e))),
        }
    }
}

impl Drop for GdalWriter {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Discarding unfinished raster {}", self.path.display());
            if let Err(e) = self.discard() {
                warn!("{}", e);
            }
        }
    }
}
