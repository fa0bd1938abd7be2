//! Focal filter pipeline
//!
//! Opens the source raster, creates a destination of the valid-mode extent,
//! copies the spatial metadata, convolves band 1 and finalizes the output.
//! On any failure the destination is discarded, and the source handle is
//! closed on every path.

use super::convolution::{convolve, output_extent, ConvolutionStats};
use super::kernel::Kernel;
use geofocal_core::io::{CreationOptions, GridReader, GridWriter, RasterStore};
use geofocal_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Destination format and creation options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    /// Store format name (`GTiff`, `MEM`, ...)
    pub format: String,
    pub options: CreationOptions,
}

impl OutputSpec {
    pub fn new(format: impl Into<String>, options: CreationOptions) -> Self {
        Self {
            format: format.into(),
            options,
        }
    }
}

impl Default for OutputSpec {
    /// DEFLATE-compressed GeoTIFF
    fn default() -> Self {
        Self::new("GTiff", CreationOptions::default())
    }
}

/// Summary of a completed focal filter run
#[derive(Debug, Clone, PartialEq)]
pub struct FocalReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Source extent (rows, cols)
    pub input_shape: (usize, usize),
    /// Kernel extent (height, width)
    pub kernel_shape: (usize, usize),
    pub stats: ConvolutionStats,
}

impl FocalReport {
    /// Destination extent (rows, cols)
    pub fn output_shape(&self) -> (usize, usize) {
        (self.stats.out_rows, self.stats.out_cols)
    }
}

/// Apply `kernel` to band 1 of `input` and write the result to `output`.
///
/// The destination is single-band `f32` of size
/// `(rows - kernel_height + 1) x (cols - kernel_width + 1)` with the
/// source's transform, projection and no-data value.
///
/// # Errors
/// - `NotFound` / `UnreadableFormat` when the source cannot be opened
/// - `KernelTooLarge` when the kernel does not fit; no output is created
/// - `WriteTarget` when the destination cannot be created
/// - `RasterIo` on the first failed read, write or flush; the partial
///   destination is discarded
///
/// A source that fails to close after the destination has been finalized
/// is only logged: the output is complete and is not reported as failed.
pub fn focal_filter<S: RasterStore>(
    store: &S,
    kernel: &Kernel,
    input: &Path,
    output: &Path,
    spec: &OutputSpec,
) -> Result<FocalReport> {
    let mut reader = store.open_for_read(input)?;
    let input_shape = (reader.rows(), reader.cols());
    info!(
        "Opened {} ({}x{}, {} band(s))",
        input.display(),
        input_shape.0,
        input_shape.1,
        reader.band_count()
    );
    if reader.band_count() > 1 {
        debug!("Only band 1 of {} is filtered", input.display());
    }

    let result = filter_opened(store, kernel, &reader, output, spec);

    let closed = reader.close();
    if let Err(close_err) = &closed {
        warn!("Failed to close {}: {}", input.display(), close_err);
    }

    result.map(|stats| FocalReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        input_shape,
        kernel_shape: kernel.shape(),
        stats,
    })
}

fn filter_opened<S: RasterStore>(
    store: &S,
    kernel: &Kernel,
    reader: &S::Reader,
    output: &Path,
    spec: &OutputSpec,
) -> Result<ConvolutionStats> {
    // validated before anything is created on disk
    let (out_rows, out_cols) = output_extent(reader.rows(), reader.cols(), kernel)?;

    let mut writer =
        store.create_for_write(output, out_rows, out_cols, &spec.format, &spec.options)?;
    debug!(
        "Created {} ({}x{}, format {})",
        output.display(),
        out_rows,
        out_cols,
        spec.format
    );

    let run = copy_metadata(reader, &mut writer, output)
        .and_then(|()| convolve(kernel, reader, &mut writer))
        .and_then(|stats| writer.close().map(|()| stats));

    match run {
        Ok(stats) => {
            info!("Wrote {} cells to {}", stats.cell_writes, output.display());
            Ok(stats)
        }
        Err(e) => {
            warn!("Discarding {}: {}", output.display(), e);
            if let Err(discard_err) = writer.discard() {
                warn!("{}", discard_err);
            }
            Err(e)
        }
    }
}

/// Copy transform, projection and no-data value verbatim
fn copy_metadata<R, W>(reader: &R, writer: &mut W, output: &Path) -> Result<()>
where
    R: GridReader + ?Sized,
    W: GridWriter + ?Sized,
{
    if let Some(crs) = reader.projection() {
        debug!("Copying projection {}", crs);
    }
    let wrap = |e: Error| match e {
        Error::RasterIo { .. } => e,
        other => Error::raster_io(output, other),
    };

    writer.set_geo_transform(reader.geo_transform()).map_err(wrap)?;
    writer
        .set_projection(reader.projection().as_ref())
        .map_err(wrap)?;
    writer.set_nodata(reader.nodata()).map_err(wrap)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geofocal_core::io::{MemoryReader, MemoryStore, MemoryWriter};
    use geofocal_core::raster::{GeoTransform, Raster};
    use geofocal_core::{GeoKeys, CRS};
    use std::cell::Cell;
    use std::rc::Rc;

    fn mem_spec() -> OutputSpec {
        OutputSpec::new(MemoryStore::FORMAT, CreationOptions::empty())
    }

    fn georeferenced(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::from_gdal([440_720.0, 60.0, 0.0, 3_751_320.0, 0.0, -60.0]));
        r.set_crs(Some(CRS::from_epsg(26711)));
        r.set_nodata(Some(-32768.0));
        r
    }

    #[test]
    fn test_filter_through_memory_store() {
        let store = MemoryStore::new();
        store.insert("in", georeferenced(5, 5, 2.0));
        let kernel = Kernel::uniform(3, 3).unwrap();

        let report =
            focal_filter(&store, &kernel, Path::new("in"), Path::new("out"), &mem_spec()).unwrap();
        assert_eq!(report.input_shape, (5, 5));
        assert_eq!(report.kernel_shape, (3, 3));
        assert_eq!(report.output_shape(), (3, 3));
        assert_eq!(report.stats.cell_writes, 9);

        let out = store.get("out").unwrap();
        for &v in out.data().iter() {
            assert_relative_eq!(v, 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_metadata_copied_verbatim() {
        let store = MemoryStore::new();
        let mut input = georeferenced(4, 6, 1.0);
        input.set_transform(GeoTransform::from_gdal([10.0, 0.5, 0.1, 20.0, 0.2, -0.5]));
        input.set_crs(Some(CRS::from_wkt("LOCAL_CS[\"arbitrary\"]")));
        store.insert("in", input);

        let kernel = Kernel::gaussian(2, 3, 1.0).unwrap();
        focal_filter(&store, &kernel, Path::new("in"), Path::new("out"), &mem_spec()).unwrap();

        let out = store.get("out").unwrap();
        assert_eq!(out.shape(), (3, 4));
        assert_eq!(out.transform().to_gdal(), [10.0, 0.5, 0.1, 20.0, 0.2, -0.5]);
        assert_eq!(out.crs(), Some(&CRS::from_wkt("LOCAL_CS[\"arbitrary\"]")));
        assert_eq!(out.nodata(), Some(-32768.0));
    }

    #[test]
    fn test_missing_nodata_stays_missing() {
        let store = MemoryStore::new();
        store.insert("in", Raster::filled(3, 3, 1.0));
        let kernel = Kernel::uniform(2, 2).unwrap();
        focal_filter(&store, &kernel, Path::new("in"), Path::new("out"), &mem_spec()).unwrap();
        assert_eq!(store.get("out").unwrap().nodata(), None);
    }

    #[test]
    fn test_kernel_too_large_creates_nothing() {
        let store = MemoryStore::new();
        store.insert("in", Raster::filled(2, 2, 1.0));
        let kernel = Kernel::uniform(3, 3).unwrap();

        let result = focal_filter(&store, &kernel, Path::new("in"), Path::new("out"), &mem_spec());
        assert!(matches!(result, Err(Error::KernelTooLarge { .. })));
        assert!(!store.contains("out"));
    }

    #[test]
    fn test_missing_input() {
        let store = MemoryStore::new();
        let kernel = Kernel::uniform(1, 1).unwrap();
        let result = focal_filter(&store, &kernel, Path::new("nope"), Path::new("out"), &mem_spec());
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(!store.contains("out"));
    }

    #[test]
    fn test_bad_output_format_is_write_target_error() {
        let store = MemoryStore::new();
        store.insert("in", Raster::filled(3, 3, 1.0));
        let kernel = Kernel::uniform(2, 2).unwrap();
        let spec = OutputSpec::new("HFA", CreationOptions::empty());
        let result = focal_filter(&store, &kernel, Path::new("in"), Path::new("out"), &spec);
        assert!(matches!(result, Err(Error::WriteTarget { .. })));
    }

    /// Memory store whose handles fail on demand and record how they were released
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_read_at: Option<(usize, usize)>,
        fail_write_at: Option<(usize, usize)>,
        fail_flush: bool,
        fail_reader_close: bool,
        reader_closed: Rc<Cell<bool>>,
        writer_closed: Rc<Cell<bool>>,
        writer_discarded: Rc<Cell<bool>>,
    }

    struct FlakyReader {
        inner: MemoryReader,
        fail_at: Option<(usize, usize)>,
        fail_close: bool,
        closed: Rc<Cell<bool>>,
    }

    struct FlakyWriter {
        inner: MemoryWriter,
        fail_at: Option<(usize, usize)>,
        fail_flush: bool,
        closed: Rc<Cell<bool>>,
        discarded: Rc<Cell<bool>>,
    }

    impl RasterStore for FlakyStore {
        type Reader = FlakyReader;
        type Writer = FlakyWriter;

        fn open_for_read(&self, path: &Path) -> Result<FlakyReader> {
            Ok(FlakyReader {
                inner: self.inner.open_for_read(path)?,
                fail_at: self.fail_read_at,
                fail_close: self.fail_reader_close,
                closed: Rc::clone(&self.reader_closed),
            })
        }

        fn create_for_write(
            &self,
            path: &Path,
            rows: usize,
            cols: usize,
            format: &str,
            options: &CreationOptions,
        ) -> Result<FlakyWriter> {
            Ok(FlakyWriter {
                inner: self.inner.create_for_write(path, rows, cols, format, options)?,
                fail_at: self.fail_write_at,
                fail_flush: self.fail_flush,
                closed: Rc::clone(&self.writer_closed),
                discarded: Rc::clone(&self.writer_discarded),
            })
        }
    }

    impl GridReader for FlakyReader {
        fn rows(&self) -> usize {
            self.inner.rows()
        }
        fn cols(&self) -> usize {
            self.inner.cols()
        }
        fn nodata(&self) -> Option<f64> {
            self.inner.nodata()
        }
        fn geo_transform(&self) -> GeoTransform {
            self.inner.geo_transform()
        }
        fn projection(&self) -> Option<CRS> {
            self.inner.projection()
        }
        fn read_cell(&self, row: usize, col: usize) -> Result<f64> {
            if self.fail_at == Some((row, col)) {
                return Err(Error::cell_io("in", row, col, "bad block"));
            }
            self.inner.read_cell(row, col)
        }
        fn close(&mut self) -> Result<()> {
            self.closed.set(true);
            self.inner.close()?;
            if self.fail_close {
                return Err(Error::raster_io("in", "close failed"));
            }
            Ok(())
        }
    }

    impl GridWriter for FlakyWriter {
        fn rows(&self) -> usize {
            self.inner.rows()
        }
        fn cols(&self) -> usize {
            self.inner.cols()
        }
        fn set_geo_transform(&mut self, transform: GeoTransform) -> Result<()> {
            self.inner.set_geo_transform(transform)
        }
        fn set_projection(&mut self, crs: Option<&CRS>) -> Result<()> {
            self.inner.set_projection(crs)
        }
        fn set_nodata(&mut self, nodata: Option<f64>) -> Result<()> {
            self.inner.set_nodata(nodata)
        }
        fn write_cell(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
            if self.fail_at == Some((row, col)) {
                return Err(Error::cell_io("out", row, col, "disk full"));
            }
            self.inner.write_cell(row, col, value)
        }
        fn close(&mut self) -> Result<()> {
            if self.fail_flush {
                return Err(Error::raster_io("out", "flush failed"));
            }
            self.closed.set(true);
            self.inner.close()
        }
        fn discard(&mut self) -> Result<()> {
            self.discarded.set(true);
            self.inner.discard()
        }
    }

    fn flaky_store() -> FlakyStore {
        let store = FlakyStore::default();
        store.inner.insert("in", Raster::filled(4, 4, 1.0));
        store
    }

    fn run(store: &FlakyStore) -> Result<FocalReport> {
        let kernel = Kernel::uniform(2, 2).unwrap();
        focal_filter(store, &kernel, Path::new("in"), Path::new("out"), &mem_spec())
    }

    #[test]
    fn test_success_closes_both_handles() {
        let store = flaky_store();
        run(&store).unwrap();
        assert!(store.reader_closed.get());
        assert!(store.writer_closed.get());
        assert!(!store.writer_discarded.get());
        assert!(store.inner.contains("out"));
    }

    #[test]
    fn test_read_failure_aborts_and_discards() {
        let store = FlakyStore {
            fail_read_at: Some((2, 1)),
            ..flaky_store()
        };
        match run(&store) {
            Err(Error::RasterIo { cell, .. }) => assert_eq!(cell, Some((2, 1))),
            other => panic!("expected RasterIo, got {:?}", other),
        }
        assert!(store.reader_closed.get());
        assert!(store.writer_discarded.get());
        assert!(!store.writer_closed.get());
        assert!(!store.inner.contains("out"));
    }

    #[test]
    fn test_write_failure_aborts_and_discards() {
        let store = FlakyStore {
            fail_write_at: Some((0, 2)),
            ..flaky_store()
        };
        assert!(matches!(run(&store), Err(Error::RasterIo { .. })));
        assert!(store.reader_closed.get());
        assert!(store.writer_discarded.get());
        assert!(!store.inner.contains("out"));
    }

    #[test]
    fn test_flush_failure_discards_output() {
        let store = FlakyStore {
            fail_flush: true,
            ..flaky_store()
        };
        match run(&store) {
            Err(e @ Error::RasterIo { .. }) => assert_eq!(e.stage(), "filtering"),
            other => panic!("expected RasterIo, got {:?}", other),
        }
        assert!(store.reader_closed.get());
        assert!(store.writer_discarded.get());
        assert!(!store.inner.contains("out"));
    }

    #[test]
    fn test_source_close_failure_keeps_finished_output() {
        let store = FlakyStore {
            fail_reader_close: true,
            ..flaky_store()
        };
        let report = run(&store).unwrap();
        assert_eq!(report.output_shape(), (3, 3));
        assert!(store.reader_closed.get());
        assert!(store.writer_closed.get());
        assert!(!store.writer_discarded.get());
        assert!(store.inner.contains("out"));
    }

    #[test]
    fn test_source_close_failure_after_error_reports_the_error() {
        let store = FlakyStore {
            fail_reader_close: true,
            fail_write_at: Some((1, 1)),
            ..flaky_store()
        };
        match run(&store) {
            Err(Error::RasterIo { cell, .. }) => assert_eq!(cell, Some((1, 1))),
            other => panic!("expected RasterIo, got {:?}", other),
        }
        assert!(!store.inner.contains("out"));
    }

    #[test]
    fn test_geokeys_copied_verbatim() {
        let store = MemoryStore::new();
        let keys = GeoKeys::new(
            vec![1, 1, 0, 4, 1024, 0, 1, 1, 1025, 0, 1, 2, 3072, 0, 1, 32767, 3074, 0, 1, 16033],
            vec![],
            "",
        );
        let mut input = georeferenced(3, 3, 1.0);
        input.set_crs(Some(CRS::GeoKeys(keys.clone())));
        store.insert("in", input);

        let kernel = Kernel::uniform(2, 2).unwrap();
        focal_filter(&store, &kernel, Path::new("in"), Path::new("out"), &mem_spec()).unwrap();
        assert_eq!(store.get("out").unwrap().crs(), Some(&CRS::GeoKeys(keys)));
    }

    #[test]
    fn test_kernel_too_large_still_closes_reader() {
        let store = flaky_store();
        let kernel = Kernel::uniform(5, 1).unwrap();
        let result = focal_filter(&store, &kernel, Path::new("in"), Path::new("out"), &mem_spec());
        assert!(matches!(result, Err(Error::KernelTooLarge { .. })));
        assert!(store.reader_closed.get());
        assert!(!store.writer_discarded.get());
        assert!(!store.inner.contains("out"));
    }

    #[test]
    fn test_default_output_spec() {
        let spec = OutputSpec::default();
        assert_eq!(spec.format, "GTiff");
        assert_eq!(spec.options.compression(), Some("DEFLATE"));
    }
}
