//! Valid-mode 2D convolution
//!
//! Every output cell is the weighted sum of the input cells covered by the
//! kernel when its top-left corner sits on that cell:
//!
//! ```text
//! out(i, j) = Σ_{di, dj} kernel(di, dj) * in(i + di, j + dj)
//! ```
//!
//! Windows that would run off the grid are not evaluated, so the output
//! shrinks by `kernel - 1` cells in each direction. NaN and no-data samples
//! get no special treatment and propagate through the sum.

use super::kernel::Kernel;
use geofocal_core::io::{GridReader, GridWriter};
use geofocal_core::raster::{Raster, RasterElement};
use geofocal_core::{Error, Result};
use tracing::debug;

/// Counters collected during a convolution run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvolutionStats {
    pub out_rows: usize,
    pub out_cols: usize,
    /// Number of input samples read
    pub cell_reads: u64,
    /// Number of output samples written
    pub cell_writes: u64,
}

/// Size of the valid-mode output for a `rows x cols` input.
///
/// # Errors
/// `KernelTooLarge` when the kernel does not fit inside the input in
/// either direction.
pub fn output_extent(rows: usize, cols: usize, kernel: &Kernel) -> Result<(usize, usize)> {
    let (kh, kw) = kernel.shape();
    if kh > rows || kw > cols {
        return Err(Error::KernelTooLarge {
            kernel_rows: kh,
            kernel_cols: kw,
            rows,
            cols,
        });
    }
    Ok((rows - kh + 1, cols - kw + 1))
}

/// Convolve band 1 of `reader` with `kernel`, writing into `writer`.
///
/// The writer must already have the output extent. Cells are produced in
/// row-major order and each one is written as soon as it is computed; the
/// first read or write error stops the run and is returned unchanged.
/// Neither handle is closed here.
pub fn convolve<R, W>(kernel: &Kernel, reader: &R, writer: &mut W) -> Result<ConvolutionStats>
where
    R: GridReader + ?Sized,
    W: GridWriter + ?Sized,
{
    let (out_rows, out_cols) = output_extent(reader.rows(), reader.cols(), kernel)?;
    if writer.rows() != out_rows || writer.cols() != out_cols {
        return Err(Error::SizeMismatch {
            er: out_rows,
            ec: out_cols,
            ar: writer.rows(),
            ac: writer.cols(),
        });
    }

    let (kh, kw) = kernel.shape();
    let weights = kernel.weights();
    let mut stats = ConvolutionStats {
        out_rows,
        out_cols,
        ..Default::default()
    };

    debug!(
        "convolving {}x{} input with {}x{} kernel into {}x{}",
        reader.rows(),
        reader.cols(),
        kh,
        kw,
        out_rows,
        out_cols
    );

    for i in 0..out_rows {
        for j in 0..out_cols {
            let mut acc = 0.0;
            for di in 0..kh {
                for dj in 0..kw {
                    let sample = reader.read_cell(i + di, j + dj)?;
                    acc += weights[[di, dj]] * sample;
                }
            }
            stats.cell_reads += (kh * kw) as u64;

            writer.write_cell(i, j, acc)?;
            stats.cell_writes += 1;
        }
    }

    Ok(stats)
}

/// Convolve an in-memory raster, returning a new `f64` raster.
///
/// The result carries the input's transform, CRS and no-data value
/// unchanged.
pub fn convolve_raster<T: RasterElement>(raster: &Raster<T>, kernel: &Kernel) -> Result<Raster<f64>> {
    let (out_rows, out_cols) = output_extent(raster.rows(), raster.cols(), kernel)?;
    let mut output: Raster<f64> = raster.with_same_meta(out_rows, out_cols);
    output.set_nodata(raster.nodata().and_then(RasterElement::into_f64));

    convolve(kernel, raster, &mut output)?;
    Ok(output)
}
