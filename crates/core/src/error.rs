//! Error types for geofocal

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for geofocal operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(
        "Kernel of {kernel_rows}x{kernel_cols} does not fit in a raster of {rows}x{cols}"
    )]
    KernelTooLarge {
        kernel_rows: usize,
        kernel_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster I/O failure on {}{}: {reason}", .path.display(), fmt_cell(.cell))]
    RasterIo {
        path: PathBuf,
        cell: Option<(usize, usize)>,
        reason: String,
    },

    #[error("Raster not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unreadable raster format in {}: {reason}", .path.display())]
    UnreadableFormat { path: PathBuf, reason: String },

    #[error("Cannot create output raster {}: {reason}", .path.display())]
    WriteTarget { path: PathBuf, reason: String },

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("{0}")]
    Other(String),
}

fn fmt_cell(cell: &Option<(usize, usize)>) -> String {
    match cell {
        Some((row, col)) => format!(" at cell ({}, {})", row, col),
        None => String::new(),
    }
}

impl Error {
    /// Raster I/O failure on a specific cell
    pub fn cell_io(path: impl Into<PathBuf>, row: usize, col: usize, reason: impl ToString) -> Self {
        Error::RasterIo {
            path: path.into(),
            cell: Some((row, col)),
            reason: reason.to_string(),
        }
    }

    /// Raster I/O failure not tied to a cell (flush, close, metadata)
    pub fn raster_io(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::RasterIo {
            path: path.into(),
            cell: None,
            reason: reason.to_string(),
        }
    }

    /// Name of the processing stage this error belongs to
    pub fn stage(&self) -> &'static str {
        match self {
            Error::InvalidParameter { .. } => "kernel generation",
            Error::KernelTooLarge { .. } => "extent validation",
            Error::NotFound(_) | Error::UnreadableFormat { .. } => "opening input",
            Error::WriteTarget { .. } => "creating output",
            Error::RasterIo { .. } | Error::IndexOutOfBounds { .. } => "filtering",
            _ => "processing",
        }
    }
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

/// Result type alias for geofocal operations
pub type Result<T> = std::result::Result<T, Error>;
