//! # geofocal core
//!
//! Core types and I/O for the geofocal focal filter.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Opaque coordinate reference system descriptor
//! - `RasterStore`: cell-level access to rasters on disk or in memory

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::{GeoKeys, CRS};
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::io::{CreationOptions, GridReader, GridWriter, RasterStore};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
}
