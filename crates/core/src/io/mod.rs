//! I/O operations for reading and writing rasters
//!
//! The focal filter talks to storage only through [`RasterStore`],
//! [`GridReader`] and [`GridWriter`]. Implementations:
//!
//! - [`MemoryStore`]: path-keyed in-memory rasters
//! - [`GeoTiffStore`]: native GeoTIFF via the `tiff` crate
//! - `GdalStore`: any GDAL format (requires the `gdal` feature)

#[cfg(feature = "gdal")]
mod gdal_io;
mod geotiff;
mod memory;
mod store;

pub use geotiff::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, Compression, GeoTiffReader,
    GeoTiffStore, GeoTiffWriter,
};
pub use memory::{MemoryReader, MemoryStore, MemoryWriter};
pub use store::{CreationOptions, GridReader, GridWriter, RasterStore};

#[cfg(feature = "gdal")]
pub use gdal_io::{GdalReader, GdalStore, GdalWriter};

/// Store used for files when no store is chosen explicitly
#[cfg(feature = "gdal")]
pub type DefaultStore = GdalStore;

/// Store used for files when no store is chosen explicitly
#[cfg(not(feature = "gdal"))]
pub type DefaultStore = GeoTiffStore;
