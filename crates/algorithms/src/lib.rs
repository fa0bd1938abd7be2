//! # geofocal algorithms
//!
//! Focal filtering of single-band rasters.
//!
//! - **filter**: Gaussian kernel generation and valid-mode convolution,
//!   either on in-memory rasters or streamed through a `RasterStore`

pub mod filter;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::filter::{
        convolve, convolve_raster, focal_filter, output_extent,
        ConvolutionStats, FocalReport, GaussianParams, Kernel, KernelAnchor, OutputSpec,
    };
    pub use geofocal_core::prelude::*;
}
