//! Gaussian focal filtering
//!
//! - **kernel**: Normalized convolution kernels (Gaussian, uniform, custom)
//! - **convolution**: Valid-mode 2D convolution over grid handles
//! - **focal**: Open / validate / create / convolve / finalize pipeline

pub mod kernel;
pub mod convolution;
pub mod focal;

pub use kernel::{GaussianParams, Kernel, KernelAnchor};
pub use convolution::{convolve, convolve_raster, output_extent, ConvolutionStats};
pub use focal::{focal_filter, FocalReport, OutputSpec};
