//! Convolution kernels
//!
//! A [`Kernel`] is an immutable `height x width` matrix of non-negative
//! weights summing to 1.

use ndarray::{Array2, ArrayView2};
use geofocal_core::{Error, Result};
use std::f64::consts::PI;

/// Where the Gaussian is centred inside the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelAnchor {
    /// Offsets are the cell indices themselves, so the peak sits on the
    /// top-left cell and the kernel is not symmetric about the window centre.
    #[default]
    Corner,
    /// Offsets are measured from the geometric centre of the window.
    Center,
}

/// Parameters for a Gaussian kernel
#[derive(Debug, Clone)]
pub struct GaussianParams {
    /// Window height in cells
    pub height: usize,
    /// Window width in cells
    pub width: usize,
    /// Standard deviation, in cells
    pub sigma: f64,
    /// Origin of the offsets fed to the Gaussian
    pub anchor: KernelAnchor,
}

impl Default for GaussianParams {
    fn default() -> Self {
        Self {
            height: 3,
            width: 3,
            sigma: 10.0,
            anchor: KernelAnchor::Corner,
        }
    }
}

/// Normalized 2D weight matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    weights: Array2<f64>,
}

impl Kernel {
    /// Gaussian kernel with offsets taken from the window corner.
    ///
    /// Each cell gets `exp(-(i² + j²) / 2σ²) / 2πσ²`, then the matrix is
    /// divided by its sum.
    ///
    /// # Errors
    /// `InvalidParameter` when a dimension is zero or `sigma` is not a
    /// positive finite number.
    pub fn gaussian(height: usize, width: usize, sigma: f64) -> Result<Self> {
        Self::gaussian_with(GaussianParams {
            height,
            width,
            sigma,
            anchor: KernelAnchor::Corner,
        })
    }

    /// Gaussian kernel with full control over the parameters
    pub fn gaussian_with(params: GaussianParams) -> Result<Self> {
        let GaussianParams {
            height,
            width,
            sigma,
            anchor,
        } = params;
        check_dimensions(height, width)?;
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(Error::InvalidParameter {
                name: "sigma",
                value: sigma.to_string(),
                reason: "must be a positive finite number".to_string(),
            });
        }

        let (ci, cj) = match anchor {
            KernelAnchor::Corner => (0.0, 0.0),
            KernelAnchor::Center => ((height - 1) as f64 / 2.0, (width - 1) as f64 / 2.0),
        };
        let two_sigma_sq = 2.0 * sigma * sigma;
        let norm = PI * two_sigma_sq;

        let raw = Array2::from_shape_fn((height, width), |(i, j)| {
            let di = i as f64 - ci;
            let dj = j as f64 - cj;
            (-(di * di + dj * dj) / two_sigma_sq).exp() / norm
        });

        Self::normalize(raw).map_err(|_| Error::InvalidParameter {
            name: "sigma",
            value: sigma.to_string(),
            reason: "Gaussian weights underflow or overflow".to_string(),
        })
    }

    /// Box kernel: every weight is `1 / (height * width)`
    pub fn uniform(height: usize, width: usize) -> Result<Self> {
        check_dimensions(height, width)?;
        Self::normalize(Array2::ones((height, width)))
    }

    /// Kernel from row-major weights, normalized to sum to 1
    pub fn from_weights(height: usize, width: usize, weights: Vec<f64>) -> Result<Self> {
        check_dimensions(height, width)?;
        if weights.len() != height * width {
            return Err(Error::InvalidParameter {
                name: "weights",
                value: format!("{} values", weights.len()),
                reason: format!("expected {} for a {}x{} kernel", height * width, height, width),
            });
        }
        if let Some(bad) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
            return Err(Error::InvalidParameter {
                name: "weights",
                value: bad.to_string(),
                reason: "weights must be finite and non-negative".to_string(),
            });
        }

        let raw = Array2::from_shape_vec((height, width), weights)
            .map_err(|e| Error::Other(e.to_string()))?;
        Self::normalize(raw)
    }

    fn normalize(raw: Array2<f64>) -> Result<Self> {
        let sum = raw.sum();
        if !(sum.is_finite() && sum > 0.0) {
            return Err(Error::InvalidParameter {
                name: "weights",
                value: sum.to_string(),
                reason: "weights must have a positive finite sum".to_string(),
            });
        }
        Ok(Self {
            weights: raw.mapv(|w| w / sum),
        })
    }

    /// Number of rows in the window
    pub fn height(&self) -> usize {
        self.weights.nrows()
    }

    /// Number of columns in the window
    pub fn width(&self) -> usize {
        self.weights.ncols()
    }

    /// (height, width)
    pub fn shape(&self) -> (usize, usize) {
        self.weights.dim()
    }

    /// Weight at window offset (i, j)
    pub fn weight(&self, i: usize, j: usize) -> Option<f64> {
        self.weights.get((i, j)).copied()
    }

    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    /// Sum of all weights (1 up to rounding)
    pub fn sum(&self) -> f64 {
        self.weights.sum()
    }
}

fn check_dimensions(height: usize, width: usize) -> Result<()> {
    if height == 0 || width == 0 {
        return Err(Error::InvalidParameter {
            name: "kernel size",
            value: format!("{}x{}", height, width),
            reason: "kernel height and width must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_is_normalized() {
        for &(h, w, sigma) in &[(1, 1, 1.0), (3, 3, 10.0), (5, 3, 0.7), (7, 9, 2.5), (2, 6, 0.1)] {
            let k = Kernel::gaussian(h, w, sigma).unwrap();
            assert_eq!(k.shape(), (h, w));
            assert_relative_eq!(k.sum(), 1.0, epsilon = 1e-6);
            assert!(k.weights().iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn test_gaussian_matches_formula() {
        let sigma: f64 = 1.5;
        let k = Kernel::gaussian(3, 3, sigma).unwrap();
        let raw = |i: f64, j: f64| {
            (-(i * i + j * j) / (2.0 * sigma * sigma)).exp() / (2.0 * PI * sigma * sigma)
        };
        let total: f64 = (0..3)
            .flat_map(|i| (0..3).map(move |j| (i as f64, j as f64)))
            .map(|(i, j)| raw(i, j))
            .sum();

        assert_relative_eq!(k.weight(0, 0).unwrap(), raw(0.0, 0.0) / total, epsilon = 1e-12);
        assert_relative_eq!(k.weight(1, 2).unwrap(), raw(1.0, 2.0) / total, epsilon = 1e-12);
        assert_relative_eq!(k.weight(2, 2).unwrap(), raw(2.0, 2.0) / total, epsilon = 1e-12);
    }

    #[test]
    fn test_corner_anchor_peaks_at_origin() {
        let k = Kernel::gaussian(3, 3, 1.0).unwrap();
        let peak = k.weight(0, 0).unwrap();
        assert!(k.weights().iter().all(|&v| v <= peak));
        // not symmetric about the window centre
        assert!(k.weight(0, 0).unwrap() > k.weight(2, 2).unwrap());
        // but symmetric in (i, j)
        assert_relative_eq!(k.weight(0, 2).unwrap(), k.weight(2, 0).unwrap());
    }

    #[test]
    fn test_center_anchor_is_symmetric() {
        let k = Kernel::gaussian_with(GaussianParams {
            height: 5,
            width: 5,
            sigma: 1.0,
            anchor: KernelAnchor::Center,
        })
        .unwrap();
        let peak = k.weight(2, 2).unwrap();
        assert!(k.weights().iter().all(|&v| v <= peak));
        assert_relative_eq!(k.weight(0, 0).unwrap(), k.weight(4, 4).unwrap());
        assert_relative_eq!(k.weight(0, 4).unwrap(), k.weight(4, 0).unwrap());
        assert_relative_eq!(k.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_large_sigma_approaches_uniform() {
        let k = Kernel::gaussian(3, 4, 1e6).unwrap();
        for &v in k.weights().iter() {
            assert_relative_eq!(v, 1.0 / 12.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_default_params_reproduce_historical_kernel() {
        let params = GaussianParams::default();
        let k = Kernel::gaussian_with(params).unwrap();
        assert_eq!(k, Kernel::gaussian(3, 3, 10.0).unwrap());
        // sigma = 10 over a 3x3 window is nearly flat
        for &v in k.weights().iter() {
            assert!((v - 1.0 / 9.0).abs() < 5e-3);
        }
    }

    #[test]
    fn test_invalid_sigma() {
        for sigma in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                Kernel::gaussian(3, 3, sigma),
                Err(Error::InvalidParameter { name: "sigma", .. })
            ));
        }
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(matches!(
            Kernel::gaussian(0, 3, 1.0),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(Kernel::uniform(3, 0).is_err());
    }

    #[test]
    fn test_uniform() {
        let k = Kernel::uniform(2, 2).unwrap();
        assert!(k.weights().iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_from_weights() {
        let k = Kernel::from_weights(1, 3, vec![1.0, 2.0, 1.0]).unwrap();
        assert_eq!(k.weight(0, 1), Some(0.5));
        assert_eq!(k.weight(0, 3), None);

        assert!(Kernel::from_weights(1, 3, vec![1.0, 2.0]).is_err());
        assert!(Kernel::from_weights(1, 2, vec![1.0, -1.0]).is_err());
        assert!(Kernel::from_weights(1, 2, vec![0.0, 0.0]).is_err());
    }
}
