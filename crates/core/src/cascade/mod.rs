//! Multiplicative cascade decomposition
//!
//! A field is split into `n` band-pass levels by weighting its Fourier
//! spectrum with a [`BandpassFilter`] bank whose weights sum to one per bin.
//! Every level is normalised to zero mean and unit variance; the statistics
//! are kept alongside so reconstruction is `Σ (level · σ + μ)`.
//!
//! # Domains
//!
//! The AR model can run on real grids or directly on Fourier spectra. Both
//! are expressed through the [`CascadeDomain`] trait so the orchestrator picks
//! one implementation up front and the per-step code never branches on it:
//!
//! - [`SpatialDomain`]: levels are `Vec<f32>` grids
//! - [`SpectralDomain`]: levels are `Vec<Complex<f32>>` spectra; the inverse
//!   transform is deferred to reconstruction
//!
//! # Example
//!
//! ```rust
//! use nowcast_core::cascade::CascadeDecomposer;
//! use nowcast_core::config::FilterConfig;
//! use nowcast_core::Field;
//!
//! let field = Field::from_fn(64, 64, |r, c| ((r * 7 + c * 13) % 17) as f32);
//! let decomposer = CascadeDecomposer::new(64, 64, 6, &FilterConfig::default()).unwrap();
//! let cascade = decomposer.decompose(&field).unwrap();
//! let back = decomposer.reconstruct(&cascade);
//! assert!((back.get(10, 10) - field.get(10, 10)).abs() < 1e-3);
//! ```

mod decomposition;
pub mod fft;
mod filter;

pub use decomposition::{SpatialDomain, SpectralDomain};
pub use fft::{Fft2, Spectrum};
pub use filter::BandpassFilter;

use crate::config::{Domain, FilterConfig};
use crate::error::{NowcastError, Result};
use crate::field::Field;
use rustfft::num_complex::Complex;
use std::ops::{Add, AddAssign, Mul};

/// Element of a cascade level: a real grid value or a Fourier coefficient
pub trait LevelValue:
    Copy + Default + Send + Sync + Add<Output = Self> + AddAssign + Mul<f32, Output = Self>
{
}

impl LevelValue for f32 {}
impl LevelValue for Complex<f32> {}

/// Normalised cascade levels with their statistics
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade<T> {
    /// One normalised level per band, finest last
    pub levels: Vec<Vec<T>>,
    /// Mean of each level before normalisation
    pub means: Vec<f64>,
    /// Standard deviation of each level before normalisation
    pub stds: Vec<f64>,
}

impl<T> Cascade<T> {
    /// Number of levels
    #[must_use]
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }
}

/// Filter bank plus FFT plans for one grid shape
#[derive(Debug, Clone)]
pub struct CascadeDecomposer {
    filter: BandpassFilter,
    fft: Fft2,
    width: usize,
    height: usize,
}

impl CascadeDecomposer {
    /// Build a decomposer with the Gaussian filter bank.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the grid cannot resolve `n_levels` bands.
    pub fn new(width: usize, height: usize, n_levels: usize, params: &FilterConfig) -> Result<Self> {
        let filter = BandpassFilter::gaussian(width, height, n_levels, params)?;
        Ok(Self {
            filter,
            fft: Fft2::new(width, height),
            width,
            height,
        })
    }

    /// Filter bank
    #[must_use]
    pub fn filter(&self) -> &BandpassFilter {
        &self.filter
    }

    /// FFT plans
    #[must_use]
    pub fn fft(&self) -> &Fft2 {
        &self.fft
    }

    /// Number of levels produced
    #[must_use]
    pub fn n_levels(&self) -> usize {
        self.filter.n_levels()
    }

    /// Grid shape `(height, width)`
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Number of cells
    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.width * self.height
    }

    /// Spectrum of a validated input field.
    ///
    /// # Errors
    ///
    /// `Configuration` on a shape mismatch, `Numerical` on non-finite values.
    pub fn spectrum_of(&self, field: &Field) -> Result<Spectrum> {
        if field.shape() != self.shape() {
            return Err(NowcastError::config(format!(
                "field shape {:?} does not match decomposer shape {:?}",
                field.shape(),
                self.shape()
            )));
        }
        if !field.is_finite() {
            return Err(NowcastError::numerical(
                "decomposition",
                "input field contains non-finite values",
            ));
        }
        Ok(self.fft.forward_real(&field.data))
    }

    /// Spectrum weighted by one level of the filter bank
    #[must_use]
    pub fn band(&self, spectrum: &[Complex<f32>], level: usize) -> Spectrum {
        spectrum
            .iter()
            .zip(self.filter.weights(level))
            .map(|(&c, &w)| c * w)
            .collect()
    }

    /// Decompose a field into normalised spatial levels.
    ///
    /// # Errors
    ///
    /// `Configuration` on a shape mismatch; `Numerical` on non-finite input or
    /// a level without variance.
    pub fn decompose(&self, field: &Field) -> Result<Cascade<f32>> {
        let spectrum = self.spectrum_of(field)?;
        decomposition::decompose_spatial(self, &spectrum)
    }

    /// Sum normalised spatial levels back into a field
    #[must_use]
    pub fn reconstruct(&self, cascade: &Cascade<f32>) -> Field {
        Field {
            data: decomposition::recompose_spatial(cascade, self.n_cells()),
            width: self.width,
            height: self.height,
        }
    }
}

/// One AR integration domain: how levels are represented, decomposed,
/// recombined and correlated.
pub trait CascadeDomain: Send + Sync {
    /// Element type of a level
    type Value: LevelValue;

    /// Which domain this is
    fn kind(&self) -> Domain;

    /// Shared filter bank and FFT plans
    fn decomposer(&self) -> &CascadeDecomposer;

    /// Decompose a full spectrum into normalised levels.
    ///
    /// # Errors
    ///
    /// `Numerical` if a level has no variance or non-finite statistics.
    fn decompose_spectrum(&self, spectrum: &[Complex<f32>]) -> Result<Cascade<Self::Value>>;

    /// Recombine levels into a spatial field (row-major values)
    fn reconstruct(&self, cascade: &Cascade<Self::Value>) -> Vec<f32>;

    /// Correlation coefficient of two normalised levels
    fn correlation(&self, a: &[Self::Value], b: &[Self::Value]) -> f64;

    /// Decompose a spatial field.
    ///
    /// # Errors
    ///
    /// See [`CascadeDecomposer::spectrum_of`] and [`CascadeDomain::decompose_spectrum`].
    fn decompose(&self, field: &Field) -> Result<Cascade<Self::Value>> {
        let spectrum = self.decomposer().spectrum_of(field)?;
        self.decompose_spectrum(&spectrum)
    }
}

/// Mean and standard deviation accumulated in f64
pub(crate) fn mean_std(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let (mut n, mut sum) = (0usize, 0.0_f64);
    for v in values.clone() {
        n += 1;
        sum += v;
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let var = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mean_std() {
        let (m, s) = mean_std([1.0, 2.0, 3.0, 4.0].into_iter());
        assert_abs_diff_eq!(m, 2.5);
        assert_abs_diff_eq!(s, 1.25_f64.sqrt());
        assert_eq!(mean_std(std::iter::empty()), (0.0, 0.0));
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let decomposer = CascadeDecomposer::new(32, 32, 4, &FilterConfig::default()).unwrap();
        let err = decomposer.decompose(&Field::new(16, 32)).unwrap_err();
        assert!(matches!(err, NowcastError::Configuration(_)));
    }

    #[test]
    fn test_non_finite_input_is_rejected() {
        let decomposer = CascadeDecomposer::new(32, 32, 4, &FilterConfig::default()).unwrap();
        let mut field = Field::from_fn(32, 32, |r, c| (r + c) as f32);
        field.set(3, 3, f32::INFINITY);
        let err = decomposer.decompose(&field).unwrap_err();
        assert!(matches!(err, NowcastError::Numerical { stage: "decomposition", .. }));
    }
}
