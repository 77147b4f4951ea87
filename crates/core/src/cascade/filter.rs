//! Gaussian bandpass filter bank for the multiplicative cascade
//!
//! Band centres are spaced logarithmically between `l_0` and half the grid
//! length. Each band is a Gaussian in log-wavenumber; the bank is normalised
//! so the weights of every Fourier bin sum to one, which is what makes the
//! decomposition exactly invertible by summation.
//!
//! # Layout
//!
//! ```text
//! level 0      : centred on wavenumber 0 (carries the field mean)
//! level 1..n-2 : centred on l_0 · e^(k-1)
//! level n-1    : centred on L/2, held at 1 beyond the Nyquist radius
//! ```
//!
//! with `L = max(width, height)` and `e = (L / (2 l_0))^(1 / (n - 2))`.

use super::fft::radial_wavenumbers;
use crate::config::FilterConfig;
use crate::error::{NowcastError, Result};

/// Precomputed filter weights for one grid shape and level count
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    width: usize,
    height: usize,
    weights: Vec<Vec<f32>>,
    central_wavenumbers: Vec<f64>,
}

#[derive(Clone, Copy)]
struct LogGauss {
    centre: f64,
    scale: f64,
    ln_e: f64,
}

impl LogGauss {
    fn log_e(&self, x: f64) -> f64 {
        if x > 0.0 {
            x.ln() / self.ln_e
        } else {
            0.0
        }
    }

    fn eval(&self, r: f64) -> f64 {
        let d = self.log_e(r) - self.centre;
        (-(d * d) / (2.0 * self.scale * self.scale)).exp()
    }
}

impl BandpassFilter {
    /// Build the Gaussian filter bank.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if fewer than two levels are requested,
    /// or if the grid resolves too few radial wavenumbers for `n_levels`
    /// distinct bands.
    pub fn gaussian(
        width: usize,
        height: usize,
        n_levels: usize,
        params: &FilterConfig,
    ) -> Result<Self> {
        if n_levels < 2 {
            return Err(NowcastError::config(format!(
                "bandpass filter needs at least 2 levels, got {n_levels}"
            )));
        }
        if !(params.l_0.is_finite() && params.l_0 > 0.0) {
            return Err(NowcastError::config(format!(
                "filter l_0 must be finite and positive, got {}",
                params.l_0
            )));
        }
        let length = width.max(height) as f64;
        let ratio = 0.5 * length / params.l_0;
        if ratio <= 1.0 {
            return Err(NowcastError::config(format!(
                "grid of {width}x{height} is too small for l_0 = {}: half length must exceed l_0",
                params.l_0
            )));
        }
        let resolved = (length / 2.0) as usize + 1;
        if resolved < n_levels {
            return Err(NowcastError::config(format!(
                "grid of {width}x{height} resolves only {resolved} radial wavenumbers, fewer than {n_levels} cascade levels"
            )));
        }

        let e = ratio.powf(1.0 / (n_levels.saturating_sub(2).max(1)) as f64);
        let ln_e = e.ln();
        let log_e = |x: f64| x.ln() / ln_e;

        let mut bands = Vec::with_capacity(n_levels);
        let mut central_wavenumbers = Vec::with_capacity(n_levels);
        bands.push(LogGauss {
            centre: 0.0,
            scale: params.gauss_scale_0,
            ln_e,
        });
        central_wavenumbers.push(0.0);
        for k in 1..n_levels - 1 {
            let wavenumber = params.l_0 * e.powi(k as i32 - 1);
            bands.push(LogGauss {
                centre: log_e(wavenumber),
                scale: params.gauss_scale,
                ln_e,
            });
            central_wavenumbers.push(wavenumber);
        }
        let nyquist = length / 2.0;
        let top = LogGauss {
            centre: log_e(nyquist),
            scale: params.gauss_scale,
            ln_e,
        };
        central_wavenumbers.push(nyquist);

        let radii = radial_wavenumbers(width, height);
        let mut weights = vec![vec![0.0_f32; radii.len()]; n_levels];
        let mut column = vec![0.0_f64; n_levels];
        for (bin, &r) in radii.iter().enumerate() {
            for (k, band) in bands.iter().enumerate() {
                column[k] = band.eval(r);
            }
            column[n_levels - 1] = if r > nyquist { 1.0 } else { top.eval(r) };

            let sum: f64 = column.iter().sum();
            if sum > 0.0 {
                for (k, w) in column.iter().enumerate() {
                    weights[k][bin] = (w / sum) as f32;
                }
            } else {
                weights[n_levels - 1][bin] = 1.0;
            }
        }

        // The mean belongs to the lowest level only
        for (k, level) in weights.iter_mut().enumerate() {
            level[0] = if k == 0 { 1.0 } else { 0.0 };
        }

        Ok(Self {
            width,
            height,
            weights,
            central_wavenumbers,
        })
    }

    /// Number of cascade levels
    #[must_use]
    pub fn n_levels(&self) -> usize {
        self.weights.len()
    }

    /// Grid shape `(height, width)` the filter was built for
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Weights of one level for every Fourier bin (row-major, unshifted)
    #[must_use]
    pub fn weights(&self, level: usize) -> &[f32] {
        &self.weights[level]
    }

    /// Central wavenumber of each level
    #[must_use]
    pub fn central_wavenumbers(&self) -> &[f64] {
        &self.central_wavenumbers
    }

    /// Central spatial frequencies in cycles per unit distance, for grid spacing `d`
    #[must_use]
    pub fn central_frequencies(&self, d: f64) -> Vec<f64> {
        let length = self.width.max(self.height) as f64;
        let n = self.central_wavenumbers.len();
        self.central_wavenumbers
            .iter()
            .enumerate()
            .map(|(k, &wn)| {
                let f = if k == 0 {
                    1.0 / length
                } else if k == n - 1 {
                    0.5
                } else {
                    wn / length
                };
                f / d
            })
            .collect()
    }
}
