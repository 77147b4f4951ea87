//! Spatial and spectral cascade domains
//!
//! Both domains share the filter bank and FFT plans of one
//! [`CascadeDecomposer`]. They differ only in what a level is: a real grid
//! or the band-filtered spectrum itself.

use super::fft::power;
use super::{mean_std, Cascade, CascadeDecomposer, CascadeDomain};
use crate::config::Domain;
use crate::error::{NowcastError, Result};
use rustfft::num_complex::Complex;

/// Relative standard deviation below which a level is considered empty
const DEGENERATE_STD: f64 = 1e-6;

fn check_level(level: usize, std: f64, scale: f64) -> Result<()> {
    if !std.is_finite() || std <= DEGENERATE_STD * scale.max(f64::MIN_POSITIVE) {
        return Err(NowcastError::numerical(
            "decomposition",
            format!("cascade level {level} has degenerate standard deviation {std:e}"),
        ));
    }
    Ok(())
}

/// Root-mean-square of the field behind a spectrum
fn field_rms(spectrum: &[Complex<f32>]) -> f64 {
    let n = spectrum.len() as f64;
    power(spectrum).sqrt() / n
}

/// Levels as normalised real grids
pub(super) fn decompose_spatial(
    decomposer: &CascadeDecomposer,
    spectrum: &[Complex<f32>],
) -> Result<Cascade<f32>> {
    let scale = field_rms(spectrum);
    let n_levels = decomposer.n_levels();
    let mut cascade = Cascade {
        levels: Vec::with_capacity(n_levels),
        means: Vec::with_capacity(n_levels),
        stds: Vec::with_capacity(n_levels),
    };

    for k in 0..n_levels {
        let band = decomposer.band(spectrum, k);
        let mut level = decomposer.fft().inverse_real(&band);
        let (mean, std) = mean_std(level.iter().map(|&v| f64::from(v)));
        check_level(k, std, scale)?;
        for v in &mut level {
            *v = ((f64::from(*v) - mean) / std) as f32;
        }
        cascade.levels.push(level);
        cascade.means.push(mean);
        cascade.stds.push(std);
    }
    Ok(cascade)
}

/// Sum `level · σ + μ` over all levels
pub(super) fn recompose_spatial(cascade: &Cascade<f32>, n_cells: usize) -> Vec<f32> {
    let mut out = vec![0.0_f64; n_cells];
    for ((level, &mean), &std) in cascade.levels.iter().zip(&cascade.means).zip(&cascade.stds) {
        for (o, &v) in out.iter_mut().zip(level) {
            *o += f64::from(v) * std + mean;
        }
    }
    out.into_iter().map(|v| v as f32).collect()
}

/// AR integration on real grids
#[derive(Debug, Clone)]
pub struct SpatialDomain {
    decomposer: CascadeDecomposer,
}

impl SpatialDomain {
    /// Wrap a decomposer
    #[must_use]
    pub fn new(decomposer: CascadeDecomposer) -> Self {
        Self { decomposer }
    }
}

impl CascadeDomain for SpatialDomain {
    type Value = f32;

    fn kind(&self) -> Domain {
        Domain::Spatial
    }

    fn decomposer(&self) -> &CascadeDecomposer {
        &self.decomposer
    }

    fn decompose_spectrum(&self, spectrum: &[Complex<f32>]) -> Result<Cascade<f32>> {
        decompose_spatial(&self.decomposer, spectrum)
    }

    fn reconstruct(&self, cascade: &Cascade<f32>) -> Vec<f32> {
        recompose_spatial(cascade, self.decomposer.n_cells())
    }

    fn correlation(&self, a: &[f32], b: &[f32]) -> f64 {
        let (mean_a, std_a) = mean_std(a.iter().map(|&v| f64::from(v)));
        let (mean_b, std_b) = mean_std(b.iter().map(|&v| f64::from(v)));
        if std_a <= 0.0 || std_b <= 0.0 {
            return 0.0;
        }
        let cov = a
            .iter()
            .zip(b)
            .map(|(&x, &y)| (f64::from(x) - mean_a) * (f64::from(y) - mean_b))
            .sum::<f64>()
            / a.len() as f64;
        cov / (std_a * std_b)
    }
}

/// AR integration on Fourier spectra.
///
/// Statistics follow from Parseval: for a spectrum `F` of `N` cells the
/// spatial mean is `F[0] / N` and the variance is `Σ|F|² / N² − mean²`.
#[derive(Debug, Clone)]
pub struct SpectralDomain {
    decomposer: CascadeDecomposer,
}

impl SpectralDomain {
    /// Wrap a decomposer
    #[must_use]
    pub fn new(decomposer: CascadeDecomposer) -> Self {
        Self { decomposer }
    }
}

impl CascadeDomain for SpectralDomain {
    type Value = Complex<f32>;

    fn kind(&self) -> Domain {
        Domain::Spectral
    }

    fn decomposer(&self) -> &CascadeDecomposer {
        &self.decomposer
    }

    fn decompose_spectrum(&self, spectrum: &[Complex<f32>]) -> Result<Cascade<Complex<f32>>> {
        let scale = field_rms(spectrum);
        let n = spectrum.len() as f64;
        let n_levels = self.decomposer.n_levels();
        let mut cascade = Cascade {
            levels: Vec::with_capacity(n_levels),
            means: Vec::with_capacity(n_levels),
            stds: Vec::with_capacity(n_levels),
        };

        for k in 0..n_levels {
            let mut band = self.decomposer.band(spectrum, k);
            let mean = f64::from(band[0].re) / n;
            let var = power(&band) / (n * n) - mean * mean;
            let std = var.max(0.0).sqrt();
            check_level(k, std, scale)?;

            band[0] -= Complex::new((mean * n) as f32, 0.0);
            let inv = (1.0 / std) as f32;
            for c in &mut band {
                *c *= inv;
            }
            cascade.levels.push(band);
            cascade.means.push(mean);
            cascade.stds.push(std);
        }
        Ok(cascade)
    }

    fn reconstruct(&self, cascade: &Cascade<Complex<f32>>) -> Vec<f32> {
        let n_cells = self.decomposer.n_cells();
        let mut spectrum = vec![Complex::new(0.0_f32, 0.0); n_cells];
        for (level, &std) in cascade.levels.iter().zip(&cascade.stds) {
            let s = std as f32;
            for (o, &c) in spectrum.iter_mut().zip(level) {
                *o += c * s;
            }
        }
        if let Some(dc) = spectrum.first_mut() {
            let total_mean: f64 = cascade.means.iter().sum();
            *dc += Complex::new((total_mean * n_cells as f64) as f32, 0.0);
        }
        self.decomposer.fft().inverse_real(&spectrum)
    }

    fn correlation(&self, a: &[Complex<f32>], b: &[Complex<f32>]) -> f64 {
        // DC is the mean and carries no correlation information
        let (mut cross, mut pa, mut pb) = (0.0_f64, 0.0_f64, 0.0_f64);
        for (&x, &y) in a.iter().zip(b).skip(1) {
            cross += f64::from((x * y.conj()).re);
            pa += f64::from(x.norm_sqr());
            pb += f64::from(y.norm_sqr());
        }
        if pa <= 0.0 || pb <= 0.0 {
            return 0.0;
        }
        cross / (pa * pb).sqrt()
    }
}
