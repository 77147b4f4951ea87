//! 2-D FFT on row-major grids
//!
//! Row transforms run in place on the flat buffer; column transforms gather
//! each column into a scratch buffer. Plans are created once per grid shape
//! and are `Send + Sync`, so one [`Fft2`] is shared read-only by all members.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Complex spectrum of a grid, row-major, unshifted (DC at index 0)
pub type Spectrum = Vec<Complex<f32>>;

/// Planned forward/inverse 2-D transforms for one grid shape
#[derive(Clone)]
pub struct Fft2 {
    width: usize,
    height: usize,
    row_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    col_forward: Arc<dyn Fft<f32>>,
    col_inverse: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for Fft2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Fft2 {
    /// Plan transforms for a `width × height` grid
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            width,
            height,
            row_forward: planner.plan_fft_forward(width),
            row_inverse: planner.plan_fft_inverse(width),
            col_forward: planner.plan_fft_forward(height),
            col_inverse: planner.plan_fft_inverse(height),
        }
    }

    /// Number of cells
    #[must_use]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Whether the planned grid is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forward transform of a real grid
    #[must_use]
    pub fn forward_real(&self, data: &[f32]) -> Spectrum {
        let mut buf: Spectrum = data.iter().map(|&v| Complex::new(v, 0.0)).collect();
        self.forward(&mut buf);
        buf
    }

    /// Inverse transform keeping the real part (input must be Hermitian)
    #[must_use]
    pub fn inverse_real(&self, spectrum: &[Complex<f32>]) -> Vec<f32> {
        let mut buf = spectrum.to_vec();
        self.inverse(&mut buf);
        buf.into_iter().map(|c| c.re).collect()
    }

    /// In-place unnormalised forward transform
    pub fn forward(&self, buf: &mut [Complex<f32>]) {
        self.transform(buf, &self.row_forward, &self.col_forward);
    }

    /// In-place inverse transform, normalised by `1 / (width * height)`
    pub fn inverse(&self, buf: &mut [Complex<f32>]) {
        self.transform(buf, &self.row_inverse, &self.col_inverse);
        let scale = 1.0 / self.len() as f32;
        for c in buf.iter_mut() {
            *c *= scale;
        }
    }

    fn transform(&self, buf: &mut [Complex<f32>], rows: &Arc<dyn Fft<f32>>, cols: &Arc<dyn Fft<f32>>) {
        debug_assert_eq!(buf.len(), self.len());
        for row in buf.chunks_exact_mut(self.width) {
            rows.process(row);
        }

        let mut column = vec![Complex::new(0.0, 0.0); self.height];
        for x in 0..self.width {
            for (y, c) in column.iter_mut().enumerate() {
                *c = buf[y * self.width + x];
            }
            cols.process(&mut column);
            for (y, c) in column.iter().enumerate() {
                buf[y * self.width + x] = *c;
            }
        }
    }
}

/// Signed integer frequency of FFT bin `i` for a transform of length `n`
#[inline]
#[must_use]
pub fn frequency_index(i: usize, n: usize) -> f64 {
    if i <= n / 2 {
        i as f64
    } else {
        i as f64 - n as f64
    }
}

/// Radial wavenumber `sqrt(kx² + ky²)` of every bin, row-major
#[must_use]
pub fn radial_wavenumbers(width: usize, height: usize) -> Vec<f64> {
    let mut r = Vec::with_capacity(width * height);
    for y in 0..height {
        let ky = frequency_index(y, height);
        for x in 0..width {
            let kx = frequency_index(x, width);
            r.push((kx * kx + ky * ky).sqrt());
        }
    }
    r
}

/// Total power `Σ|F|²` accumulated in f64
#[must_use]
pub fn power(spectrum: &[Complex<f32>]) -> f64 {
    spectrum.iter().map(|c| f64::from(c.norm_sqr())).sum()
}
