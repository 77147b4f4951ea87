//! Backward semi-Lagrangian advection
//!
//! # Implementation
//!
//! The displacement field stores, for every destination pixel, the offset
//! to its departure point. Extending it by one timestep walks each
//! trajectory further back with a midpoint rule:
//!
//! ```text
//! v̄  = V(x + D − ½·V(x + D)·Δt)
//! D' = D − v̄·Δt
//! ```
//!
//! repeated over `substeps` sub-steps. The motion field is sampled with
//! clamped bilinear interpolation; the advected field is sampled with
//! bilinear interpolation and a fill value outside the grid.

use super::{Displacement, Extrapolator};
use crate::field::{Field, MotionField};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Bilinear sample with coordinates clamped to the grid
fn sample_clamped(field: &Field, x: f32, y: f32) -> f32 {
    let x = x.clamp(0.0, (field.width - 1) as f32);
    let y = y.clamp(0.0, (field.height - 1) as f32);
    bilinear(field, x, y)
}

/// Bilinear sample, `outval` when the point lies outside the grid
fn sample_or(field: &Field, x: f32, y: f32, outval: f32) -> f32 {
    if !(x >= 0.0 && y >= 0.0 && x <= (field.width - 1) as f32 && y <= (field.height - 1) as f32) {
        return outval;
    }
    bilinear(field, x, y)
}

#[inline]
fn bilinear(field: &Field, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(field.width - 1);
    let y1 = (y0 + 1).min(field.height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let w = field.width;
    let v00 = field.data[y0 * w + x0];
    let v01 = field.data[y0 * w + x1];
    let v10 = field.data[y1 * w + x0];
    let v11 = field.data[y1 * w + x1];

    // Exact grid points return the stored value untouched
    if fx == 0.0 && fy == 0.0 {
        return v00;
    }
    let top = v00 + (v01 - v00) * fx;
    let bottom = v10 + (v11 - v10) * fx;
    top + (bottom - top) * fy
}

/// Semi-Lagrangian extrapolator
#[derive(Debug, Clone, Copy)]
pub struct SemiLagrangian {
    substeps: usize,
}

impl SemiLagrangian {
    /// Extrapolator with `substeps` trajectory sub-steps per timestep (at least one)
    #[must_use]
    pub fn new(substeps: usize) -> Self {
        Self {
            substeps: substeps.max(1),
        }
    }

    /// Sub-steps per timestep
    #[must_use]
    pub fn substeps(&self) -> usize {
        self.substeps
    }
}

impl Default for SemiLagrangian {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Extrapolator for SemiLagrangian {
    fn name(&self) -> &'static str {
        "semilagrangian"
    }

    fn advance(&self, displacement: &mut Displacement, motion: &MotionField, steps: f32) {
        let width = displacement.dx.width;
        let dt = steps / self.substeps as f32;
        for _ in 0..self.substeps {
            let dx_prev = &displacement.dx;
            let dy_prev = &displacement.dy;
            let step_row = |row: usize, out_x: &mut [f32], out_y: &mut [f32]| {
                for col in 0..width {
                    let i = row * width + col;
                    let x = col as f32 + dx_prev.data[i];
                    let y = row as f32 + dy_prev.data[i];
                    let u0 = sample_clamped(&motion.u, x, y) * dt;
                    let v0 = sample_clamped(&motion.v, x, y) * dt;
                    let u = sample_clamped(&motion.u, x - 0.5 * u0, y - 0.5 * v0) * dt;
                    let v = sample_clamped(&motion.v, x - 0.5 * u0, y - 0.5 * v0) * dt;
                    out_x[col] = dx_prev.data[i] - u;
                    out_y[col] = dy_prev.data[i] - v;
                }
            };

            let mut new_dx = vec![0.0_f32; dx_prev.data.len()];
            let mut new_dy = vec![0.0_f32; dy_prev.data.len()];

            #[cfg(feature = "parallel")]
            new_dx
                .par_chunks_mut(width)
                .zip(new_dy.par_chunks_mut(width))
                .enumerate()
                .for_each(|(row, (ox, oy))| step_row(row, ox, oy));

            #[cfg(not(feature = "parallel"))]
            new_dx
                .chunks_mut(width)
                .zip(new_dy.chunks_mut(width))
                .enumerate()
                .for_each(|(row, (ox, oy))| step_row(row, ox, oy));

            displacement.dx.data = new_dx;
            displacement.dy.data = new_dy;
        }
    }

    fn warp(&self, field: &Field, displacement: &Displacement, outval: f32) -> Field {
        let width = field.width;
        let mut data = vec![0.0_f32; field.data.len()];
        let warp_row = |row: usize, out: &mut [f32]| {
            for (col, o) in out.iter_mut().enumerate() {
                let i = row * width + col;
                let x = col as f32 + displacement.dx.data[i];
                let y = row as f32 + displacement.dy.data[i];
                *o = sample_or(field, x, y, outval);
            }
        };

        #[cfg(feature = "parallel")]
        data.par_chunks_mut(width)
            .enumerate()
            .for_each(|(row, out)| warp_row(row, out));

        #[cfg(not(feature = "parallel"))]
        data.chunks_mut(width)
            .enumerate()
            .for_each(|(row, out)| warp_row(row, out));

        Field {
            data,
            width,
            height: field.height,
        }
    }
}
