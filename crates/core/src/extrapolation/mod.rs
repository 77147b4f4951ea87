//! Field extrapolation along a motion field
//!
//! The [`Extrapolator`] trait has two implementations, selected once from
//! [`ExtrapolationMethod`]:
//!
//! - [`SemiLagrangian`]: backward trajectories with bilinear interpolation
//! - [`Eulerian`]: persistence, the field stays where it is
//!
//! Trajectories are kept as an explicit [`Displacement`] so a member can
//! extend its own displacement one lead time at a time with a perturbed
//! motion field.

mod semilagrangian;

pub use semilagrangian::SemiLagrangian;

use crate::config::{ExtrapolationConfig, ExtrapolationMethod};
use crate::field::{Field, MotionField};

/// Accumulated offset from every pixel to its departure point, in pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Displacement {
    /// Column offset
    pub dx: Field,
    /// Row offset
    pub dy: Field,
}

impl Displacement {
    /// No displacement
    #[must_use]
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            dx: Field::new(width, height),
            dy: Field::new(width, height),
        }
    }
}

/// Advection scheme
pub trait Extrapolator: Send + Sync {
    /// Method name for logging
    fn name(&self) -> &'static str;

    /// Extend `displacement` by `steps` timesteps of `motion`
    fn advance(&self, displacement: &mut Displacement, motion: &MotionField, steps: f32);

    /// Sample `field` at the departure points, `outval` outside the grid
    fn warp(&self, field: &Field, displacement: &Displacement, outval: f32) -> Field;

    /// Advect `field` forward by `n_steps` timesteps
    fn extrapolate(&self, field: &Field, motion: &MotionField, n_steps: usize, outval: f32) -> Field {
        let mut displacement = Displacement::zeros(field.width, field.height);
        for _ in 0..n_steps {
            self.advance(&mut displacement, motion, 1.0);
        }
        self.warp(field, &displacement, outval)
    }
}

/// Persistence: no advection
#[derive(Debug, Clone, Copy, Default)]
pub struct Eulerian;

impl Extrapolator for Eulerian {
    fn name(&self) -> &'static str {
        "eulerian"
    }

    fn advance(&self, _displacement: &mut Displacement, _motion: &MotionField, _steps: f32) {}

    fn warp(&self, field: &Field, _displacement: &Displacement, _outval: f32) -> Field {
        field.clone()
    }
}

/// Build the extrapolator for a configured method
#[must_use]
pub fn create_extrapolator(
    method: ExtrapolationMethod,
    config: &ExtrapolationConfig,
) -> Box<dyn Extrapolator> {
    match method {
        ExtrapolationMethod::SemiLagrangian => Box::new(SemiLagrangian::new(config.substeps)),
        ExtrapolationMethod::Eulerian => Box::new(Eulerian),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eulerian_is_persistence() {
        let field = Field::from_fn(8, 8, |r, c| (r * 8 + c) as f32);
        let motion = MotionField::uniform(8, 8, 3.0, 3.0);
        let scheme = create_extrapolator(ExtrapolationMethod::Eulerian, &ExtrapolationConfig::default());
        assert_eq!(scheme.name(), "eulerian");
        assert_eq!(scheme.extrapolate(&field, &motion, 4, -1.0), field);
    }

    #[test]
    fn test_factory_selects_semilagrangian() {
        let scheme =
            create_extrapolator(ExtrapolationMethod::SemiLagrangian, &ExtrapolationConfig { substeps: 2 });
        assert_eq!(scheme.name(), "semilagrangian");
        let field = Field::from_fn(8, 8, |r, c| (r * 8 + c) as f32);
        let out = scheme.extrapolate(&field, &MotionField::uniform(8, 8, 1.0, 0.0), 1, -1.0);
        assert_eq!(out.get(2, 3), field.get(2, 2));
        assert_eq!(out.get(2, 0), -1.0);
    }
}
