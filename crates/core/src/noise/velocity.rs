//! Motion field perturbations
//!
//! Each member draws two Laplace-distributed factors once, one along and one
//! across the local motion direction. Their amplitude grows with lead time
//! following `g(t) = p₀·t^p₁ + p₂` (t in minutes, g in km/h), which is then
//! converted to pixels per timestep.

use crate::config::VelocityPerturbationConfig;
use crate::field::{Field, MotionField};
use rand::Rng;

/// Laplace(0, 1/√2) sample (unit variance) by inverse CDF
fn laplace_unit<R: Rng>(rng: &mut R) -> f64 {
    let scale = std::f64::consts::FRAC_1_SQRT_2;
    let u = rng.random::<f64>() - 0.5;
    let tail = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
    -scale * u.signum() * tail.ln()
}

/// Per-member velocity perturbator
#[derive(Debug, Clone)]
pub struct VelocityPerturbator {
    eps_par: f64,
    eps_perp: f64,
    /// Unit vectors along the motion (x, y)
    par: (Field, Field),
    p_par: [f32; 3],
    p_perp: [f32; 3],
    /// Conversion from km/h to pixels per timestep
    vsf: f64,
}

impl VelocityPerturbator {
    /// Draw the member's perturbation factors.
    ///
    /// `kmperpixel` and `timestep` (minutes) convert the km/h amplitudes into
    /// pixels per timestep.
    pub fn new<R: Rng>(
        motion: &MotionField,
        kmperpixel: f32,
        timestep: f32,
        params: &VelocityPerturbationConfig,
        rng: &mut R,
    ) -> Self {
        let eps_par = laplace_unit(rng);
        let eps_perp = laplace_unit(rng);

        let (width, height) = (motion.u.width, motion.u.height);
        let mut ux = Field::new(width, height);
        let mut uy = Field::new(width, height);
        for (i, (&u, &v)) in motion.u.data.iter().zip(&motion.v.data).enumerate() {
            let norm = u.hypot(v);
            if norm > 0.0 {
                ux.data[i] = u / norm;
                uy.data[i] = v / norm;
            }
        }

        let pixels_per_km = 1.0 / f64::from(kmperpixel);
        Self {
            eps_par,
            eps_perp,
            par: (ux, uy),
            p_par: params.p_par,
            p_perp: params.p_perp,
            vsf: 60.0 / (f64::from(timestep) * pixels_per_km),
        }
    }

    /// Laplace factors `(ε_par, ε_perp)`
    #[must_use]
    pub fn factors(&self) -> (f64, f64) {
        (self.eps_par, self.eps_perp)
    }

    fn amplitude(p: [f32; 3], minutes: f64) -> f64 {
        f64::from(p[0]) * minutes.powf(f64::from(p[1])) + f64::from(p[2])
    }

    /// Perturbation in pixels per timestep at `minutes` after the analysis
    #[must_use]
    pub fn perturbation(&self, minutes: f64) -> MotionField {
        let a_par = Self::amplitude(self.p_par, minutes) * self.eps_par / self.vsf;
        let a_perp = Self::amplitude(self.p_perp, minutes) * self.eps_perp / self.vsf;
        let (ux, uy) = &self.par;
        let (width, height) = (ux.width, ux.height);
        let mut du = Field::new(width, height);
        let mut dv = Field::new(width, height);
        for i in 0..du.data.len() {
            let (px, py) = (f64::from(ux.data[i]), f64::from(uy.data[i]));
            // Perpendicular unit vector is the parallel one rotated by 90°
            du.data[i] = (a_par * px - a_perp * py) as f32;
            dv.data[i] = (a_par * py + a_perp * px) as f32;
        }
        MotionField { u: du, v: dv }
    }

    /// Perturbed motion field at `minutes` after the analysis
    #[must_use]
    pub fn perturbed(&self, motion: &MotionField, minutes: f64) -> MotionField {
        let mut out = self.perturbation(minutes);
        for (o, &u) in out.u.data.iter_mut().zip(&motion.u.data) {
            *o += u;
        }
        for (o, &v) in out.v.data.iter_mut().zip(&motion.v.data) {
            *o += v;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_laplace_moments() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples: Vec<f64> = (0..20_000).map(|_| laplace_unit(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 0.05);
        assert_abs_diff_eq!(var, 1.0, epsilon = 0.1);
    }

    #[test]
    fn test_perturbation_geometry() {
        let motion = MotionField::uniform(4, 4, 3.0, 0.0);
        let mut rng = StdRng::seed_from_u64(5);
        let pert = VelocityPerturbator::new(&motion, 2.0, 5.0, &VelocityPerturbationConfig::default(), &mut rng);
        let (eps_par, eps_perp) = pert.factors();

        let minutes = 15.0_f64;
        let p = VelocityPerturbationConfig::default();
        let g_par = f64::from(p.p_par[0]) * minutes.powf(f64::from(p.p_par[1])) + f64::from(p.p_par[2]);
        let g_perp = f64::from(p.p_perp[0]) * minutes.powf(f64::from(p.p_perp[1])) + f64::from(p.p_perp[2]);
        // vsf = 60 / (5 min · 0.5 px/km) = 24
        let d = pert.perturbation(minutes);
        assert_abs_diff_eq!(f64::from(d.u.get(1, 1)), g_par * eps_par / 24.0, epsilon = 1e-5);
        assert_abs_diff_eq!(f64::from(d.v.get(1, 1)), g_perp * eps_perp / 24.0, epsilon = 1e-5);

        let perturbed = pert.perturbed(&motion, minutes);
        assert_abs_diff_eq!(perturbed.u.get(2, 3), 3.0 + d.u.get(2, 3));
    }

    #[test]
    fn test_zero_motion_is_not_perturbed() {
        let motion = MotionField::uniform(4, 4, 0.0, 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        let pert = VelocityPerturbator::new(&motion, 1.0, 5.0, &VelocityPerturbationConfig::default(), &mut rng);
        let d = pert.perturbation(30.0);
        assert!(d.u.data.iter().chain(&d.v.data).all(|&v| v == 0.0));
    }
}
