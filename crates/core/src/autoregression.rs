//! Per-level autoregressive models
//!
//! Each cascade level is modelled as an AR(p) process in time:
//!
//! ```text
//! x(t) = φ₁·x(t−1) + … + φ_p·x(t−p) + φ_{p+1}·ε(t)
//! ```
//!
//! The coefficients come from the Yule–Walker equations on the lag
//! correlations of the (co-located) conditioning cascades. The innovation
//! weight `φ_{p+1}` keeps the level at unit variance in the steady state.

use crate::cascade::{Cascade, CascadeDomain, LevelValue};
use crate::error::{NowcastError, Result};
use nalgebra::{DMatrix, DVector};

/// Largest lag correlation magnitude used in a fit; keeps the Yule–Walker
/// system well conditioned for perfectly persistent levels
const MAX_LAG_CORR: f64 = 0.9999;

/// Fitted AR model of one cascade level
#[derive(Debug, Clone, PartialEq)]
pub struct ArLevelModel {
    /// Lag-1..p correlation coefficients
    pub gamma: Vec<f64>,
    /// `φ₁..φ_p` followed by the innovation weight
    pub phi: Vec<f64>,
}

impl ArLevelModel {
    /// Model order `p`
    #[must_use]
    pub fn order(&self) -> usize {
        self.phi.len() - 1
    }

    /// Innovation weight `φ_{p+1}`
    #[must_use]
    pub fn innovation_weight(&self) -> f64 {
        self.phi[self.phi.len() - 1]
    }
}

/// Lag correlations of one level: `γ_k = corr(x(t), x(t−k))` for `k = 1..p`.
///
/// `history` is ordered oldest first and must hold at least `p + 1` cascades.
///
/// # Errors
///
/// Returns a configuration error if the history is shorter than `ar_order + 1`.
pub fn lag_correlations<D: CascadeDomain>(
    domain: &D,
    history: &[Cascade<D::Value>],
    level: usize,
    ar_order: usize,
) -> Result<Vec<f64>> {
    if history.len() < ar_order + 1 {
        return Err(NowcastError::config(format!(
            "AR({ar_order}) needs {} cascades, got {}",
            ar_order + 1,
            history.len()
        )));
    }
    let newest = &history[history.len() - 1].levels[level];
    Ok((1..=ar_order)
        .map(|k| {
            let older = &history[history.len() - 1 - k].levels[level];
            domain
                .correlation(newest, older)
                .clamp(-MAX_LAG_CORR, MAX_LAG_CORR)
        })
        .collect())
}

/// Move a lag-2 correlation into the region where an AR(2) process is stationary
#[must_use]
pub fn adjust_lag2_corrcoef(gamma_1: f64, gamma_2: f64) -> f64 {
    let lower = 2.0 * gamma_1 * gamma_1 - 1.0 + 1e-10;
    let upper = 1.0 - 1e-10;
    gamma_2.max(lower).min(upper)
}

/// Solve the Yule–Walker equations for `φ₁..φ_p` and append the innovation weight.
///
/// # Errors
///
/// Returns a numerical error if the correlation matrix is singular or the
/// solution is not finite.
pub fn estimate_ar_params_yw(gamma: &[f64]) -> Result<Vec<f64>> {
    let p = gamma.len();
    if p == 0 {
        return Err(NowcastError::config("AR order must be at least 1"));
    }
    let r = DMatrix::from_fn(p, p, |i, j| {
        if i == j {
            1.0
        } else {
            gamma[i.abs_diff(j) - 1]
        }
    });
    let rhs = DVector::from_column_slice(gamma);
    let solution = r.lu().solve(&rhs).ok_or_else(|| {
        NowcastError::numerical("ar_fit", "Yule-Walker correlation matrix is singular")
    })?;

    let mut phi: Vec<f64> = solution.iter().copied().collect();
    if !phi.iter().all(|v| v.is_finite()) {
        return Err(NowcastError::numerical(
            "ar_fit",
            format!("non-finite AR coefficients {phi:?}"),
        ));
    }
    let explained: f64 = gamma.iter().zip(&phi).map(|(g, f)| g * f).sum();
    let residual = 1.0 - explained;
    phi.push(if residual > 0.0 { residual.sqrt() } else { 0.0 });
    Ok(phi)
}

/// Whether `φ₁..φ_p` describe a stationary process (all companion-matrix
/// eigenvalues strictly inside the unit circle)
#[must_use]
pub fn is_stationary(phi: &[f64]) -> bool {
    let p = phi.len();
    if p == 0 {
        return true;
    }
    let companion = DMatrix::from_fn(p, p, |i, j| {
        if i == 0 {
            phi[j]
        } else if i == j + 1 {
            1.0
        } else {
            0.0
        }
    });
    companion
        .complex_eigenvalues()
        .iter()
        .all(|z| z.norm() < 1.0)
}

/// Fit one level from its conditioning history.
///
/// # Errors
///
/// `Configuration` for a short history; `Numerical` for singular or
/// non-stationary fits.
pub fn fit_level<D: CascadeDomain>(
    domain: &D,
    history: &[Cascade<D::Value>],
    level: usize,
    ar_order: usize,
) -> Result<ArLevelModel> {
    let mut gamma = lag_correlations(domain, history, level, ar_order)?;
    if ar_order == 2 {
        gamma[1] = adjust_lag2_corrcoef(gamma[0], gamma[1]);
    }
    let phi = estimate_ar_params_yw(&gamma)?;
    if !is_stationary(&phi[..ar_order]) {
        return Err(NowcastError::numerical(
            "ar_fit",
            format!("AR model of cascade level {level} is not stationary: phi = {phi:?}"),
        ));
    }
    Ok(ArLevelModel { gamma, phi })
}

/// Advance one level by a step.
///
/// `history` holds the last `p` states oldest first; the new state is pushed
/// and the oldest dropped. Without `eps` the innovation term is omitted,
/// which gives the deterministic (S-PROG) forecast.
pub fn iterate_ar_model<T: LevelValue>(history: &mut Vec<Vec<T>>, phi: &[f64], eps: Option<&[T]>) {
    let p = phi.len() - 1;
    debug_assert_eq!(history.len(), p);
    let n = history[0].len();

    let mut next = vec![T::default(); n];
    for i in 0..p {
        let coeff = phi[i] as f32;
        let past = &history[p - 1 - i];
        for (o, &x) in next.iter_mut().zip(past) {
            *o += x * coeff;
        }
    }
    if let Some(eps) = eps {
        let weight = phi[p] as f32;
        for (o, &e) in next.iter_mut().zip(eps) {
            *o += e * weight;
        }
    }

    history.remove(0);
    history.push(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{CascadeDecomposer, SpatialDomain};
    use crate::config::FilterConfig;
    use crate::field::Field;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ar1_coefficients() {
        let phi = estimate_ar_params_yw(&[0.8]).unwrap();
        assert_abs_diff_eq!(phi[0], 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(phi[1], (1.0_f64 - 0.64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_ar2_coefficients() {
        let (g1, g2) = (0.9_f64, 0.7_f64);
        let phi = estimate_ar_params_yw(&[g1, g2]).unwrap();
        let phi1 = g1 * (1.0 - g2) / (1.0 - g1 * g1);
        let phi2 = (g2 - g1 * g1) / (1.0 - g1 * g1);
        assert_abs_diff_eq!(phi[0], phi1, epsilon = 1e-10);
        assert_abs_diff_eq!(phi[1], phi2, epsilon = 1e-10);
        let residual = 1.0 - g1 * phi1 - g2 * phi2;
        assert_abs_diff_eq!(phi[2], residual.sqrt(), epsilon = 1e-10);
        assert!(is_stationary(&phi[..2]));
    }

    #[test]
    fn test_adjust_lag2_bounds() {
        // 2·0.9² − 1 = 0.62
        assert_abs_diff_eq!(adjust_lag2_corrcoef(0.9, 0.1), 0.62 + 1e-10, epsilon = 1e-12);
        assert_eq!(adjust_lag2_corrcoef(0.9, 0.7), 0.7);
        assert_eq!(adjust_lag2_corrcoef(0.5, 1.0), 1.0 - 1e-10);
    }

    #[test]
    fn test_stationarity_check() {
        assert!(is_stationary(&[0.5]));
        assert!(!is_stationary(&[1.1]));
        assert!(is_stationary(&[1.2, -0.5]));
        assert!(!is_stationary(&[0.6, 0.5]));
    }

    #[test]
    fn test_iterate_ar_model() {
        let mut history = vec![vec![1.0_f32, 2.0], vec![3.0, 4.0]];
        let phi = [0.5, 0.25, 2.0];
        iterate_ar_model(&mut history, &phi, Some(&[1.0, -1.0]));
        // 0.5·newest + 0.25·older + 2·eps
        assert_eq!(history, vec![vec![3.0, 4.0], vec![1.5 + 0.25 + 2.0, 2.0 + 0.5 - 2.0]]);

        iterate_ar_model(&mut history, &phi, None);
        assert_abs_diff_eq!(history[1][0], 0.5 * 3.75 + 0.25 * 3.0);
    }

    #[test]
    fn test_fit_level_on_shifted_fields() {
        let decomposer = CascadeDecomposer::new(32, 32, 4, &FilterConfig::default()).unwrap();
        let domain = SpatialDomain::new(decomposer);
        let history: Vec<_> = (0..3)
            .map(|t| {
                Field::from_fn(32, 32, |r, c| {
                    let x = (c + 32 - t) as f32 * 0.3;
                    (x.sin() + (r as f32 * 0.2).cos()) * 2.0 + ((r * 7 + c * 3) % 5) as f32 * 0.1 * t as f32
                })
            })
            .map(|f| domain.decompose(&f).unwrap())
            .collect();

        for level in 0..4 {
            let model = fit_level(&domain, &history, level, 2).unwrap();
            assert_eq!(model.order(), 2);
            assert!(model.gamma.iter().all(|g| g.abs() < 1.0));
            assert!(model.innovation_weight() >= 0.0);
            assert!(is_stationary(&model.phi[..2]));
        }
        let err = fit_level(&domain, &history[..2], 0, 2).unwrap_err();
        assert!(matches!(err, NowcastError::Configuration(_)));
    }
}
