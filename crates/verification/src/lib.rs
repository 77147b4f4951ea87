//! Forecast verification scores
//!
//! Scores an ensemble of fields against a single verifying observation.
//! Used by the nowcast integration tests as skill guardrails.

use nowcast_core::{Field, ForecastEnsemble};

/// Continuous ranked probability score at one pixel.
///
/// Uses the kernel form `E|X − y| − ½·E|X − X'|` over the ensemble values.
#[must_use]
pub fn crps_pixel(values: &[f32], observed: f32) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let y = f64::from(observed);
    let accuracy = values.iter().map(|&x| (f64::from(x) - y).abs()).sum::<f64>() / n;

    // Pairwise term from the sorted values: Σ_i (2i − n + 1)·x_(i)
    let mut sorted: Vec<f64> = values.iter().map(|&x| f64::from(x)).collect();
    sorted.sort_by(f64::total_cmp);
    let pairwise: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, x)| (2.0 * i as f64 - n + 1.0) * x)
        .sum();
    let spread = pairwise / (n * n);

    accuracy - spread
}

/// Mean CRPS over the grid.
///
/// # Panics
///
/// Panics if `members` is empty or any member differs in shape from `observed`.
#[must_use]
pub fn crps(members: &[&Field], observed: &Field) -> f64 {
    assert!(!members.is_empty(), "CRPS needs at least one member");
    assert!(
        members.iter().all(|m| m.same_shape(observed)),
        "ensemble and observation shapes differ"
    );

    let mut values = vec![0.0_f32; members.len()];
    let mut total = 0.0;
    for (i, &y) in observed.data.iter().enumerate() {
        for (v, member) in values.iter_mut().zip(members) {
            *v = member.data[i];
        }
        total += crps_pixel(&values, y);
    }
    total / observed.len() as f64
}

/// Mean CRPS of an ensemble at one lead time (0-based)
#[must_use]
pub fn ensemble_crps(ensemble: &ForecastEnsemble, lead_time: usize, observed: &Field) -> f64 {
    crps(&ensemble.at_lead_time(lead_time), observed)
}

/// Mean absolute error of a single deterministic field; equals its CRPS
#[must_use]
pub fn mean_absolute_error(forecast: &Field, observed: &Field) -> f64 {
    crps(&[forecast], observed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_single_member_is_absolute_error() {
        assert_abs_diff_eq!(crps_pixel(&[3.0], 1.0), 2.0);
    }

    #[test]
    fn test_pixel_matches_pairwise_definition() {
        let values = [0.0_f32, 1.0, 4.0];
        let y = 2.0;
        // E|X−y| = (2 + 1 + 2)/3, E|X−X'| = 2·(1 + 4 + 3)/9
        let expected = 5.0 / 3.0 - 0.5 * 16.0 / 9.0;
        assert_abs_diff_eq!(crps_pixel(&values, y), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_perfect_forecast_scores_zero() {
        let field = Field::from_fn(4, 3, |r, c| (r * 4 + c) as f32);
        assert_abs_diff_eq!(crps(&[&field, &field], &field), 0.0);
    }

    #[test]
    fn test_spread_rewarded_around_truth() {
        let observed = Field::with_value(2, 2, 0.0);
        let biased = Field::with_value(2, 2, 1.0);
        let low = Field::with_value(2, 2, -1.0);
        // A symmetric two-member ensemble beats a single biased member
        assert!(crps(&[&biased, &low], &observed) < mean_absolute_error(&biased, &observed));
    }
}
