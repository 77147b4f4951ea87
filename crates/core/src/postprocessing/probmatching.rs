//! Probability matching of forecast fields
//!
//! The cascade AR model preserves the spatial structure of the field but not
//! its marginal distribution: averaging levels smooths the extremes. These
//! routines restore the observed distribution.

/// Remap `values` by rank onto the empirical distribution of `target`.
///
/// The dry value of `values` (its minimum) maps onto the dry value of
/// `target`. If the target has more wet pixels than the forecast, its wet
/// fraction is first reduced to the forecast's by setting values below the
/// matching percentile to the target minimum.
///
/// # Panics
///
/// Panics if the slices differ in length.
pub fn match_empirical_cdf(values: &mut [f32], target: &[f32]) {
    assert_eq!(values.len(), target.len(), "CDF matching needs equal sizes");
    let n = values.len();
    if n == 0 {
        return;
    }
    let zero = values.iter().copied().fold(f32::INFINITY, f32::min);
    let zero_target = target.iter().copied().fold(f32::INFINITY, f32::min);

    let wet = values.iter().filter(|&&v| v > zero).count();
    let wet_target = target.iter().filter(|&&v| v > zero_target).count();

    let mut ranked = target.to_vec();
    if wet_target > wet {
        let war = wet as f64 / n as f64;
        let p = super::mask::quantile(target, 1.0 - war);
        for v in &mut ranked {
            if *v < p {
                *v = zero_target;
            }
        }
    }
    ranked.sort_by(f32::total_cmp);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let dry: Vec<bool> = values.iter().map(|&v| v == zero).collect();
    for (rank, &i) in order.iter().enumerate() {
        values[i] = if dry[i] { zero_target } else { ranked[rank] };
    }
}

/// Mean of the values at or above `threshold`, `None` if there are none
#[must_use]
pub fn wet_mean(values: &[f32], threshold: f32) -> Option<f64> {
    let (count, sum) = values
        .iter()
        .filter(|&&v| v >= threshold)
        .fold((0usize, 0.0_f64), |(c, s), &v| (c + 1, s + f64::from(v)));
    (count > 0).then(|| sum / count as f64)
}

/// Shift the wet pixels (≥ `threshold`) so their mean equals `target_mean`
pub fn match_mean(values: &mut [f32], threshold: f32, target_mean: f64) {
    let Some(mean) = wet_mean(values, threshold) else {
        return;
    };
    let shift = (target_mean - mean) as f32;
    for v in values.iter_mut().filter(|v| **v >= threshold) {
        *v += shift;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cdf_matching_takes_target_values() {
        let mut values = vec![0.3, 0.1, 0.2, 0.4];
        let target = [10.0, 40.0, 20.0, 30.0];
        match_empirical_cdf(&mut values, &target);
        // Minimum is the dry value and maps onto the target minimum
        assert_eq!(values, vec![30.0, 10.0, 20.0, 40.0]);
    }

    #[test]
    fn test_cdf_matching_trims_wetter_target() {
        // Forecast: three wet pixels of five; target: four wet pixels of five
        let mut values = vec![-15.0, -15.0, 1.0, 3.0, 2.0];
        let target = [0.0, 5.0, 6.0, 7.0, 8.0];
        match_empirical_cdf(&mut values, &target);
        // The lightest target rain (5.0) falls below the 40th percentile and is dropped
        assert_eq!(values, vec![0.0, 0.0, 6.0, 8.0, 7.0]);
    }

    #[test]
    fn test_mean_matching() {
        let mut values = vec![-15.0, 2.0, 4.0, -15.0];
        match_mean(&mut values, 0.0, 10.0);
        assert_eq!(values, vec![-15.0, 9.0, 11.0, -15.0]);
        assert_abs_diff_eq!(wet_mean(&values, 0.0).unwrap(), 10.0);

        let mut dry = vec![-15.0; 3];
        match_mean(&mut dry, 0.0, 10.0);
        assert_eq!(dry, vec![-15.0; 3]);
        assert!(wet_mean(&dry, 0.0).is_none());
    }
}
