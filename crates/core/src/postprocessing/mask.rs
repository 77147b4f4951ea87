//! Precipitation masks
//!
//! A mask is a weight in [0, 1] per pixel. Values outside the mask are pulled
//! down to the forecast minimum:
//!
//! ```text
//! R' = R_min + (R − R_min) · mask
//! ```
//!
//! Boolean masks are the special case of weights 0 and 1.

/// Binary dilation with a diamond (4-connected) structuring element of `radius`
#[must_use]
pub fn dilate(mask: &[bool], width: usize, height: usize, radius: usize) -> Vec<bool> {
    let mut out = mask.to_vec();
    for _ in 0..radius {
        let prev = out.clone();
        for row in 0..height {
            for col in 0..width {
                let i = row * width + col;
                if prev[i] {
                    continue;
                }
                let hit = (col > 0 && prev[i - 1])
                    || (col + 1 < width && prev[i + 1])
                    || (row > 0 && prev[i - width])
                    || (row + 1 < height && prev[i + width]);
                out[i] = hit;
            }
        }
    }
    out
}

/// Structuring element radius of the incremental mask
#[must_use]
pub fn incremental_radius(mask_f: f32, timestep: f32, kmperpixel: f32) -> usize {
    let n = mask_f * timestep / kmperpixel;
    (((n - 1.0) / 2.0).floor().max(0.0) as usize).max(1)
}

/// Grayscale mask: `wet` dilated by `radius`, then `rim` one-pixel rings of
/// decreasing weight, normalised to a maximum of one.
///
/// A mask with no wet pixel stays all zero.
#[must_use]
pub fn incremental_mask(wet: &[bool], width: usize, height: usize, radius: usize, rim: usize) -> Vec<f32> {
    let mut current = dilate(wet, width, height, radius);
    let mut weight: Vec<f32> = current.iter().map(|&b| f32::from(u8::from(b))).collect();
    for _ in 0..rim {
        current = dilate(&current, width, height, 1);
        for (w, &b) in weight.iter_mut().zip(&current) {
            if b {
                *w += 1.0;
            }
        }
    }
    let max = weight.iter().copied().fold(0.0_f32, f32::max);
    if max > 0.0 {
        for w in &mut weight {
            *w /= max;
        }
    }
    weight
}

/// Weighted mask about the field minimum
pub fn apply_weighted(values: &mut [f32], mask: &[f32], min: f32) {
    for (v, &m) in values.iter_mut().zip(mask) {
        *v = min + (*v - min) * m;
    }
}

/// Boolean mask: pixels outside are set to `min`
pub fn apply_binary(values: &mut [f32], mask: &[bool], min: f32) {
    for (v, &m) in values.iter_mut().zip(mask) {
        if !m {
            *v = min;
        }
    }
}

/// Fraction of pixels at or above `threshold`
#[must_use]
pub fn wet_area_ratio(values: &[f32], threshold: f32) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|&&v| v >= threshold).count() as f64 / values.len() as f64
}

/// Value below which a fraction `q` of the samples lie (linear interpolation)
#[must_use]
pub fn quantile(values: &[f32], q: f64) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = (pos - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Smallest sample whose exceedance fraction is nearest to `war`
///
/// Ranks are taken from the sorted samples without interpolation, so the
/// threshold is always one of the values. A run of ties at the chosen rank
/// moves the threshold past the whole run; `None` if that leaves no sample.
fn nearest_rank_threshold(values: &[f32], war: f64) -> Option<f32> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let n = sorted.len();

    // Fraction of samples at or above rank i is (n − i) / n
    let mut rank = (0..n).min_by(|&a, &b| {
        let da = ((n - a) as f64 / n as f64 - war).abs();
        let db = ((n - b) as f64 / n as f64 - war).abs();
        da.total_cmp(&db)
    })?;

    if rank + 1 < n && sorted[rank] == sorted[rank + 1] {
        let tie = sorted[rank];
        rank = sorted.iter().rposition(|&v| v == tie)? + 1;
    }
    sorted.get(rank).copied()
}

/// Mask of the S-PROG forecast keeping the observed wet-area ratio
#[must_use]
pub fn sprog_mask(values: &[f32], war: f64) -> Vec<bool> {
    if war <= 0.0 {
        return vec![false; values.len()];
    }
    match nearest_rank_threshold(values, war) {
        Some(threshold) => values.iter().map(|&v| v >= threshold).collect(),
        None => vec![false; values.len()],
    }
}
