//! Synthetic radar fixtures shared by the integration tests
//!
//! Values are in dBR: dry pixels sit at [`DRY`], the detection threshold is
//! [`THRESHOLD`]. Per-timestep jitter comes from seeded RNG streams so the
//! fixtures are identical on every run.

#![allow(dead_code)]

use nowcast_core::config::{MaskMethod, ProbMatchingMethod, VelocityPerturbationMethod};
use nowcast_core::{Field, FieldSequence, MotionField, NowcastConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SIZE: usize = 64;
pub const DRY: f32 = -15.0;
pub const THRESHOLD: f32 = -10.0;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn jitter(t: usize) -> impl FnMut() -> f32 {
    let mut rng = StdRng::seed_from_u64(1000 + t as u64);
    move || rng.random::<f32>() - 0.5
}

/// Rain cell translating one pixel per step to the right and slowly
/// intensifying; `t = 0..3` is the conditioning window, later steps verify.
pub fn rain_cell(t: usize) -> Field {
    let mut noise = jitter(t);
    let tf = t as f32;
    Field::from_fn(SIZE, SIZE, |r, c| {
        let (x, y) = (c as f32, r as f32);
        let d2 = (y - 32.0).powi(2) + (x - 22.0 - tf).powi(2);
        let e = noise();
        if d2 < 18.0 * 18.0 {
            5.0 + (15.0 + tf) * (-d2 / 200.0).exp()
                + 2.0 * (0.6 * (x - tf)).sin() * (0.4 * y).cos()
                + 1.5 * e
        } else {
            DRY
        }
    })
}

pub fn rain_history() -> FieldSequence {
    FieldSequence::new((0..3).map(rain_cell).collect()).unwrap()
}

/// Observation verifying lead time `lead_time` (1-based)
pub fn rain_observation(lead_time: usize) -> Field {
    rain_cell(2 + lead_time)
}

pub fn rain_motion() -> MotionField {
    MotionField::uniform(SIZE, SIZE, 1.0, 0.0)
}

/// Stationary, fully wet texture with fresh small-scale jitter every step
pub fn wet_texture(t: usize) -> Field {
    let mut noise = jitter(t);
    Field::from_fn(SIZE, SIZE, |r, c| {
        let (x, y) = (c as f32, r as f32);
        20.0 + 5.0 * (0.3 * x).sin() * (0.25 * y).cos() + 3.0 * (0.15 * (x + y)).cos() + 2.0 * noise()
    })
}

pub fn wet_history() -> FieldSequence {
    FieldSequence::new((0..3).map(wet_texture).collect()).unwrap()
}

pub fn still() -> MotionField {
    MotionField::uniform(SIZE, SIZE, 0.0, 0.0)
}

/// Configuration of the reference scenario: 2 km pixels, 5 minute steps
pub fn reference_config(
    mask_method: MaskMethod,
    probmatching_method: ProbMatchingMethod,
) -> NowcastConfig {
    NowcastConfig {
        n_ens_members: 5,
        n_cascade_levels: 6,
        ar_order: 2,
        mask_method,
        probmatching_method,
        r_thr: Some(THRESHOLD),
        kmperpixel: Some(2.0),
        timestep: Some(5.0),
        seed: Some(42),
        ..Default::default()
    }
}

/// Plain linear configuration: no mask, no matching, no motion perturbation
pub fn linear_config(n_ens_members: usize, threshold: f32) -> NowcastConfig {
    NowcastConfig {
        n_ens_members,
        n_cascade_levels: 6,
        mask_method: MaskMethod::None,
        probmatching_method: ProbMatchingMethod::None,
        vel_pert_method: VelocityPerturbationMethod::None,
        r_thr: Some(threshold),
        seed: Some(7),
        ..Default::default()
    }
}
