//! Skill guardrails for the STEPS nowcast
//!
//! Every method combination of the reference scenario (5 members, 6 levels,
//! AR(2), 3 lead times) must clearly beat Eulerian persistence of the latest
//! observation on the translating rain cell. Persistence scores about 1.8 dB
//! here and the nowcasts about 0.6 dB, so the bound catches a lost
//! advection or a smeared cascade. It is a regression guardrail for this
//! fixture, not a general accuracy guarantee.
//!
//! Run tests with: cargo test --test `steps_skill`

mod common;

use common::{rain_history, rain_motion, rain_observation, reference_config, DRY, SIZE};
use nowcast_core::config::{Domain, MaskMethod, ProbMatchingMethod};
use nowcast_core::{forecast, Field};
use nowcast_verification::{ensemble_crps, mean_absolute_error};

const N_TIMESTEPS: usize = 3;

fn check_skill(mask_method: MaskMethod, probmatching_method: ProbMatchingMethod, domain: Domain) {
    let config = nowcast_core::NowcastConfig {
        domain,
        ..reference_config(mask_method, probmatching_method)
    };
    let ensemble = forecast(&rain_history(), &rain_motion(), N_TIMESTEPS, &config).unwrap();
    assert_eq!(ensemble.shape(), (5, N_TIMESTEPS, SIZE, SIZE));
    assert!(ensemble.to_flat().iter().all(|v| v.is_finite()));

    let observed = rain_observation(N_TIMESTEPS);
    let crps = ensemble_crps(&ensemble, N_TIMESTEPS - 1, &observed);
    let dry = mean_absolute_error(&Field::with_value(SIZE, SIZE, DRY), &observed);
    let persistence = mean_absolute_error(rain_history().last(), &observed);
    println!(
        "{mask_method}/{probmatching_method}/{domain}: CRPS={crps:.2}, persistence={persistence:.2}, dry={dry:.2}"
    );
    assert!(persistence < dry);
    assert!(
        crps < 0.6 * persistence,
        "CRPS {crps} not clearly below the persistence score {persistence}"
    );
}

#[test]
fn test_no_mask_no_matching() {
    check_skill(MaskMethod::None, ProbMatchingMethod::None, Domain::Spatial);
}

#[test]
fn test_incremental_mask() {
    check_skill(MaskMethod::Incremental, ProbMatchingMethod::None, Domain::Spatial);
}

#[test]
fn test_sprog_mask() {
    check_skill(MaskMethod::Sprog, ProbMatchingMethod::None, Domain::Spatial);
}

#[test]
fn test_obs_mask() {
    check_skill(MaskMethod::Obs, ProbMatchingMethod::None, Domain::Spatial);
}

#[test]
fn test_cdf_matching() {
    check_skill(MaskMethod::None, ProbMatchingMethod::Cdf, Domain::Spatial);
}

#[test]
fn test_mean_matching() {
    check_skill(MaskMethod::None, ProbMatchingMethod::Mean, Domain::Spatial);
}

#[test]
fn test_spectral_incremental_cdf() {
    check_skill(MaskMethod::Incremental, ProbMatchingMethod::Cdf, Domain::Spectral);
}

#[test]
fn test_sprog_cdf() {
    check_skill(MaskMethod::Sprog, ProbMatchingMethod::Cdf, Domain::Spatial);
}
