//! One ensemble member trajectory
//!
//! Per lead time: noise → AR step → reconstruction → mask → probability
//! matching → extrapolation → thresholding. The member owns its RNG
//! streams, AR state, displacement and (incremental) mask; nothing it
//! writes is visible to other members.

use super::setup::{latest_cascade, MaskStrategy, MotionPlan, Shared};
use crate::autoregression::iterate_ar_model;
use crate::cascade::CascadeDomain;
use crate::config::ProbMatchingMethod;
use crate::error::{NowcastError, Result};
use crate::extrapolation::Displacement;
use crate::field::Field;
use crate::noise::VelocityPerturbator;
use crate::postprocessing::mask::{apply_binary, apply_weighted, incremental_mask};
use crate::postprocessing::probmatching::{match_empirical_cdf, match_mean};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// Seeds of a member's independent random streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemberSeeds {
    pub noise: u64,
    pub velocity: u64,
}

/// Run member `index` over every lead time; errors are attributed to the member
pub(crate) fn run_member<D: CascadeDomain>(
    shared: &Shared<'_, D>,
    index: usize,
    seeds: MemberSeeds,
) -> Result<Vec<Field>> {
    trajectory(shared, index, seeds).map_err(|e| e.for_member(index))
}

fn check_finite(values: &[f32], stage: &'static str, lead_time: usize) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(NowcastError::numerical(
            stage,
            format!("non-finite values at lead time {lead_time}"),
        ))
    }
}

fn trajectory<D: CascadeDomain>(
    shared: &Shared<'_, D>,
    index: usize,
    seeds: MemberSeeds,
) -> Result<Vec<Field>> {
    let run = shared.run;
    let config = run.config;
    let (width, height) = (shared.width, shared.height);
    let fft = shared.domain.decomposer().fft();

    let mut rng = StdRng::seed_from_u64(seeds.noise);
    let mut levels = shared.initial_levels.clone();
    let mut displacement = Displacement::zeros(width, height);
    let perturbator = match shared.motion_plan {
        MotionPlan::Perturbed {
            kmperpixel,
            timestep,
        } => {
            let mut vel_rng = StdRng::seed_from_u64(seeds.velocity);
            let pert = VelocityPerturbator::new(
                run.motion,
                kmperpixel,
                timestep,
                &config.vel_pert,
                &mut vel_rng,
            );
            debug!(member = index, factors = ?pert.factors(), "velocity perturbation");
            Some(pert)
        }
        MotionPlan::Shared(_) => None,
    };
    let mut member_mask = match &shared.mask {
        MaskStrategy::Incremental { initial, .. } => Some(initial.clone()),
        _ => None,
    };

    let mut forecasts = Vec::with_capacity(run.n_timesteps);
    for t in 0..run.n_timesteps {
        if run.cancel.is_cancelled() {
            return Err(NowcastError::Cancelled);
        }
        let lead_time = t + 1;

        let spectrum = shared.noise.generate_spectrum(&mut rng, fft);
        let eps = shared.domain.decompose_spectrum(&spectrum)?;
        for ((history, model), e) in levels.iter_mut().zip(&shared.models).zip(&eps.levels) {
            iterate_ar_model(history, &model.phi, Some(e));
        }

        let mut values = shared
            .domain
            .reconstruct(&latest_cascade(&levels, &shared.means, &shared.stds));
        check_finite(&values, "reconstruction", lead_time)?;
        let field_min = values.iter().copied().fold(f32::INFINITY, f32::min);

        match &shared.mask {
            MaskStrategy::None => {}
            MaskStrategy::Incremental { .. } => {
                if let Some(mask) = &member_mask {
                    apply_weighted(&mut values, mask, field_min);
                }
            }
            MaskStrategy::Sprog(masks) => apply_binary(&mut values, &masks[t], field_min),
            MaskStrategy::Obs(mask) => apply_binary(&mut values, mask, field_min),
        }

        match config.probmatching_method {
            ProbMatchingMethod::None => {}
            ProbMatchingMethod::Cdf => match_empirical_cdf(&mut values, &shared.reference.data),
            ProbMatchingMethod::Mean => {
                if let Some(target) = shared.wet_mean {
                    match_mean(&mut values, run.threshold, target);
                }
            }
        }

        if let (MaskStrategy::Incremental { radius, rim, .. }, Some(mask)) =
            (&shared.mask, member_mask.as_mut())
        {
            let wet: Vec<bool> = values.iter().map(|&v| v >= run.threshold).collect();
            *mask = incremental_mask(&wet, width, height, *radius, *rim);
        }

        let lagrangian = Field {
            data: values,
            width,
            height,
        };
        let step_displacement = match &shared.motion_plan {
            MotionPlan::Shared(per_step) => &per_step[t],
            MotionPlan::Perturbed { timestep, .. } => {
                if let Some(pert) = &perturbator {
                    let minutes = f64::from(*timestep) * lead_time as f64;
                    let motion = pert.perturbed(run.motion, minutes);
                    shared.extrapolator.advance(&mut displacement, &motion, 1.0);
                }
                &displacement
            }
        };
        let mut forecast = shared
            .extrapolator
            .warp(&lagrangian, step_displacement, run.r_min);
        for v in &mut forecast.data {
            if *v < run.threshold {
                *v = run.r_min;
            }
        }
        check_finite(&forecast.data, "extrapolation", lead_time)?;

        debug!(
            member = index,
            lead_time,
            mean = forecast.mean(),
            max = forecast.max(),
            "member step"
        );
        forecasts.push(forecast);
    }
    Ok(forecasts)
}
