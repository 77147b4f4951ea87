//! Shared state computed once before the member fan-out
//!
//! Everything in [`Shared`] is read-only for the members: AR coefficients,
//! the observed cascade history, the noise filter, masks that do not depend
//! on the member, and the unperturbed displacement per lead time.

use super::Run;
use crate::autoregression::{fit_level, iterate_ar_model, ArLevelModel};
use crate::cascade::{Cascade, CascadeDomain, LevelValue};
use crate::config::{MaskMethod, VelocityPerturbationMethod};
use crate::error::Result;
use crate::extrapolation::{Displacement, Extrapolator};
use crate::field::Field;
use crate::noise::NonparametricFilter;
use crate::postprocessing::mask::{
    incremental_mask, incremental_radius, sprog_mask, wet_area_ratio,
};
use crate::postprocessing::probmatching::wet_mean;
use tracing::debug;

/// Mask policy with its precomputed data
#[derive(Debug, Clone)]
pub(crate) enum MaskStrategy {
    None,
    /// Member-local grayscale mask, starting from `initial`
    Incremental {
        initial: Vec<f32>,
        radius: usize,
        rim: usize,
    },
    /// One mask per lead time, shared by all members
    Sprog(Vec<Vec<bool>>),
    /// Observed wet area in the Lagrangian frame
    Obs(Vec<bool>),
}

/// How member displacements are obtained
#[derive(Debug, Clone)]
pub(crate) enum MotionPlan {
    /// Identical for every member, one entry per lead time
    Shared(Vec<Displacement>),
    /// Each member perturbs the motion and integrates its own displacement
    Perturbed { kmperpixel: f32, timestep: f32 },
}

pub(crate) struct Shared<'a, D: CascadeDomain> {
    pub domain: D,
    pub run: &'a Run<'a>,
    pub extrapolator: Box<dyn Extrapolator>,
    pub width: usize,
    pub height: usize,
    pub models: Vec<ArLevelModel>,
    /// Per level, the last `ar_order` observed states, oldest first
    pub initial_levels: Vec<Vec<Vec<D::Value>>>,
    /// Statistics of the most recent observed cascade
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub noise: NonparametricFilter,
    pub mask: MaskStrategy,
    /// Most recent observation, the CDF matching target
    pub reference: Field,
    /// Observed mean of the wet pixels
    pub wet_mean: Option<f64>,
    pub motion_plan: MotionPlan,
}

/// Cascade made of the newest state of every level
pub(crate) fn latest_cascade<T: LevelValue>(
    levels: &[Vec<Vec<T>>],
    means: &[f64],
    stds: &[f64],
) -> Cascade<T> {
    Cascade {
        levels: levels
            .iter()
            .map(|history| history[history.len() - 1].clone())
            .collect(),
        means: means.to_vec(),
        stds: stds.to_vec(),
    }
}

/// Extrapolate history field `i` forward `ar_order − i` steps so the whole
/// window lines up with the most recent observation
fn colocate(run: &Run<'_>, extrapolator: &dyn Extrapolator) -> Vec<Field> {
    let p = run.config.ar_order;
    let history = run.precip.tail(p + 1);
    history
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let steps = p - i;
            if steps == 0 {
                field.clone()
            } else {
                extrapolator.extrapolate(field, run.motion, steps, field.min())
            }
        })
        .collect()
}

pub(crate) fn prepare<'a, D: CascadeDomain>(
    domain: D,
    run: &'a Run<'a>,
    extrapolator: Box<dyn Extrapolator>,
) -> Result<Shared<'a, D>> {
    let config = run.config;
    let p = config.ar_order;
    let (height, width) = run.precip.shape();

    let colocated = colocate(run, extrapolator.as_ref());
    let cascades = colocated
        .iter()
        .map(|f| domain.decompose(f))
        .collect::<Result<Vec<Cascade<D::Value>>>>()?;

    let n_levels = domain.decomposer().n_levels();
    let models = (0..n_levels)
        .map(|k| -> Result<ArLevelModel> {
            let model = fit_level(&domain, &cascades, k, p)?;
            debug!(
                level = k,
                gamma = ?model.gamma,
                phi = ?model.phi,
                "fitted AR model"
            );
            Ok(model)
        })
        .collect::<Result<Vec<_>>>()?;

    let newest = &cascades[p];
    let means = newest.means.clone();
    let stds = newest.stds.clone();
    let initial_levels: Vec<Vec<Vec<D::Value>>> = (0..n_levels)
        .map(|k| cascades[1..].iter().map(|c| c.levels[k].clone()).collect())
        .collect();

    let history = run.precip.tail(p + 1);
    let noise =
        NonparametricFilter::initialize(history.fields(), domain.decomposer().fft(), &config.noise)?;

    let reference = history.last().clone();
    let threshold = run.threshold;

    let mask = match config.mask_method {
        MaskMethod::None => MaskStrategy::None,
        MaskMethod::Obs => MaskStrategy::Obs(reference.threshold_mask(threshold)),
        MaskMethod::Incremental => {
            let kmperpixel = config.km_per_pixel("mask_method is 'incremental'")?;
            let timestep = config.timestep_minutes("mask_method is 'incremental'")?;
            let radius = incremental_radius(config.mask.mask_f, timestep, kmperpixel);
            let wet: Vec<bool> = (0..width * height)
                .map(|i| colocated.iter().all(|f| f.data[i] >= threshold))
                .collect();
            debug!(radius, rim = config.mask.mask_rim, "incremental mask");
            MaskStrategy::Incremental {
                initial: incremental_mask(&wet, width, height, radius, config.mask.mask_rim),
                radius,
                rim: config.mask.mask_rim,
            }
        }
        MaskMethod::Sprog => {
            let war = wet_area_ratio(&reference.data, threshold);
            let mut levels = initial_levels.clone();
            let mut masks = Vec::with_capacity(run.n_timesteps);
            for _ in 0..run.n_timesteps {
                for (history, model) in levels.iter_mut().zip(&models) {
                    iterate_ar_model(history, &model.phi, None);
                }
                let values = domain.reconstruct(&latest_cascade(&levels, &means, &stds));
                masks.push(sprog_mask(&values, war));
            }
            debug!(war, "S-PROG masks computed");
            MaskStrategy::Sprog(masks)
        }
    };

    let motion_plan = match config.vel_pert_method {
        VelocityPerturbationMethod::None => {
            let mut displacement = Displacement::zeros(width, height);
            let per_step = (0..run.n_timesteps)
                .map(|_| {
                    extrapolator.advance(&mut displacement, run.motion, 1.0);
                    displacement.clone()
                })
                .collect();
            MotionPlan::Shared(per_step)
        }
        VelocityPerturbationMethod::Bps => MotionPlan::Perturbed {
            kmperpixel: config.km_per_pixel("vel_pert_method is 'bps'")?,
            timestep: config.timestep_minutes("vel_pert_method is 'bps'")?,
        },
    };

    Ok(Shared {
        domain,
        run,
        extrapolator,
        width,
        height,
        models,
        initial_levels,
        means,
        stds,
        noise,
        mask,
        wet_mean: wet_mean(&reference.data, threshold),
        reference,
        motion_plan,
    })
}
