//! Ensemble nowcast orchestrator
//!
//! Wires cascade decomposition, AR models, noise, extrapolation and
//! post-processing into the per-member, per-lead-time loop.
//!
//! # Phases
//!
//! ```text
//! validate → co-locate history → decompose → fit AR      (once, shared)
//!          → members × lead times: noise → AR → reconstruct
//!                                  → mask → probmatch → extrapolate
//!          → gather in member order
//! ```
//!
//! The integration domain is chosen once: [`forecast`] dispatches to a
//! generic run over [`SpatialDomain`] or [`SpectralDomain`], and nothing in
//! the member loop branches on it.
//!
//! # Failure policy
//!
//! A numerical failure inside a member is attributed to that member. With
//! [`MemberFailurePolicy::Abort`] the run fails with that error; with
//! [`MemberFailurePolicy::Drop`] the member is discarded with a warning and
//! [`ForecastEnsemble::member_ids`] lists the survivors. Cancellation always
//! fails the whole run without partial output.

mod cancel;
mod ensemble;
mod executor;
mod member;
mod setup;
mod timing;

pub use cancel::CancellationToken;
pub use ensemble::{Backend, ForecastEnsemble};
pub use executor::resolve_backend;
pub use timing::{NowcastTiming, ProfilerScope};

use crate::cascade::{CascadeDecomposer, CascadeDomain, SpatialDomain, SpectralDomain};
use crate::config::{Domain, MemberFailurePolicy, NowcastConfig};
use crate::error::{NowcastError, Result};
use crate::extrapolation::{create_extrapolator, Extrapolator};
use crate::field::{Field, FieldSequence, MotionField};
use member::MemberSeeds;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{info, warn};

/// Validated inputs of one forecast run
pub(crate) struct Run<'a> {
    pub precip: &'a FieldSequence,
    pub motion: &'a MotionField,
    pub n_timesteps: usize,
    pub config: &'a NowcastConfig,
    pub backend: Backend,
    pub threshold: f32,
    /// Dry value: minimum of the conditioning fields
    pub r_min: f32,
    pub cancel: &'a CancellationToken,
}

/// Produce an ensemble nowcast.
///
/// `precip` holds the conditioning fields oldest first (at least
/// `ar_order + 1`), `motion` the advection field in pixels per timestep.
///
/// # Errors
///
/// - `Configuration` for invalid options, before any computation
/// - `Numerical` for non-finite inputs, degenerate cascades or failed members
/// - `DependencyUnavailable` if `execution = "parallel"` is not compiled in
///
/// # Example
///
/// ```rust
/// use nowcast_core::config::{MaskMethod, NowcastConfig, ProbMatchingMethod, VelocityPerturbationMethod};
/// use nowcast_core::{forecast, Field, FieldSequence, MotionField};
///
/// let fields: Vec<Field> = (0..3)
///     .map(|t| {
///         Field::from_fn(32, 32, |r, c| {
///             let d2 = (r as f32 - 16.0).powi(2) + (c as f32 - 10.0 - t as f32).powi(2);
///             if d2 < 49.0 { 10.0 - d2 / 10.0 } else { -15.0 }
///         })
///     })
///     .collect();
/// let precip = FieldSequence::new(fields).unwrap();
/// let motion = MotionField::uniform(32, 32, 1.0, 0.0);
/// let config = NowcastConfig {
///     n_ens_members: 2,
///     n_cascade_levels: 4,
///     mask_method: MaskMethod::None,
///     probmatching_method: ProbMatchingMethod::None,
///     vel_pert_method: VelocityPerturbationMethod::None,
///     r_thr: Some(-10.0),
///     seed: Some(1),
///     ..Default::default()
/// };
/// let ensemble = forecast(&precip, &motion, 3, &config).unwrap();
/// assert_eq!(ensemble.shape(), (2, 3, 32, 32));
/// ```
pub fn forecast(
    precip: &FieldSequence,
    motion: &MotionField,
    n_timesteps: usize,
    config: &NowcastConfig,
) -> Result<ForecastEnsemble> {
    forecast_with_cancellation(precip, motion, n_timesteps, config, &CancellationToken::new())
}

/// [`forecast`] with a cancellation token checked before every lead time.
///
/// # Errors
///
/// As [`forecast`], plus `Cancelled` when the token fires.
pub fn forecast_with_cancellation(
    precip: &FieldSequence,
    motion: &MotionField,
    n_timesteps: usize,
    config: &NowcastConfig,
    cancel: &CancellationToken,
) -> Result<ForecastEnsemble> {
    let init_scope = ProfilerScope::new("init");
    config.validate(precip, motion, n_timesteps)?;
    let backend = resolve_backend(config.execution)?;
    let run = Run {
        precip,
        motion,
        n_timesteps,
        config,
        backend,
        threshold: config.threshold()?,
        r_min: precip.min(),
        cancel,
    };
    let (height, width) = precip.shape();

    info!(
        width,
        height,
        members = config.n_ens_members,
        levels = config.n_cascade_levels,
        ar_order = config.ar_order,
        n_timesteps,
        domain = %config.domain,
        mask = %config.mask_method,
        probmatching = %config.probmatching_method,
        backend = %backend,
        "starting nowcast"
    );

    // Grid/level compatibility is a configuration property, checked for dry input too
    let decomposer =
        CascadeDecomposer::new(width, height, config.n_cascade_levels, &config.filter)?;

    if cancel.is_cancelled() {
        return Err(NowcastError::Cancelled);
    }

    if !precip.last().data.iter().any(|&v| v >= run.threshold) {
        warn!(
            threshold = run.threshold,
            "no precipitation in the latest observation, returning a dry ensemble"
        );
        let members = (0..config.n_ens_members)
            .map(|j| (j, vec![Field::with_value(width, height, run.r_min); n_timesteps]))
            .collect();
        let timing = NowcastTiming {
            init: init_scope.elapsed(),
            main_loop: Duration::ZERO,
        };
        return Ok(
            ForecastEnsemble::new(members, width, height, n_timesteps, config.domain, backend)
                .with_timing(timing),
        );
    }

    let extrapolator = create_extrapolator(config.extrap_method, &config.extrapolation);
    match config.domain {
        Domain::Spatial => execute(SpatialDomain::new(decomposer), &run, extrapolator, init_scope),
        Domain::Spectral => {
            execute(SpectralDomain::new(decomposer), &run, extrapolator, init_scope)
        }
    }
}

/// Independent seeds for every member, drawn from one master stream
fn member_seeds(seed: Option<u64>, n_members: usize) -> Vec<MemberSeeds> {
    let base = seed.unwrap_or_else(rand::random);
    let mut master = StdRng::seed_from_u64(base);
    (0..n_members)
        .map(|_| MemberSeeds {
            noise: master.random(),
            velocity: master.random(),
        })
        .collect()
}

fn execute<D: CascadeDomain>(
    domain: D,
    run: &Run<'_>,
    extrapolator: Box<dyn Extrapolator>,
    init_scope: ProfilerScope,
) -> Result<ForecastEnsemble> {
    let extrapolator_name = extrapolator.name();
    let shared = setup::prepare(domain, run, extrapolator)?;
    let seeds = member_seeds(run.config.seed, run.config.n_ens_members);
    let init = init_scope.elapsed();
    drop(init_scope);

    let main_scope = ProfilerScope::new("main_loop");
    let results = executor::run_members(run.backend, run.config.n_ens_members, |j| {
        member::run_member(&shared, j, seeds[j])
    });
    if run.cancel.is_cancelled() {
        return Err(NowcastError::Cancelled);
    }
    let members = gather(results, run.config.member_failure)?;
    let timing = NowcastTiming {
        init,
        main_loop: main_scope.elapsed(),
    };

    info!(
        members = members.len(),
        extrapolation = extrapolator_name,
        init_ms = timing.init.as_secs_f64() * 1000.0,
        main_loop_ms = timing.main_loop.as_secs_f64() * 1000.0,
        "nowcast finished"
    );
    Ok(ForecastEnsemble::new(
        members,
        shared.width,
        shared.height,
        run.n_timesteps,
        shared.domain.kind(),
        run.backend,
    )
    .with_timing(timing))
}

/// Apply the failure policy to per-member results, keeping member order
fn gather(
    results: Vec<Result<Vec<Field>>>,
    policy: MemberFailurePolicy,
) -> Result<Vec<(usize, Vec<Field>)>> {
    let total = results.len();
    let mut kept = Vec::with_capacity(total);
    let mut first_failure = None;
    for (j, result) in results.into_iter().enumerate() {
        match result {
            Ok(fields) => kept.push((j, fields)),
            Err(err) if policy == MemberFailurePolicy::Drop && err.is_member_local() => {
                warn!(member = j, error = %err, "dropping failed member");
                first_failure.get_or_insert(err);
            }
            Err(err) => return Err(err),
        }
    }
    if kept.is_empty() {
        let detail = match first_failure {
            Some(err) => format!("all {total} members failed, first failure: {err}"),
            None => "no members were run".to_string(),
        };
        return Err(NowcastError::numerical("ensemble", detail));
    }
    if kept.len() < total {
        warn!(
            kept = kept.len(),
            dropped = total - kept.len(),
            "returning partial ensemble"
        );
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(member: usize) -> NowcastError {
        NowcastError::numerical("reconstruction", "nan").for_member(member)
    }

    #[test]
    fn test_member_seeds_are_reproducible_and_distinct() {
        let a = member_seeds(Some(24), 4);
        let b = member_seeds(Some(24), 4);
        assert_eq!(a, b);
        assert_ne!(a[0], a[1]);
        assert_ne!(a[0].noise, a[0].velocity);
        assert_ne!(member_seeds(Some(25), 4), a);
    }

    #[test]
    fn test_gather_abort_returns_first_error() {
        let results = vec![Ok(vec![]), Err(failure(1)), Err(failure(2))];
        let err = gather(results, MemberFailurePolicy::Abort).unwrap_err();
        assert_eq!(err, failure(1));
    }

    #[test]
    fn test_gather_drop_keeps_survivors_in_order() {
        let field = Field::new(2, 2);
        let results = vec![
            Ok(vec![field.clone()]),
            Err(failure(1)),
            Ok(vec![field.clone()]),
        ];
        let kept = gather(results, MemberFailurePolicy::Drop).unwrap();
        let ids: Vec<usize> = kept.iter().map(|(j, _)| *j).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_drop_policy_through_executor_and_ensemble() {
        for backend in [Backend::Sequential, Backend::Parallel] {
            let results = executor::run_members(backend, 5, |j| {
                if j == 1 || j == 3 {
                    Err(failure(j))
                } else {
                    Ok(vec![Field::with_value(2, 2, j as f32); 2])
                }
            });
            let members = gather(results, MemberFailurePolicy::Drop).unwrap();
            let ensemble = ForecastEnsemble::new(members, 2, 2, 2, Domain::Spatial, backend);

            assert_eq!(ensemble.member_ids(), &[0, 2, 4]);
            assert_eq!(ensemble.shape(), (3, 2, 2, 2));
            // Member index 1 of the ensemble is original member 2
            assert_eq!(ensemble.get(1, 1, 0, 0), 2.0);

            let results = executor::run_members(backend, 5, |j| {
                if j == 3 {
                    Err(failure(j))
                } else {
                    Ok(vec![Field::new(2, 2)])
                }
            });
            assert_eq!(
                gather(results, MemberFailurePolicy::Abort).unwrap_err(),
                failure(3)
            );
        }
    }

    #[test]
    fn test_gather_drop_fails_when_nothing_survives() {
        let results: Vec<Result<Vec<Field>>> = vec![Err(failure(0)), Err(failure(1))];
        let err = gather(results, MemberFailurePolicy::Drop).unwrap_err();
        assert!(matches!(err, NowcastError::Numerical { stage: "ensemble", .. }));
    }

    #[test]
    fn test_gather_never_drops_configuration_errors() {
        let results = vec![Ok(vec![]), Err(NowcastError::config("bad"))];
        assert!(gather(results, MemberFailurePolicy::Drop).is_err());
        let results = vec![Ok(vec![]), Err(NowcastError::Cancelled)];
        assert_eq!(
            gather(results, MemberFailurePolicy::Drop).unwrap_err(),
            NowcastError::Cancelled
        );
    }
}
