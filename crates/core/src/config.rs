//! Nowcast configuration surface
//!
//! [`NowcastConfig`] carries every recognised option. Method selectors are
//! small tagged enums with lowercase names (`"incremental"`, `"cdf"`,
//! `"spectral"`, ...) so configurations can be read from JSON or parsed from
//! strings; unknown names are configuration errors.
//!
//! # Example
//!
//! ```rust
//! use nowcast_core::config::{MaskMethod, NowcastConfig, ProbMatchingMethod};
//!
//! let config = NowcastConfig {
//!     n_ens_members: 5,
//!     mask_method: "obs".parse().unwrap(),
//!     probmatching_method: ProbMatchingMethod::None,
//!     r_thr: Some(-10.0),
//!     ..Default::default()
//! };
//! assert_eq!(config.mask_method, MaskMethod::Obs);
//! ```

use crate::error::{NowcastError, Result};
use crate::field::{FieldSequence, MotionField};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

macro_rules! choice_enum {
    ($ty:ident, $option:literal, { $($name:literal => $variant:ident),+ $(,)? }) => {
        impl $ty {
            /// Lowercase option name
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = NowcastError;

            fn from_str(s: &str) -> Result<Self> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(NowcastError::config(format!(
                        concat!("unknown ", $option, " '{}', expected one of: {}"),
                        other,
                        [$($name),+].join(", ")
                    ))),
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Precipitation mask policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMethod {
    /// No masking
    None,
    /// Dilated observed mask that is recomputed from each member's forecast
    #[default]
    Incremental,
    /// Mask from a noise-free (S-PROG) forecast preserving the wet-area ratio
    Sprog,
    /// Observed wet area, carried along by extrapolation
    Obs,
}

choice_enum!(MaskMethod, "mask_method", {
    "none" => None,
    "incremental" => Incremental,
    "sprog" => Sprog,
    "obs" => Obs,
});

/// Probability-matching policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbMatchingMethod {
    /// Leave the forecast distribution untouched
    None,
    /// Rank-order remapping onto the most recent observation
    #[default]
    Cdf,
    /// Shift wet pixels so their mean equals the observed wet mean
    Mean,
}

choice_enum!(ProbMatchingMethod, "probmatching_method", {
    "none" => None,
    "cdf" => Cdf,
    "mean" => Mean,
});

/// Domain in which the AR model is integrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Cascade levels are real grids
    #[default]
    Spatial,
    /// Cascade levels are Fourier spectra; inverse transform at reconstruction
    Spectral,
}

choice_enum!(Domain, "domain", {
    "spatial" => Spatial,
    "spectral" => Spectral,
});

/// Advection scheme applied to forecast output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtrapolationMethod {
    /// Backward-trajectory semi-Lagrangian advection
    #[default]
    SemiLagrangian,
    /// Persistence (no advection)
    Eulerian,
}

choice_enum!(ExtrapolationMethod, "extrap_method", {
    "semilagrangian" => SemiLagrangian,
    "eulerian" => Eulerian,
});

/// Motion field perturbation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VelocityPerturbationMethod {
    /// Use the motion field as given
    None,
    /// Parallel/perpendicular Laplace perturbations growing with lead time
    #[default]
    Bps,
}

choice_enum!(VelocityPerturbationMethod, "vel_pert_method", {
    "none" => None,
    "bps" => Bps,
});

/// How members are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Parallel when the `parallel` feature is compiled in, sequential otherwise
    #[default]
    Auto,
    /// Always one member after another
    Sequential,
    /// Require the parallel fan-out
    Parallel,
}

choice_enum!(ExecutionMode, "execution", {
    "auto" => Auto,
    "sequential" => Sequential,
    "parallel" => Parallel,
});

/// What to do when a member trajectory produces non-finite values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberFailurePolicy {
    /// Fail the whole run
    #[default]
    Abort,
    /// Discard the member and return the surviving ensemble
    Drop,
}

choice_enum!(MemberFailurePolicy, "member_failure", {
    "abort" => Abort,
    "drop" => Drop,
});

/// Gaussian bandpass filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Central wavenumber of the first band-pass level
    pub l_0: f64,
    /// Width of the band-pass Gaussians in log-wavenumber units
    pub gauss_scale: f64,
    /// Width of the lowest (mean-carrying) level
    pub gauss_scale_0: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            l_0: 3.0,
            gauss_scale: 0.5,
            gauss_scale_0: 0.5,
        }
    }
}

/// Nonparametric noise filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Tukey window taper fraction (0 = rectangular, 1 = Hann)
    pub tukey_alpha: f64,
    /// Shift wet values down so they start at the dry value
    pub remove_rain_discontinuity: bool,
    /// Standardise real and imaginary parts of the averaged spectrum
    pub normalize_spectrum: bool,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            tukey_alpha: 0.2,
            remove_rain_discontinuity: true,
            normalize_spectrum: true,
        }
    }
}

/// Incremental mask parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Number of grayscale rings added around the dilated mask
    pub mask_rim: usize,
    /// Dilation speed factor (km per minute)
    pub mask_f: f32,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            mask_rim: 10,
            mask_f: 1.0,
        }
    }
}

/// Semi-Lagrangian integration parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtrapolationConfig {
    /// Trajectory sub-steps per lead time
    pub substeps: usize,
}

impl Default for ExtrapolationConfig {
    fn default() -> Self {
        Self { substeps: 1 }
    }
}

/// Coefficients `g(t) = p0 * t^p1 + p2` of the velocity perturbation scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityPerturbationConfig {
    /// Parallel component coefficients
    pub p_par: [f32; 3],
    /// Perpendicular component coefficients
    pub p_perp: [f32; 3],
}

impl Default for VelocityPerturbationConfig {
    fn default() -> Self {
        Self {
            p_par: [10.88, 0.23, -7.68],
            p_perp: [5.76, 0.31, -2.72],
        }
    }
}

/// Complete nowcast configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NowcastConfig {
    /// Number of ensemble members (≥ 1)
    pub n_ens_members: usize,
    /// Number of cascade levels (≥ 2)
    pub n_cascade_levels: usize,
    /// AR model order (≥ 1, ≤ history length − 1)
    pub ar_order: usize,
    /// Precipitation mask policy
    pub mask_method: MaskMethod,
    /// Probability-matching policy
    pub probmatching_method: ProbMatchingMethod,
    /// AR integration domain
    pub domain: Domain,
    /// Advection scheme
    pub extrap_method: ExtrapolationMethod,
    /// Motion perturbation scheme
    pub vel_pert_method: VelocityPerturbationMethod,
    /// Precipitation detection threshold, in field units
    #[serde(rename = "R_thr")]
    pub r_thr: Option<f32>,
    /// Grid spacing in kilometres
    pub kmperpixel: Option<f32>,
    /// Time between fields in minutes
    pub timestep: Option<f32>,
    /// Base seed; `None` draws one from the OS
    pub seed: Option<u64>,
    /// Member scheduling
    pub execution: ExecutionMode,
    /// Reaction to member-local numerical failures
    pub member_failure: MemberFailurePolicy,
    /// Bandpass filter parameters
    pub filter: FilterConfig,
    /// Noise filter parameters
    pub noise: NoiseConfig,
    /// Incremental mask parameters
    pub mask: MaskConfig,
    /// Extrapolation parameters
    pub extrapolation: ExtrapolationConfig,
    /// Velocity perturbation parameters
    pub vel_pert: VelocityPerturbationConfig,
}

impl Default for NowcastConfig {
    fn default() -> Self {
        Self {
            n_ens_members: 24,
            n_cascade_levels: 6,
            ar_order: 2,
            mask_method: MaskMethod::default(),
            probmatching_method: ProbMatchingMethod::default(),
            domain: Domain::default(),
            extrap_method: ExtrapolationMethod::default(),
            vel_pert_method: VelocityPerturbationMethod::default(),
            r_thr: None,
            kmperpixel: None,
            timestep: None,
            seed: None,
            execution: ExecutionMode::default(),
            member_failure: MemberFailurePolicy::default(),
            filter: FilterConfig::default(),
            noise: NoiseConfig::default(),
            mask: MaskConfig::default(),
            extrapolation: ExtrapolationConfig::default(),
            vel_pert: VelocityPerturbationConfig::default(),
        }
    }
}

fn require_positive(name: &str, value: Option<f32>, needed_by: &str) -> Result<f32> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(v) => Err(NowcastError::config(format!(
            "{name} must be finite and positive, got {v}"
        ))),
        None => Err(NowcastError::config(format!(
            "{name} is required when {needed_by}"
        ))),
    }
}

impl NowcastConfig {
    /// Precipitation threshold, validated
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `R_thr` is unset or not finite.
    pub fn threshold(&self) -> Result<f32> {
        match self.r_thr {
            Some(t) if t.is_finite() => Ok(t),
            Some(t) => Err(NowcastError::config(format!("R_thr must be finite, got {t}"))),
            None => Err(NowcastError::config("R_thr is required")),
        }
    }

    /// Grid spacing, required by the incremental mask and velocity perturbations
    ///
    /// # Errors
    ///
    /// Returns a configuration error if unset or not positive.
    pub fn km_per_pixel(&self, needed_by: &str) -> Result<f32> {
        require_positive("kmperpixel", self.kmperpixel, needed_by)
    }

    /// Timestep in minutes, required by the incremental mask and velocity perturbations
    ///
    /// # Errors
    ///
    /// Returns a configuration error if unset or not positive.
    pub fn timestep_minutes(&self, needed_by: &str) -> Result<f32> {
        require_positive("timestep", self.timestep, needed_by)
    }

    /// Check every fail-fast condition before any computation starts.
    ///
    /// # Errors
    ///
    /// - `Configuration` for invalid counts, missing parameters or grid mismatches
    /// - `Numerical` for non-finite input fields
    pub fn validate(
        &self,
        precip: &FieldSequence,
        motion: &MotionField,
        n_timesteps: usize,
    ) -> Result<()> {
        if n_timesteps < 1 {
            return Err(NowcastError::config(format!(
                "n_timesteps must be at least 1, got {n_timesteps}"
            )));
        }
        if self.n_ens_members < 1 {
            return Err(NowcastError::config("n_ens_members must be at least 1"));
        }
        if self.n_cascade_levels < 2 {
            return Err(NowcastError::config(format!(
                "n_cascade_levels must be at least 2, got {}",
                self.n_cascade_levels
            )));
        }
        if self.ar_order < 1 {
            return Err(NowcastError::config("ar_order must be at least 1"));
        }
        if precip.len() < self.ar_order + 1 {
            return Err(NowcastError::config(format!(
                "ar_order {} needs {} conditioning fields, got {}",
                self.ar_order,
                self.ar_order + 1,
                precip.len()
            )));
        }
        if motion.shape() != precip.shape() {
            return Err(NowcastError::config(format!(
                "motion field shape {:?} does not match precipitation shape {:?}",
                motion.shape(),
                precip.shape()
            )));
        }
        self.threshold()?;
        if self.vel_pert_method == VelocityPerturbationMethod::Bps {
            self.km_per_pixel("vel_pert_method is 'bps'")?;
            self.timestep_minutes("vel_pert_method is 'bps'")?;
        }
        if self.mask_method == MaskMethod::Incremental {
            self.km_per_pixel("mask_method is 'incremental'")?;
            self.timestep_minutes("mask_method is 'incremental'")?;
        }
        if !(0.0..=1.0).contains(&self.noise.tukey_alpha) {
            return Err(NowcastError::config(format!(
                "noise.tukey_alpha must be in [0, 1], got {}",
                self.noise.tukey_alpha
            )));
        }
        if self.extrapolation.substeps < 1 {
            return Err(NowcastError::config("extrapolation.substeps must be at least 1"));
        }
        if !precip.fields().iter().all(crate::field::Field::is_finite) {
            return Err(NowcastError::numerical(
                "input",
                "precipitation fields contain non-finite values",
            ));
        }
        if !motion.is_finite() {
            return Err(NowcastError::numerical(
                "input",
                "motion field contains non-finite values",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    fn inputs(n_fields: usize) -> (FieldSequence, MotionField) {
        let seq = FieldSequence::new(vec![Field::new(16, 16); n_fields]).unwrap();
        (seq, MotionField::uniform(16, 16, 1.0, 0.0))
    }

    fn base() -> NowcastConfig {
        NowcastConfig {
            r_thr: Some(0.1),
            kmperpixel: Some(2.0),
            timestep: Some(5.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_method_names() {
        assert_eq!("sprog".parse::<MaskMethod>().unwrap(), MaskMethod::Sprog);
        assert_eq!("CDF".parse::<ProbMatchingMethod>().unwrap(), ProbMatchingMethod::Cdf);
        assert_eq!("spectral".parse::<Domain>().unwrap(), Domain::Spectral);
        assert_eq!(MaskMethod::Incremental.to_string(), "incremental");

        let err = "fuzzy".parse::<MaskMethod>().unwrap_err();
        assert!(matches!(err, NowcastError::Configuration(ref m) if m.contains("mask_method")));
        assert!("hybrid".parse::<Domain>().is_err());
    }

    #[test]
    fn test_defaults_match_steps_conventions() {
        let config = NowcastConfig::default();
        assert_eq!(config.n_cascade_levels, 6);
        assert_eq!(config.ar_order, 2);
        assert_eq!(config.mask_method, MaskMethod::Incremental);
        assert_eq!(config.probmatching_method, ProbMatchingMethod::Cdf);
        assert_eq!(config.domain, Domain::Spatial);
        assert_eq!(config.filter.l_0, 3.0);
    }

    #[test]
    fn test_valid_config_passes() {
        let (seq, motion) = inputs(3);
        assert!(base().validate(&seq, &motion, 3).is_ok());
    }

    #[test]
    fn test_zero_timesteps_is_configuration_error() {
        let (seq, motion) = inputs(3);
        let err = base().validate(&seq, &motion, 0).unwrap_err();
        assert!(matches!(err, NowcastError::Configuration(_)));
    }

    #[test]
    fn test_ar_order_exceeding_history_fails() {
        let (seq, motion) = inputs(2);
        let err = base().validate(&seq, &motion, 1).unwrap_err();
        assert!(matches!(err, NowcastError::Configuration(ref m) if m.contains("ar_order")));
    }

    #[test]
    fn test_motion_shape_mismatch_fails() {
        let (seq, _) = inputs(3);
        let motion = MotionField::uniform(8, 16, 0.0, 0.0);
        let err = base().validate(&seq, &motion, 1).unwrap_err();
        assert!(matches!(err, NowcastError::Configuration(ref m) if m.contains("motion")));
    }

    #[test]
    fn test_incremental_mask_requires_grid_spacing() {
        let (seq, motion) = inputs(3);
        let config = NowcastConfig {
            kmperpixel: None,
            vel_pert_method: VelocityPerturbationMethod::None,
            ..base()
        };
        let err = config.validate(&seq, &motion, 1).unwrap_err();
        assert!(matches!(err, NowcastError::Configuration(ref m) if m.contains("kmperpixel")));

        let obs = NowcastConfig {
            mask_method: MaskMethod::Obs,
            ..config
        };
        assert!(obs.validate(&seq, &motion, 1).is_ok());
    }

    #[test]
    fn test_missing_threshold_fails() {
        let (seq, motion) = inputs(3);
        let config = NowcastConfig {
            r_thr: None,
            ..base()
        };
        assert!(config.validate(&seq, &motion, 1).is_err());
    }

    #[test]
    fn test_non_finite_input_is_numerical_error() {
        let mut fields = vec![Field::new(16, 16); 3];
        fields[1].set(3, 3, f32::NAN);
        let seq = FieldSequence::new(fields).unwrap();
        let motion = MotionField::uniform(16, 16, 0.0, 0.0);
        let err = base().validate(&seq, &motion, 1).unwrap_err();
        assert!(matches!(err, NowcastError::Numerical { stage: "input", .. }));
    }
}
