//! Collaborator contracts
//!
//! Motion estimation and data ingestion live outside this crate. They are
//! consumed through two small traits so the orchestrator can be driven by any
//! implementation, including test doubles.

use crate::config::NowcastConfig;
use crate::error::Result;
use crate::field::{FieldSequence, MotionField};
use crate::nowcast::{forecast, ForecastEnsemble};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Turns a field sequence into a motion field (pixels per timestep)
pub trait MotionEstimator {
    /// Estimate the advection field.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn estimate(&self, fields: &FieldSequence) -> Result<MotionField>;
}

/// Descriptive values attached to a loaded field sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Precipitation detection threshold, in field units
    pub threshold: f32,
    /// Accumulation time of one field in minutes
    pub accutime: f32,
    /// Unit name (e.g. `"mm/h"`, `"dBR"`)
    pub unit: String,
    /// Value used for dry pixels
    pub zerovalue: f32,
}

/// Supplies the conditioning fields
pub trait FieldSource {
    /// Load fields ordered oldest first, with their metadata.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn load(&self) -> Result<(FieldSequence, Metadata)>;
}

/// Load fields, estimate motion and run a nowcast.
///
/// `R_thr` and `timestep` are taken from the metadata when the configuration
/// leaves them unset.
///
/// # Errors
///
/// Propagates source, estimator and [`forecast`] errors.
pub fn nowcast_from_source<S, M>(
    source: &S,
    estimator: &M,
    n_timesteps: usize,
    config: &NowcastConfig,
) -> Result<ForecastEnsemble>
where
    S: FieldSource + ?Sized,
    M: MotionEstimator + ?Sized,
{
    let (fields, metadata) = source.load()?;
    let motion = estimator.estimate(&fields)?;
    debug!(
        n_fields = fields.len(),
        unit = %metadata.unit,
        threshold = metadata.threshold,
        accutime = metadata.accutime,
        "loaded conditioning fields"
    );

    let config = NowcastConfig {
        r_thr: config.r_thr.or(Some(metadata.threshold)),
        timestep: config.timestep.or(Some(metadata.accutime)),
        ..config.clone()
    };
    forecast(&fields, &motion, n_timesteps, &config)
}
