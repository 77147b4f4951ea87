//! Precipitation Nowcasting Core Library
//!
//! Short-term probabilistic forecasts of gridded precipitation using the
//! STEPS method: the latest radar fields are split into a cascade of spatial
//! scales, each scale evolves as an autoregressive process driven by
//! spatially correlated noise, and the recombined field is advected along an
//! estimated motion field.
//!
//! ## Pipeline
//!
//! - Cascade decomposition with Gaussian bandpass filters in Fourier space
//! - Per-level AR(p) models fitted by Yule–Walker
//! - Nonparametric noise whose power spectrum follows the observations
//! - Semi-Lagrangian extrapolation with optional velocity perturbations
//! - Precipitation masking and probability matching
//!
//! Members run sequentially or on a rayon pool (`parallel` feature) and are
//! gathered in member order with identical results either way.

// Ensemble orchestrator
pub mod nowcast;

// Building blocks (organized in subfolders)
pub mod autoregression;
pub mod cascade;
pub mod extrapolation;
pub mod noise;
pub mod postprocessing;

// Data model, configuration and collaborator contracts
pub mod config;
pub mod error;
pub mod field;
pub mod interfaces;

// Re-export the entry points
pub use config::NowcastConfig;
pub use error::{NowcastError, Result};
pub use field::{Field, FieldSequence, MotionField};
pub use interfaces::{nowcast_from_source, FieldSource, Metadata, MotionEstimator};
pub use nowcast::{
    forecast, forecast_with_cancellation, Backend, CancellationToken, ForecastEnsemble,
    NowcastTiming,
};
