//! Stochastic perturbation generators
//!
//! - [`NonparametricFilter`]: spatially correlated cascade noise
//! - [`VelocityPerturbator`]: lead-time dependent motion field perturbations
//!
//! Both draw from a caller-owned RNG so every member's stream stays
//! independent of scheduling order.

mod nonparametric;
mod velocity;

pub use nonparametric::{remove_rain_discontinuity, tukey_window, NonparametricFilter};
pub use velocity::VelocityPerturbator;
