//! Masking and probability matching
//!
//! Both stages are small tagged strategies composed orthogonally by the
//! orchestrator: any [`MaskMethod`](crate::config::MaskMethod) works with any
//! [`ProbMatchingMethod`](crate::config::ProbMatchingMethod).

pub mod mask;
pub mod probmatching;

pub use mask::{incremental_mask, sprog_mask};
pub use probmatching::{match_empirical_cdf, match_mean};
