//! Member scheduling
//!
//! # Backend Selection
//!
//! 1. `sequential`: always the plain loop
//! 2. `parallel`: rayon fan-out, an error if the `parallel` feature is off
//! 3. `auto`: rayon when compiled in, otherwise the plain loop

use super::ensemble::Backend;
use crate::config::ExecutionMode;
use crate::error::{NowcastError, Result};
use tracing::info;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Pick the backend for an execution mode.
///
/// # Errors
///
/// `DependencyUnavailable` when `parallel` is requested without the feature.
pub fn resolve_backend(mode: ExecutionMode) -> Result<Backend> {
    match mode {
        ExecutionMode::Sequential => Ok(Backend::Sequential),
        ExecutionMode::Auto => {
            if cfg!(feature = "parallel") {
                Ok(Backend::Parallel)
            } else {
                info!("parallel feature not compiled in, running members sequentially");
                Ok(Backend::Sequential)
            }
        }
        ExecutionMode::Parallel => {
            if cfg!(feature = "parallel") {
                Ok(Backend::Parallel)
            } else {
                Err(NowcastError::DependencyUnavailable {
                    backend: "parallel",
                    reason: "crate was built without the `parallel` feature".to_string(),
                })
            }
        }
    }
}

/// Run `task` for every member index and collect results in index order
pub(crate) fn run_members<T, F>(backend: Backend, n_members: usize, task: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    match backend {
        #[cfg(feature = "parallel")]
        Backend::Parallel => (0..n_members).into_par_iter().map(task).collect(),
        #[cfg(not(feature = "parallel"))]
        Backend::Parallel => (0..n_members).map(task).collect(),
        Backend::Sequential => (0..n_members).map(task).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_is_always_available() {
        assert_eq!(
            resolve_backend(ExecutionMode::Sequential).unwrap(),
            Backend::Sequential
        );
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_available_with_feature() {
        assert_eq!(resolve_backend(ExecutionMode::Auto).unwrap(), Backend::Parallel);
        assert_eq!(resolve_backend(ExecutionMode::Parallel).unwrap(), Backend::Parallel);
    }

    #[cfg(not(feature = "parallel"))]
    #[test]
    fn test_parallel_unavailable_without_feature() {
        assert_eq!(resolve_backend(ExecutionMode::Auto).unwrap(), Backend::Sequential);
        let err = resolve_backend(ExecutionMode::Parallel).unwrap_err();
        assert!(matches!(err, NowcastError::DependencyUnavailable { .. }));
    }

    #[test]
    fn test_results_keep_member_order() {
        for backend in [Backend::Sequential, Backend::Parallel] {
            let out = run_members(backend, 64, |i| i * i);
            assert_eq!(out, (0..64).map(|i| i * i).collect::<Vec<_>>());
        }
    }
}
