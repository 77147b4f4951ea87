//! Stage timing helpers
//!
//! RAII scopes that measure wall-clock time for the init and main-loop
//! phases of a forecast.
use std::time::{Duration, Instant};
use tracing::trace;

/// Measures the time since creation; logs it at `trace` level when dropped.
pub struct ProfilerScope {
    start: Instant,
    name: &'static str,
}

impl ProfilerScope {
    /// Start measuring
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Time since creation
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time since creation in milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfilerScope {
    fn drop(&mut self) {
        trace!(scope = self.name, elapsed_ms = self.elapsed_ms(), "scope finished");
    }
}

/// Wall-clock time spent in each forecast phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NowcastTiming {
    /// Validation, history extrapolation, decomposition and AR fit
    pub init: Duration,
    /// Member trajectories
    pub main_loop: Duration,
}

impl NowcastTiming {
    /// Sum of both phases
    #[must_use]
    pub fn total(&self) -> Duration {
        self.init + self.main_loop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_profiler_scope_measures_time() {
        let scope = ProfilerScope::new("test");
        thread::sleep(Duration::from_millis(10));
        let elapsed = scope.elapsed_ms();
        assert!(elapsed >= 10.0, "Expected at least 10ms, got {elapsed}");
    }

    #[test]
    fn test_total() {
        let timing = NowcastTiming {
            init: Duration::from_millis(3),
            main_loop: Duration::from_millis(4),
        };
        assert_eq!(timing.total(), Duration::from_millis(7));
    }
}
