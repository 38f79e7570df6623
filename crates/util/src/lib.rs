//! Core type aliases, constants, and runtime utilities for horizon.
//!
//! This crate provides the foundational types and configuration parameters
//! used throughout the horizon workspace.

// ============================================================================
// TYPE ALIASES
// ============================================================================
/// Values of ground variables, rewards, and expression results.
pub type Value = f64;
/// Probability mass in discrete distributions and sampling.
pub type Probability = f64;
/// Accumulated and per-step rewards, Q-value estimates.
pub type Reward = f64;
/// Additive hash keys of states, Kleene states, and expression contributions.
pub type HashKey = u64;

// ============================================================================
// TASK COMPILATION
// ============================================================================
/// Dense-cache threshold: hash bases at or below this get a vector cache,
/// larger ones a map cache.
pub const CACHE_VECTOR_LIMIT: HashKey = 50_000;

// ============================================================================
// SEARCH
// ============================================================================
/// Search node budget per planning step. The current step returns the best
/// action found so far once this many nodes are live.
pub const NODE_POOL_LIMIT: usize = 15_000_000;
/// Remaining-steps buckets for the cross-step root policy cache.
pub const POLICY_CACHE_BUCKETS: usize = 6;
/// Visit-count prior injected into decision-node children by the initializer.
pub const INITIAL_VISITS: u32 = 5;
/// Ratio of most- to least-visited child above which selection forces the
/// least-visited children.
pub const VISIT_DIFFERENCE_RATIO: u32 = 50;
/// Exploration constant fallback when the node's reward estimate is zero.
pub const EXPLORATION_FALLBACK: Reward = 100.0;

// ============================================================================
// TRAINING SET GENERATION
// ============================================================================
/// Number of states the random-walk generator aims for.
pub const TRAINING_SET_SIZE: usize = 200;
/// Probability of keeping a visited state that is not a reward extremum.
pub const TRAINING_INCLUSION_PROBABILITY: Probability = 0.1;
/// Wall-clock budget of the generator, in seconds.
pub const TRAINING_TIMEOUT: f64 = 2.0;

// ============================================================================
// RESOURCE LIMITS
// ============================================================================
/// Resident-memory threshold in kilobytes; crossing it disables caching
/// in every registered component (2560 MiB).
pub const RAM_LIMIT_KB: usize = 2_621_440;

// ============================================================================
// FLOAT COMPARISON
// ============================================================================
/// Tolerance for comparing evaluation results. Domain values are small
/// integers embedded in f64, so a fixed epsilon is sufficient.
pub const EPSILON: f64 = 1e-9;

/// True if the two values are equal up to [`EPSILON`].
pub fn value_eq(lhs: f64, rhs: f64) -> bool {
    (lhs - rhs).abs() < EPSILON
}
/// True if `lhs` is smaller than `rhs` beyond [`EPSILON`].
pub fn value_lt(lhs: f64, rhs: f64) -> bool {
    lhs + EPSILON < rhs
}
/// True if `lhs` is smaller than or equal to `rhs` up to [`EPSILON`].
pub fn value_le(lhs: f64, rhs: f64) -> bool {
    lhs < rhs + EPSILON
}
/// True if `lhs` is greater than `rhs` beyond [`EPSILON`].
pub fn value_gt(lhs: f64, rhs: f64) -> bool {
    lhs > rhs + EPSILON
}
/// True if `lhs` is greater than or equal to `rhs` up to [`EPSILON`].
pub fn value_ge(lhs: f64, rhs: f64) -> bool {
    lhs + EPSILON > rhs
}
/// True if the value represents the unset cache sentinel.
pub fn value_is_minus_infinity(val: f64) -> bool {
    val == f64::NEG_INFINITY
}

// ============================================================================
// RUNTIME UTILITIES
// ============================================================================

/// Monotonic wall-clock timer for cooperative timeouts.
///
/// Search loops call [`Timer::elapsed`] between rollouts (or between
/// deepening iterations) and return once the budget is exhausted.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
    /// Seconds since construction.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

impl std::fmt::Display for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.elapsed())
    }
}

/// Resident memory of this process in kilobytes, or 0 when the platform
/// offers no probe.
pub fn resident_memory_kb() -> usize {
    memory_stats::memory_stats()
        .map(|usage| usage.physical_mem / 1024)
        .unwrap_or(0)
}

/// Initialize terminal logging at INFO level.
pub fn log() {
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    simplelog::TermLogger::init(
        log::LevelFilter::Info,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("initialize logger");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsilon_comparisons() {
        assert!(value_eq(1.0, 1.0 + 1e-12));
        assert!(!value_eq(1.0, 1.0 + 1e-6));
        assert!(value_lt(0.0, 1.0));
        assert!(!value_lt(1.0, 1.0));
        assert!(value_le(1.0, 1.0));
        assert!(value_gt(1.0, 0.0));
        assert!(value_ge(1.0, 1.0));
    }

    #[test]
    fn timer_monotone() {
        let timer = Timer::start();
        assert!(timer.elapsed() >= 0.0);
    }
}
