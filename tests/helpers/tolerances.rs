//! Tolerance constants for time-domain comparisons.

use super::TEST_PPQN;

/// Half a tick in beats: the most a stored time can move from the appended one.
pub const TICK_EPSILON: f64 = 0.5 / TEST_PPQN as f64;

/// Beat/sample round trips land within one sample.
pub const SAMPLE_TOLERANCE: u64 = 1;
