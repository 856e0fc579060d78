//! Compile-time settings of the search.

use std::time::Duration;

use crate::LatencyRange;

/// Lower bound of the simulated backend latency.
pub const MIN_LATENCY_MS: u64 = 10;
/// Upper bound of the simulated backend latency.
pub const MAX_LATENCY_MS: u64 = 5000;
/// Deadline of the whole search.
pub const TIMEOUT_MS: u64 = 3000;

/// Origin searched by the binary.
pub const DEFAULT_ORIGIN: &str = "nyc";
/// Destination searched by the binary.
pub const DEFAULT_DESTINATION: &str = "london";

/// Parameters of one search run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Bounds of the simulated backend latency.
    pub latency: LatencyRange,
    /// Deadline of the whole search.
    pub timeout: Duration,
    /// Where the route starts.
    pub origin: String,
    /// Where the route ends.
    pub destination: String,
    /// Seed for the latency draws. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            latency: LatencyRange::new(MIN_LATENCY_MS, MAX_LATENCY_MS),
            timeout: Duration::from_millis(TIMEOUT_MS),
            origin: DEFAULT_ORIGIN.to_string(),
            destination: DEFAULT_DESTINATION.to_string(),
            seed: None,
        }
    }
}
