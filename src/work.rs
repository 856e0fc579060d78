//! The route backend raced by [`search()`](crate::search()).

use std::{sync::Mutex, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::{CancellationToken, MayBeCancelled};

/// Inclusive bounds of a simulated latency, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyRange {
    min_ms: u64,
    max_ms: u64,
}

impl LatencyRange {
    /// Bounds are swapped if `min_ms > max_ms`.
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        if min_ms <= max_ms {
            Self { min_ms, max_ms }
        } else {
            Self {
                min_ms: max_ms,
                max_ms: min_ms,
            }
        }
    }

    /// A range holding a single latency.
    pub const fn fixed(ms: u64) -> Self {
        Self::new(ms, ms)
    }

    /// The lower bound.
    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    /// The upper bound.
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Draw a latency uniformly from the range.
    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

/// Origin and destination of a search. Not validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteQuery {
    /// Where the route starts.
    pub origin: String,
    /// Where the route ends.
    pub destination: String,
}

impl RouteQuery {
    /// Create a query from any pair of identifiers.
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
        }
    }
}

/// A blocking source of routes.
///
/// Implementations run on a dedicated thread and should return `Err(reason)`
/// as soon as `ct` is cancelled.
pub trait Backend: Send + Sync + 'static {
    /// Return the routes for `query`, or `Err(reason)` once `ct` is cancelled.
    fn find_routes(&self, query: &RouteQuery, ct: &CancellationToken)
        -> MayBeCancelled<Vec<String>>;
}

/// A backend that answers with two fixed routes after a random delay.
#[derive(Debug)]
pub struct MockBackend {
    latency: LatencyRange,
    rng: Mutex<StdRng>,
}

impl MockBackend {
    /// Create a backend drawing its latencies from `rng`.
    pub fn new(latency: LatencyRange, rng: StdRng) -> Self {
        Self {
            latency,
            rng: Mutex::new(rng),
        }
    }

    /// Create a backend whose latency draws are reproducible.
    pub fn with_seed(latency: LatencyRange, seed: u64) -> Self {
        Self::new(latency, StdRng::seed_from_u64(seed))
    }

    /// Create a backend seeded from OS entropy.
    pub fn from_entropy(latency: LatencyRange) -> Self {
        Self::new(latency, StdRng::from_entropy())
    }

    /// The range latencies are drawn from.
    pub fn latency(&self) -> LatencyRange {
        self.latency
    }

    fn next_latency(&self) -> Duration {
        self.latency.sample(&mut *self.rng.lock().unwrap())
    }
}

impl Backend for MockBackend {
    fn find_routes(
        &self,
        query: &RouteQuery,
        ct: &CancellationToken,
    ) -> MayBeCancelled<Vec<String>> {
        let latency = self.next_latency();
        debug!(origin = %query.origin, destination = %query.destination, ?latency, "searching routes");
        ct.sleep(latency)?;
        let RouteQuery {
            origin,
            destination,
        } = query;
        Ok(vec![
            format!("{origin}-{destination}-british airways-11am"),
            format!("{origin}-{destination}-delta airlines-12am"),
        ])
    }
}
