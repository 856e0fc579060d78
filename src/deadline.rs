//! Deadline-bound cancellation contexts.
//!
//! A bounded context is a child [`CancellationTokenSource`] paired with a timer
//! thread that fires it with [`CancelReason::DeadlineExceeded`]. The returned
//! [`DeadlineGuard`] releases the timer; it must be kept alive for as long as
//! the context is in use.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{CancelReason, CancellationToken, CancellationTokenSource, Error, Result};

static LIVE_TIMERS: AtomicUsize = AtomicUsize::new(0);

/// Number of deadline timer threads that have not exited yet.
pub fn live_timers() -> usize {
    LIVE_TIMERS.load(Ordering::SeqCst)
}

struct LiveTimer;

impl LiveTimer {
    fn new() -> Self {
        LIVE_TIMERS.fetch_add(1, Ordering::SeqCst);
        Self
    }
}
impl Drop for LiveTimer {
    fn drop(&mut self) {
        LIVE_TIMERS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Derive a context from `parent` that is cancelled once `timeout` has elapsed.
///
/// A timeout too large to be represented as an [`Instant`] (e.g. [`Duration::MAX`])
/// means no deadline: the context then fires only with `parent` or on release.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use cancellable_search::{with_timeout, CancelReason, CancellationToken};
///
/// # fn main() -> cancellable_search::Result<()> {
/// let (cts, guard) = with_timeout(&CancellationToken::default(), Duration::from_millis(10))?;
/// let ct = cts.token();
/// assert_eq!(ct.sleep(Duration::from_secs(5)), Err(CancelReason::DeadlineExceeded));
/// guard.release();
/// # Ok(())
/// # }
/// ```
pub fn with_timeout(
    parent: &CancellationToken,
    timeout: Duration,
) -> Result<(CancellationTokenSource, DeadlineGuard)> {
    bounded(parent, Instant::now().checked_add(timeout))
}

/// Derive a context from `parent` that is cancelled at `deadline`.
///
/// The context is also cancelled when `parent` is, with the parent's reason.
pub fn with_deadline(
    parent: &CancellationToken,
    deadline: Instant,
) -> Result<(CancellationTokenSource, DeadlineGuard)> {
    bounded(parent, Some(deadline))
}

// `None` is a deadline beyond what `Instant` can represent: the context is only
// linked to `parent` and no timer is started.
fn bounded(
    parent: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<(CancellationTokenSource, DeadlineGuard)> {
    let source = CancellationTokenSource::with_parent(parent);
    let Some(deadline) = deadline else {
        let guard = DeadlineGuard {
            source: source.clone(),
            deadline: None,
            timer: None,
        };
        return Ok((source, guard));
    };
    let live = LiveTimer::new();
    let timer = {
        let source = source.clone();
        thread::Builder::new()
            .name("deadline".into())
            .spawn(move || {
                let _live = live;
                let token = source.token();
                if token
                    .sleep(deadline.saturating_duration_since(Instant::now()))
                    .is_ok()
                {
                    debug!("deadline elapsed");
                    source.cancel_with(CancelReason::DeadlineExceeded);
                }
            })
            .map_err(|source| Error::Spawn {
                name: "deadline",
                source,
            })?
    };
    let guard = DeadlineGuard {
        source: source.clone(),
        deadline: Some(deadline),
        timer: Some(timer),
    };
    Ok((source, guard))
}

/// Releases a bounded context.
///
/// Dropping the guard (or calling [`release()`](DeadlineGuard::release)) cancels the
/// context with [`CancelReason::Cancelled`] unless it has already fired, and waits
/// for the timer thread to exit.
#[must_use = "dropping the guard cancels the context immediately"]
pub struct DeadlineGuard {
    source: CancellationTokenSource,
    deadline: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

impl DeadlineGuard {
    /// The instant at which the context fires on its own, `None` if it never does.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed and [`Duration::MAX`] without one.
    pub fn remaining(&self) -> Duration {
        self.deadline.map_or(Duration::MAX, |deadline| {
            deadline.saturating_duration_since(Instant::now())
        })
    }

    /// Cancel the context and stop its timer.
    pub fn release(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.source.cancel();
        if let Some(timer) = self.timer.take() {
            let _ = timer.join();
        }
    }
}
impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.stop();
    }
}
impl std::fmt::Debug for DeadlineGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineGuard")
            .field("deadline", &self.deadline)
            .field("reason", &self.source.reason())
            .finish()
    }
}
