//! A route search raced against a deadline and an interrupt signal.
//!
//! The building blocks are linked cancellation tokens ([`CancellationTokenSource`],
//! [`CancellationToken`]), deadline-bound contexts ([`with_timeout()`]), a process-wide
//! [`InterruptListener`], and [`search()`], which runs a [`Backend`] on its own thread
//! and returns as soon as either the backend answers or the context fires.

pub mod config;
mod deadline;
mod error;
mod interrupt;
mod search;
mod token;
mod work;

pub use deadline::{live_timers, with_deadline, with_timeout, DeadlineGuard};
pub use error::{Error, Result};
pub use interrupt::{InterruptListener, REPEATED_INTERRUPT_EXIT_CODE};
pub use search::search;
pub use token::{
    CancelCallback, CancelOnDrop, CancelReason, CancellationToken, CancellationTokenRegistration,
    CancellationTokenSource, MayBeCancelled, OnCancelled,
};
pub use work::{Backend, LatencyRange, MockBackend, RouteQuery};

#[cfg(doctest)]
pub mod doctests {
    #[doc = include_str!("../README.md")]
    pub mod readme {}
}

#[cfg(test)]
mod tests;
