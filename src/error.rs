use std::io;

use thiserror::Error;

use crate::CancelReason;

/// Errors returned by the search and its controller.
#[derive(Debug, Error)]
pub enum Error {
    /// The context fired before the search produced a result.
    #[error(transparent)]
    Cancelled(#[from] CancelReason),

    /// The worker thread exited without delivering a result.
    #[error("search worker exited without producing a result")]
    WorkerLost,

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl Error {
    /// Returns the cancellation reason if this error is a cancellation.
    pub fn reason(&self) -> Option<CancelReason> {
        match self {
            Self::Cancelled(reason) => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
