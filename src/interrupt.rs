//! Process-wide interrupt listener.
//!
//! SIGINT and SIGTERM are turned into a cancellation of a single token source.
//! Triggers are attached with [`InterruptListener::listen()`] and detached by
//! dropping the returned registration. A second signal exits the process with
//! [`REPEATED_INTERRUPT_EXIT_CODE`].

use std::{
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock,
    },
};

use tracing::warn;

use crate::{
    CancelCallback, CancellationToken, CancellationTokenRegistration, CancellationTokenSource,
    Result,
};

static LISTENER: OnceLock<InterruptListener> = OnceLock::new();
static INSTALL: Mutex<()> = Mutex::new(());

/// Exit code used when a signal arrives after the first one (128 + SIGINT).
pub const REPEATED_INTERRUPT_EXIT_CODE: i32 = 130;

/// Delivers interrupt notifications to registered triggers.
#[derive(Debug, Default)]
pub struct InterruptListener {
    source: CancellationTokenSource,
    received: Arc<AtomicBool>,
}

impl InterruptListener {
    /// Create a listener that is not connected to OS signals.
    ///
    /// Interrupts are delivered only through [`notify()`](Self::notify).
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the process-wide listener for SIGINT and SIGTERM.
    ///
    /// The OS handler is registered on the first call; later calls return the same listener.
    pub fn install() -> Result<&'static InterruptListener> {
        if let Some(listener) = LISTENER.get() {
            return Ok(listener);
        }
        let _install = INSTALL.lock().unwrap();
        if let Some(listener) = LISTENER.get() {
            return Ok(listener);
        }
        let listener = Self::new();
        let source = listener.source.clone();
        let received = listener.received.clone();
        ctrlc::set_handler(move || {
            if deliver(&source, &received) {
                warn!("aborting due to interrupt");
            } else {
                warn!("interrupted again, exiting");
                process::exit(REPEATED_INTERRUPT_EXIT_CODE);
            }
        })?;
        Ok(LISTENER.get_or_init(|| listener))
    }

    /// Register `trigger` to be called once, on the first interrupt.
    ///
    /// If an interrupt has already been received, `trigger` is called before this method returns.
    /// Dropping the returned registration unregisters the trigger.
    pub fn listen(
        &self,
        trigger: impl FnOnce() + Sync + Send + 'static,
    ) -> CancellationTokenRegistration {
        self.source.token().register(CancelCallback::from_fn(trigger))
    }

    /// Deliver an interrupt as if it had been received from the OS.
    ///
    /// Returns true for the first interrupt. Unlike an OS signal, a repeated
    /// notification does not exit the process.
    pub fn notify(&self) -> bool {
        deliver(&self.source, &self.received)
    }

    /// Returns true once an interrupt has been received.
    pub fn is_interrupted(&self) -> bool {
        self.source.is_cancelled()
    }

    /// A token that is cancelled on the first interrupt.
    pub fn token(&self) -> CancellationToken {
        self.source.token()
    }
}

fn deliver(source: &CancellationTokenSource, received: &AtomicBool) -> bool {
    let first = !received.swap(true, Ordering::SeqCst);
    source.cancel();
    first
}
