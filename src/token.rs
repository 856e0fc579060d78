use std::{
    fmt,
    future::{pending, Future},
    pin::{pin, Pin},
    sync::{Arc, Mutex, OnceLock, Weak},
    task::{Context, Poll, Waker},
    thread,
    time::{Duration, Instant},
};

use slabmap::SlabMap;
use thiserror::Error;

/// The cause recorded by a token when it fires.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Error)]
pub enum CancelReason {
    /// The deadline of a bounded context elapsed first.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// Cancellation was requested explicitly, e.g. by an interrupt signal.
    #[error("operation cancelled")]
    Cancelled,
}

/// Return value of the method that may be cancelled.
pub type MayBeCancelled<T = ()> = Result<T, CancelReason>;

struct RawTokenSource {
    data: Mutex<Option<Data>>,
    reason: OnceLock<CancelReason>,
}

impl RawTokenSource {
    fn new(parent: CancellationTokenRegistration) -> Self {
        Self {
            data: Mutex::new(Some(Data::new(parent))),
            reason: OnceLock::new(),
        }
    }
    fn new_fired(reason: CancelReason) -> Self {
        Self {
            data: Mutex::new(None),
            reason: OnceLock::from(reason),
        }
    }
    fn is_cancelled(&self) -> bool {
        self.data.lock().unwrap().is_none()
    }

    // Set under the data lock before the callbacks are taken, so it is always
    // visible once `is_cancelled` holds.
    fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }
    fn fired_reason(&self) -> CancelReason {
        self.reason().unwrap_or(CancelReason::Cancelled)
    }

    fn fire(&self, reason: CancelReason) {
        let data = {
            let mut state = self.data.lock().unwrap();
            let Some(data) = state.take() else {
                return;
            };
            let _ = self.reason.set(reason);
            data
        };
        data.cbs.into_iter().for_each(|(_, cb)| cb.call(reason));
    }
}
impl OnCancelled for RawTokenSource {
    fn on_cancelled(&self, reason: CancelReason) {
        self.fire(reason);
    }
}

struct Data {
    cbs: SlabMap<CancelCallback>,
    _parent: CancellationTokenRegistration, // Keeps the link to the parent alive until this source fires or is dropped.
}
impl Data {
    fn new(parent: CancellationTokenRegistration) -> Self {
        Self {
            cbs: SlabMap::new(),
            _parent: parent,
        }
    }
}

/// An object for sending cancellation notifications.
///
/// Use [`cancel()`](CancellationTokenSource::cancel) or
/// [`cancel_with()`](CancellationTokenSource::cancel_with) to notify cancellation.
/// Only the first notification has an effect; its reason is the one every token observes.
pub struct CancellationTokenSource(Arc<RawTokenSource>);

impl CancellationTokenSource {
    fn new_fired(reason: CancelReason) -> Self {
        Self(Arc::new(RawTokenSource::new_fired(reason)))
    }

    /// Create a new CancellationTokenSource.
    pub fn new() -> Self {
        Self(Arc::new(RawTokenSource::new(
            CancellationTokenRegistration::empty(),
        )))
    }

    /// Create a new CancellationTokenSource with a parent token.
    ///
    /// When the parent token is cancelled, the child token is also cancelled with the same reason.
    /// Cancelling the child has no effect on the parent.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        match &parent.0 {
            RawToken::Never => Self::new(),
            RawToken::Fired(reason) => Self::new_fired(*reason),
            RawToken::Source(source) => {
                if let Some(data) = &mut *source.data.lock().unwrap() {
                    Self(Arc::new_cyclic(|child: &Weak<RawTokenSource>| {
                        RawTokenSource::new(CancellationTokenRegistration(Some(RawRegistration {
                            source: source.clone(),
                            key: data.cbs.insert(CancelCallback::Weak(child.clone())),
                        })))
                    }))
                } else {
                    Self::new_fired(source.fired_reason())
                }
            }
        }
    }

    /// Send cancellation notification with [`CancelReason::Cancelled`].
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Cancelled);
    }

    /// Send cancellation notification with the given reason.
    ///
    /// Does nothing if this source has already been cancelled.
    pub fn cancel_with(&self, reason: CancelReason) {
        self.0.fire(reason);
    }

    /// Create an object for which a cancellation notification is sent when dropped.
    pub fn cancel_defer(&self) -> CancelOnDrop {
        CancelOnDrop(Some(self.clone()))
    }

    /// Get [`CancellationToken`] to receive cancellation notification from this source.
    pub fn token(&self) -> CancellationToken {
        CancellationToken(RawToken::Source(self.0.clone()))
    }

    /// Returns true if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Returns the reason of the cancellation, or `None` if not cancelled yet.
    pub fn reason(&self) -> Option<CancelReason> {
        self.0.reason()
    }
}
impl Clone for CancellationTokenSource {
    /// Create a CancellationTokenSource that shares the destination for cancellation notifications.
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}
impl fmt::Debug for CancellationTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationTokenSource")
            .field("reason", &self.reason())
            .finish()
    }
}

#[derive(Clone)]
enum RawToken {
    Never,
    Fired(CancelReason),
    Source(Arc<RawTokenSource>),
}

/// An object for receiving cancellation notifications.
///
/// Obtained by [`CancellationTokenSource::token()`] or [`new()`](CancellationToken::new).
///
/// - Use [`is_cancelled()`](CancellationToken::is_cancelled) to see if the cancellation has been notified.
/// - Use [`cancelled()`](CancellationToken::cancelled) to implement cancellation using the `?` operator.
/// - Use [`run()`](CancellationToken::run) to apply cancellation to async functions.
/// - Use [`sleep()`](CancellationToken::sleep) to block a thread until a delay elapses or the token fires.
#[derive(Clone)]
pub struct CancellationToken(RawToken);

impl CancellationToken {
    /// Create a new CancellationToken with cancellation state.
    ///
    /// A token created with `true` reports [`CancelReason::Cancelled`].
    pub const fn new(is_cancelled: bool) -> Self {
        if is_cancelled {
            Self(RawToken::Fired(CancelReason::Cancelled))
        } else {
            Self(RawToken::Never)
        }
    }

    /// Create a token that is already cancelled with the given reason.
    pub const fn with_reason(reason: CancelReason) -> Self {
        Self(RawToken::Fired(reason))
    }

    /// Return true if this token can be cancelled.
    pub fn can_be_cancelled(&self) -> bool {
        !matches!(self.0, RawToken::Never)
    }

    /// Returns true if cancelled.
    pub fn is_cancelled(&self) -> bool {
        match &self.0 {
            RawToken::Never => false,
            RawToken::Fired(_) => true,
            RawToken::Source(source) => source.is_cancelled(),
        }
    }

    /// Returns the reason of the cancellation, or `None` if not cancelled yet.
    pub fn reason(&self) -> Option<CancelReason> {
        match &self.0 {
            RawToken::Never => None,
            RawToken::Fired(reason) => Some(*reason),
            RawToken::Source(source) => source.reason(),
        }
    }

    /// Returns `Err(reason)` if cancelled, otherwise returns `Ok(())`.
    ///
    /// # Example
    ///
    /// ```
    /// use cancellable_search::{CancellationToken, MayBeCancelled};
    ///
    /// fn cancellable_function(ct: &CancellationToken) -> MayBeCancelled<u32> {
    ///     for _ in 0..100 {
    ///         ct.cancelled()?; // Return from this function if cancelled
    ///         heavy_work();
    ///     }
    ///     Ok(100)
    /// }
    /// fn heavy_work() { }
    /// ```
    pub fn cancelled(&self) -> MayBeCancelled {
        match self.reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Register a callback to be called when this token is cancelled.
    ///
    /// If this token has already been cancelled, the callback is called before the function returns.
    ///
    /// Callbacks are called synchronously when [`CancellationTokenSource::cancel()`] is called, so care must be taken to avoid deadlocks.
    pub fn register(&self, cb: CancelCallback) -> CancellationTokenRegistration {
        // Compared to other methods, this method is more prone to deadlocks, so it has been intentionally designed to be verbose.
        let reason = match &self.0 {
            RawToken::Never => None,
            RawToken::Fired(reason) => Some(*reason),
            RawToken::Source(source) => {
                if let Some(data) = &mut *source.data.lock().unwrap() {
                    return CancellationTokenRegistration(Some(RawRegistration {
                        source: source.clone(),
                        key: data.cbs.insert(cb),
                    }));
                } else {
                    Some(source.fired_reason())
                }
            }
        };
        if let Some(reason) = reason {
            cb.call(reason);
        }
        CancellationTokenRegistration::empty()
    }

    /// Wait until cancelled and return the reason.
    pub async fn wait(&self) -> CancelReason {
        match &self.0 {
            RawToken::Never => pending().await,
            RawToken::Fired(reason) => *reason,
            RawToken::Source(source) => WaitForCancellation(WakerRegistration::new(source)).await,
        }
    }

    /// Runs the specified future. However, if this token is cancelled, it will stop the running of that future and return `Err(reason)`.
    ///
    /// If the token has already fired when the race is polled, the cancellation wins.
    ///
    /// # Example
    ///
    /// ```
    /// use cancellable_search::{CancellationToken, MayBeCancelled};
    ///
    /// async fn cancellable_function(ct: &CancellationToken) -> MayBeCancelled<u32> {
    ///     for _ in 0..100 {
    ///         ct.run(heavy_work()).await?;
    ///     }
    ///     Ok(100)
    /// }
    /// async fn heavy_work() { }
    /// ```
    pub async fn run<T>(&self, future: impl Future<Output = T>) -> MayBeCancelled<T> {
        match &self.0 {
            RawToken::Never => Ok(future.await),
            RawToken::Fired(reason) => Err(*reason),
            RawToken::Source(source) => {
                WithCancellation {
                    r: WakerRegistration::new(source),
                    future: pin!(future),
                }
                .await
            }
        }
    }

    /// Block the current thread for `duration`, returning early with `Err(reason)` if this token is cancelled.
    ///
    /// A duration too large to be represented as an [`Instant`] sleeps until the token fires.
    pub fn sleep(&self, duration: Duration) -> MayBeCancelled {
        self.cancelled()?;
        let deadline = Instant::now().checked_add(duration);
        let current = thread::current();
        let _wake = self.register(CancelCallback::from_fn(move || current.unpark()));
        loop {
            self.cancelled()?;
            let Some(deadline) = deadline else {
                thread::park();
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::park_timeout(deadline - now);
        }
    }
}
impl Default for CancellationToken {
    /// Create a CancellationToken that will never be cancelled.
    fn default() -> Self {
        Self::new(false)
    }
}
impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("can_be_cancelled", &self.can_be_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Callback called when cancelled.
pub trait OnCancelled: Sync + Send {
    /// Called when cancelled.
    ///
    /// This method are called synchronously when [`CancellationTokenSource::cancel()`] is called, so care must be taken to avoid deadlocks.
    fn on_cancelled(&self, reason: CancelReason);
}

/// Callback called when cancelled.
///
/// Used in [`CancellationToken::register()`].
#[non_exhaustive]
pub enum CancelCallback {
    FnOnce(Box<dyn FnOnce() + Sync + Send>),
    Waker(Waker),
    Box(Box<dyn OnCancelled>),
    Arc(Arc<dyn OnCancelled>),
    Weak(Weak<dyn OnCancelled>),
}
impl CancelCallback {
    /// Create a callback from a closure.
    pub fn from_fn(f: impl FnOnce() + Sync + Send + 'static) -> Self {
        Self::FnOnce(Box::new(f))
    }

    /// Create a callback that calls `f` with the shared value.
    pub fn from_arc_fn<T: Sync + Send + 'static>(
        this: Arc<T>,
        f: impl FnOnce(&T) + Sync + Send + 'static,
    ) -> Self {
        Self::from_fn(move || f(&this))
    }

    /// Create a callback that calls `f` only if the value is still alive.
    pub fn from_weak_fn<T: Sync + Send + 'static>(
        this: Weak<T>,
        f: impl FnOnce(&T) + Sync + Send + 'static,
    ) -> Self {
        Self::from_fn(move || {
            if let Some(this) = this.upgrade() {
                f(&this);
            }
        })
    }

    pub(crate) fn call(self, reason: CancelReason) {
        match self {
            Self::FnOnce(f) => f(),
            Self::Waker(w) => w.wake(),
            Self::Box(b) => b.on_cancelled(reason),
            Self::Arc(a) => a.on_cancelled(reason),
            Self::Weak(w) => {
                if let Some(w) = w.upgrade() {
                    w.on_cancelled(reason);
                }
            }
        }
    }
}

struct RawRegistration {
    source: Arc<RawTokenSource>,
    key: usize,
}

/// An object to unregister callback.
///
/// Callbacks are automatically unregistered when dropped.
#[derive(Default)]
pub struct CancellationTokenRegistration(Option<RawRegistration>);

impl CancellationTokenRegistration {
    fn empty() -> Self {
        Self(None)
    }

    /// Returns true if the callback is still waiting for a cancellation.
    pub fn is_registered(&self) -> bool {
        self.0
            .as_ref()
            .is_some_and(|raw| !raw.source.is_cancelled())
    }

    /// Ensure the callback is never unregistered.
    pub fn detach(mut self) {
        self.0.take();
    }
}
impl fmt::Debug for CancellationTokenRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationTokenRegistration")
            .field("is_registered", &self.is_registered())
            .finish()
    }
}
impl Drop for CancellationTokenRegistration {
    fn drop(&mut self) {
        if let Some(raw) = self.0.take() {
            if let Some(data) = &mut *raw.source.data.lock().unwrap() {
                data.cbs.remove(raw.key);
            }
        }
    }
}

struct WakerRegistration<'a> {
    source: &'a RawTokenSource,
    key: Option<usize>,
}
impl<'a> WakerRegistration<'a> {
    pub fn new(source: &'a RawTokenSource) -> Self {
        Self { source, key: None }
    }
    pub fn reason(&self) -> Option<CancelReason> {
        self.source.reason()
    }
    pub fn set(&mut self, waker: &Waker) -> bool {
        if let Some(data) = &mut *self.source.data.lock().unwrap() {
            let cb = CancelCallback::Waker(waker.clone());
            if let Some(key) = self.key {
                data.cbs[key] = cb;
            } else {
                self.key = Some(data.cbs.insert(cb));
            }
            true
        } else {
            false
        }
    }
}

impl Drop for WakerRegistration<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Some(data) = &mut *self.source.data.lock().unwrap() {
                data.cbs.remove(key);
            }
        }
    }
}

struct WaitForCancellation<'a>(WakerRegistration<'a>);

impl Future for WaitForCancellation<'_> {
    type Output = CancelReason;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.0.set(cx.waker()) {
            Poll::Pending
        } else {
            Poll::Ready(this.0.source.fired_reason())
        }
    }
}

struct WithCancellation<'a, Fut> {
    r: WakerRegistration<'a>,
    future: Pin<&'a mut Fut>,
}
impl<Fut: Future> Future for WithCancellation<'_, Fut> {
    type Output = MayBeCancelled<Fut::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(reason) = self.r.reason() {
            return Poll::Ready(Err(reason));
        }
        match Pin::new(&mut self.future).poll(cx) {
            Poll::Pending => {
                if self.r.set(cx.waker()) {
                    Poll::Pending
                } else {
                    Poll::Ready(Err(self.r.source.fired_reason()))
                }
            }
            Poll::Ready(v) => Poll::Ready(Ok(v)),
        }
    }
}

/// An object for which a cancellation notification is sent when dropped.
///
/// Returned by [`CancellationTokenSource::cancel_defer()`].
pub struct CancelOnDrop(Option<CancellationTokenSource>);

impl CancelOnDrop {
    /// Drop the object without sending a cancellation notification.
    pub fn detach(mut self) {
        self.0.take();
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(source) = self.0.take() {
            source.cancel();
        }
    }
}
