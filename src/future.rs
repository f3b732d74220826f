//! A single-assignment future which forwards cancellation to an inner future.
//!
//! [`CancellableFuture`] is the currency of every transport operation. It is
//! settled at most once, into one of three terminal outcomes: completed,
//! failed or cancelled. Interested parties register callbacks for each
//! outcome, and callbacks registered after the future is settled fire
//! immediately on the registering thread, so no notification is ever missed.
//!
//! A future may also be bound to an *inner* operation (anything implementing
//! [`Cancel`]). Cancelling the outer future forwards the cancellation to the
//! inner operation. The binding can be replaced while the future is pending,
//! and replacing it is race-free against a concurrent [`cancel`]: a newly
//! bound inner operation is always cancelled if the outer future ends up
//! cancelled.
//!
//! Futures can also be awaited, which yields `Ok(value)` on completion, or
//! the error on failure. Cancellation resolves to [`Error::Cancelled`].
//!
//! [`cancel`]: CancellableFuture::cancel

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

use crate::error::Error;
use crate::BoxFuture;
use crate::DebugLiteral;

/// An operation which can be asked to stop.
///
/// Cancellation is cooperative: cancelling only requests termination. The
/// return value is `true` only for the call which moved the operation into
/// the cancelled state.
pub trait Cancel: Send + Sync {
    /// Request cancellation.
    fn cancel(&self) -> bool;
}

impl<C> Cancel for Arc<C>
where
    C: Cancel + ?Sized,
{
    fn cancel(&self) -> bool {
        (**self).cancel()
    }
}

/// The state of a [`CancellableFuture`].
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// Not yet settled.
    Pending,

    /// Completed with a value.
    Completed(T),

    /// Failed with an error.
    Failed(Error),

    /// Cancelled before completing or failing.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Is the outcome still pending?
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    fn label(&self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Completed(_) => "completed",
            Outcome::Failed(_) => "failed",
            Outcome::Cancelled => "cancelled",
        }
    }
}

type OnCompletion<T> = Box<dyn FnOnce(&T) + Send + 'static>;
type OnError = Box<dyn FnOnce(&Error) + Send + 'static>;
type OnCancelled = Box<dyn FnOnce() + Send + 'static>;

struct Callbacks<T> {
    completed: Vec<OnCompletion<T>>,
    failed: Vec<OnError>,
    cancelled: Vec<OnCancelled>,
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
        }
    }
}

impl<T> Callbacks<T> {
    /// Fire the callbacks matching the outcome. The others are dropped unfired.
    fn fire(self, outcome: &Outcome<T>) {
        match outcome {
            Outcome::Completed(value) => self.completed.into_iter().for_each(|cb| cb(value)),
            Outcome::Failed(error) => self.failed.into_iter().for_each(|cb| cb(error)),
            Outcome::Cancelled => self.cancelled.into_iter().for_each(|cb| cb()),
            Outcome::Pending => {}
        }
    }
}

struct State<T> {
    outcome: Outcome<T>,
    callbacks: Callbacks<T>,
}

impl<T: Clone> State<T> {
    /// Move out of pending. Returns the callbacks to fire, or `None` if the
    /// state was already terminal.
    fn settle(&mut self, outcome: &Outcome<T>) -> Option<Callbacks<T>> {
        if !self.outcome.is_pending() {
            return None;
        }

        self.outcome = outcome.clone();
        Some(std::mem::take(&mut self.callbacks))
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,

    // Lock order: `inner` before `state`.
    inner: Mutex<Option<Box<dyn Cancel>>>,
    settled: watch::Sender<bool>,
}

/// A single-assignment, callback based future with cancellation forwarding.
///
/// Cloning the future produces another handle to the same underlying state.
pub struct CancellableFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CancellableFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for CancellableFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableFuture")
            .field(
                "outcome",
                &DebugLiteral(self.shared.state.lock().outcome.label()),
            )
            .finish()
    }
}

impl<T> Default for CancellableFuture<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CancellableFuture<T>
where
    T: Clone + Send + 'static,
{
    /// Create a new pending future.
    pub fn new() -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    outcome: Outcome::Pending,
                    callbacks: Callbacks::default(),
                }),
                inner: Mutex::new(None),
                settled,
            }),
        }
    }

    /// Create a new pending future, bound to an inner operation.
    pub fn with_inner<C>(inner: C) -> Self
    where
        C: Cancel + 'static,
    {
        let future = Self::new();
        *future.shared.inner.lock() = Some(Box::new(inner));
        future
    }

    /// Create a future which has already completed.
    pub fn completed(value: T) -> Self {
        let future = Self::new();
        future.complete(value);
        future
    }

    /// Create a future which has already failed.
    pub fn failed(error: Error) -> Self {
        let future = Self::new();
        future.fail(error);
        future
    }

    /// Replace the bound inner operation.
    ///
    /// The previous binding is released without being cancelled. If this future
    /// has already been cancelled, `inner` is cancelled immediately instead of
    /// being bound.
    pub fn attach_inner<C>(&self, inner: C)
    where
        C: Cancel + 'static,
    {
        let mut binding = self.shared.inner.lock();
        if matches!(self.shared.state.lock().outcome, Outcome::Cancelled) {
            *binding = None;
            drop(binding);
            trace!("attached inner to a cancelled future");
            inner.cancel();
            return;
        }

        *binding = Some(Box::new(inner));
    }

    /// Cancel this future.
    ///
    /// Returns `true` only for the call which moves the future from pending to
    /// cancelled. Any bound inner operation is cancelled and released, even when
    /// the future had already completed or failed.
    pub fn cancel(&self) -> bool {
        let outcome = Outcome::Cancelled;
        let (callbacks, inner) = {
            let mut binding = self.shared.inner.lock();
            let callbacks = self.shared.state.lock().settle(&outcome);
            (callbacks, binding.take())
        };

        let cancelled = match callbacks {
            Some(callbacks) => {
                self.shared.settled.send_replace(true);
                callbacks.fire(&outcome);
                true
            }
            None => false,
        };

        if let Some(inner) = inner {
            trace!("forwarding cancellation to inner future");
            inner.cancel();
        }

        cancelled
    }

    /// Complete this future with a value.
    ///
    /// Returns `false`, changing nothing, if the future was already settled.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Outcome::Completed(value))
    }

    /// Fail this future with an error.
    ///
    /// Returns `false`, changing nothing, if the future was already settled.
    pub fn fail(&self, error: Error) -> bool {
        self.settle(Outcome::Failed(error))
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        let Some(callbacks) = self.shared.state.lock().settle(&outcome) else {
            return false;
        };

        self.shared.settled.send_replace(true);
        callbacks.fire(&outcome);
        true
    }

    /// Register a callback to run when this future completes.
    ///
    /// Runs immediately if the future has already completed. Never runs if the
    /// future failed or was cancelled.
    pub fn on_completion<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.outcome.is_pending() {
            state.callbacks.completed.push(Box::new(callback));
            return self;
        }

        let Outcome::Completed(value) = state.outcome.clone() else {
            return self;
        };
        drop(state);

        callback(&value);
        self
    }

    /// Register a callback to run when this future fails.
    ///
    /// Runs immediately if the future has already failed.
    pub fn on_error<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&Error) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.outcome.is_pending() {
            state.callbacks.failed.push(Box::new(callback));
            return self;
        }

        let Outcome::Failed(error) = state.outcome.clone() else {
            return self;
        };
        drop(state);

        callback(&error);
        self
    }

    /// Register a callback to run when this future is cancelled.
    ///
    /// Runs immediately if the future has already been cancelled.
    pub fn on_cancelled<F>(&self, callback: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.outcome.is_pending() {
            state.callbacks.cancelled.push(Box::new(callback));
            return self;
        }

        let cancelled = matches!(state.outcome, Outcome::Cancelled);
        drop(state);

        if cancelled {
            callback();
        }
        self
    }

    /// A snapshot of the current outcome.
    pub fn outcome(&self) -> Outcome<T> {
        self.shared.state.lock().outcome.clone()
    }

    /// Has this future been settled?
    pub fn is_done(&self) -> bool {
        !self.shared.state.lock().outcome.is_pending()
    }

    /// Has this future been cancelled?
    pub fn is_cancelled(&self) -> bool {
        matches!(self.shared.state.lock().outcome, Outcome::Cancelled)
    }

    /// Has this future completed with a value?
    pub fn is_completed(&self) -> bool {
        matches!(self.shared.state.lock().outcome, Outcome::Completed(_))
    }

    /// Has this future failed?
    pub fn is_failed(&self) -> bool {
        matches!(self.shared.state.lock().outcome, Outcome::Failed(_))
    }

    /// Is an inner operation currently bound?
    pub fn has_inner(&self) -> bool {
        self.shared.inner.lock().is_some()
    }
}

impl<T> Cancel for CancellableFuture<T>
where
    T: Clone + Send + 'static,
{
    fn cancel(&self) -> bool {
        CancellableFuture::cancel(self)
    }
}

impl<T> IntoFuture for CancellableFuture<T>
where
    T: Clone + Send + 'static,
{
    type Output = Result<T, Error>;
    type IntoFuture = Settled<T>;

    fn into_future(self) -> Self::IntoFuture {
        let mut receiver = self.shared.settled.subscribe();
        Settled(Box::pin(async move {
            // The sender lives in `self`, so this only returns once settled.
            let _ = receiver.wait_for(|settled| *settled).await;
            match self.outcome() {
                Outcome::Completed(value) => Ok(value),
                Outcome::Failed(error) => Err(error),
                Outcome::Cancelled | Outcome::Pending => Err(Error::Cancelled),
            }
        }))
    }
}

/// Future returned by awaiting a [`CancellableFuture`].
#[pin_project::pin_project]
pub struct Settled<T>(#[pin] BoxFuture<'static, Result<T, Error>>);

impl<T> fmt::Debug for Settled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Settled").finish()
    }
}

impl<T> Future for Settled<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().0.poll(cx)
    }
}
