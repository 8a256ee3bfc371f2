//! Producer and consumer handles over a shared state.
//!
//! [`Promise`] is the producer side: it satisfies the state exactly once and
//! poisons it with a broken-promise error if dropped unsatisfied. [`Future`]
//! is the consumer side: it waits, extracts, chains with [`Future::then`],
//! and forwards into addressed continuations with [`Future::forward_to`].
//!
//! Both are thin wrappers; all synchronization lives in
//! [`SharedState`](crate::state::SharedState).

use crate::continuation::Continuation;
use crate::error::{Error, Result};
use crate::routing::Router;
use crate::state::SharedState;
use crate::types::FutureStatus;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// The producer side of a future/promise pair.
///
/// Dropping an unsatisfied promise stores a `BrokenPromise` error so waiting
/// consumers unblock instead of hanging forever.
pub struct Promise<T: Send + 'static> {
    state: SharedState<T>,
}

impl<T: Send + 'static> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Promise").field(&self.state).finish()
    }
}

impl<T: Send + 'static> Promise<T> {
    pub(crate) fn from_state(state: SharedState<T>) -> Self {
        Self { state }
    }

    /// Satisfies the shared state with `value`.
    pub fn set_value(&self, value: T) -> Result<()> {
        self.state.set_value(value)
    }

    /// Satisfies the shared state with `error`.
    pub fn set_exception(&self, error: Error) -> Result<()> {
        self.state.set_exception(error)
    }

    /// Returns a consumer handle onto the same shared state.
    ///
    /// May be called any number of times; all returned futures observe the
    /// same state.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        Future {
            state: self.state.clone(),
        }
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.state.is_ready() {
            // An error here means a racing producer won; either way the
            // state is satisfied and consumers unblock.
            let _ = self.state.set_exception(Error::broken_promise());
        }
    }
}

/// The consumer side of a future/promise pair.
pub struct Future<T> {
    state: SharedState<T>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Future").field(&self.state).finish()
    }
}

impl<T: Send + 'static> Future<T> {
    pub(crate) fn from_state(state: SharedState<T>) -> Self {
        Self { state }
    }

    pub(crate) fn state(&self) -> &SharedState<T> {
        &self.state
    }

    /// Blocks until ready and moves the value out.
    ///
    /// Consumes the handle; a stored error is cloned out and other handles
    /// can still observe it.
    pub fn get(self) -> Result<T> {
        self.state.get()
    }

    /// Blocks until ready and clones the value, leaving it in place.
    pub fn get_cloned(&self) -> Result<T>
    where
        T: Clone,
    {
        self.state.get_cloned()
    }

    /// Blocks until the state is ready.
    pub fn wait(&self) -> Result<()> {
        self.state.wait()
    }

    /// Blocks until ready or `deadline`, reporting how the wait ended.
    pub fn wait_until(&self, deadline: Instant) -> FutureStatus {
        self.state.wait_until(deadline)
    }

    /// Point-in-time readiness check.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// True if the state holds a value.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.state.has_value()
    }

    /// True if the state holds an error.
    #[must_use]
    pub fn has_exception(&self) -> bool {
        self.state.has_exception()
    }

    /// Explicitly runs a deferred task on this thread; see
    /// [`SharedState::run`].
    pub fn run(&self) -> Result<()> {
        self.state.run()
    }

    /// Runs a deferred task if it has not started yet; idempotent.
    pub fn execute_deferred(&self) {
        self.state.execute_deferred();
    }

    /// Requests cancellation of the underlying task; see
    /// [`SharedState::cancel`].
    pub fn cancel(&self) -> Result<()> {
        self.state.cancel()
    }

    /// Attaches a transformation that runs when this future becomes ready
    /// and returns the future of its result.
    ///
    /// `f` receives the full outcome, value or error, so it can recover from
    /// upstream failures. A panic inside `f` fails the returned future. A
    /// deferred upstream is started by this call.
    pub fn then<R, F>(self, f: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(Result<T>) -> Result<R> + Send + 'static,
    {
        let next = SharedState::<R>::new(self.state.scheduler().clone(), self.state.config().clone());
        let downstream = next.clone();
        let source = self.state.clone();
        self.state.set_on_completed(Box::new(move |chain| {
            let input = source.take_ready();
            let outcome = catch_unwind(AssertUnwindSafe(|| f(input)))
                .unwrap_or_else(|_| Err(Error::internal("continuation body panicked")));
            let stored = match outcome {
                Ok(value) => downstream.set_value_at(chain, value),
                Err(error) => downstream.set_exception_at(chain, error),
            };
            if let Err(e) = stored {
                tracing::warn!(error = %e, "downstream state already satisfied");
            }
        }));
        self.state.execute_deferred();
        Future { state: next }
    }

    /// Forwards this future's outcome into an addressed continuation once it
    /// becomes ready.
    ///
    /// Values go through the continuation's local handling; errors are routed
    /// straight to the destination. A deferred upstream is started by this
    /// call. Delivery failures are logged, not raised, since by then there is
    /// no caller left to observe them.
    pub fn forward_to(self, continuation: Continuation<T>, router: Arc<dyn Router<T>>) {
        let source = self.state.clone();
        let mut continuation = continuation;
        self.state.set_on_completed(Box::new(move |chain| {
            let delivered = match source.take_ready() {
                Ok(value) => continuation.trigger(chain, value, router.as_ref()),
                Err(error) => continuation.trigger_error(chain, error, router.as_ref()),
            };
            if let Err(e) = delivered {
                tracing::warn!(error = %e, "continuation delivery failed");
            }
        }));
        self.state.execute_deferred();
    }
}
