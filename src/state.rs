//! The shared future/promise state machine.
//!
//! [`SharedState`] is the reference-counted box behind every future and
//! promise handle: a slot that is empty until exactly one `set_value` or
//! `set_exception`, a condition-variable wait queue for blocked observers,
//! and an optional completion callback invoked once the state becomes ready.
//!
//! Instead of a specialization hierarchy, one struct carries optional
//! capabilities chosen at construction:
//!
//! - [`SharedState::new`]: a plain state, satisfied externally by a producer
//! - [`SharedState::deferred`]: carries a task that runs on first observation
//! - [`SharedState::cancellable`]: a deferred task whose running execution
//!   unit can be cooperatively interrupted
//!
//! # Locking
//!
//! The internal mutex guards only the state transition and callback swap.
//! User callbacks and task bodies always run with the lock released; waking
//! waiters happens under the lock so the payload write happens-before any
//! waiter observes the ready state.

use crate::config::CoreConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::scheduler::SchedulerHandle;
use crate::types::{Chain, FutureStatus, UnitId};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Callback invoked exactly once when a state becomes ready.
///
/// The [`Chain`] argument carries the synchronous dispatch depth; callbacks
/// that complete further states must pass it along so deep chains get
/// re-dispatched through the scheduler instead of growing the stack.
pub type CompletedCallback = Box<dyn FnOnce(Chain) + Send + 'static>;

/// A deferred task body: produces the state's value or fails with an error.
pub type TaskFn<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

/// Which optional capabilities this state was constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capability {
    Plain,
    Deferred,
    Cancellable,
}

/// Payload slot. `Empty` is the only not-ready state; `Taken` marks a value
/// that was moved out and yields `NoState` on re-observation.
enum Slot<T> {
    Empty,
    Value(T),
    Failed(Error),
    Taken,
}

impl<T> Slot<T> {
    fn is_ready(&self) -> bool {
        !matches!(self, Self::Empty)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Value(_) => "value",
            Self::Failed(_) => "error",
            Self::Taken => "taken",
        }
    }
}

struct Inner<T> {
    slot: Slot<T>,
    on_completed: Option<CompletedCallback>,
    /// Observers currently parked in the condvar; `reset` refuses to run
    /// while this is non-zero.
    waiters: usize,
    task: Option<TaskFn<T>>,
    started: bool,
    running_unit: Option<UnitId>,
}

struct StateCell<T> {
    inner: Mutex<Inner<T>>,
    readers: Condvar,
    scheduler: SchedulerHandle,
    config: CoreConfig,
    capability: Capability,
}

/// Clears `running_unit` on every exit path of the task body, including
/// panics.
struct RunningUnitGuard<'a, T> {
    cell: &'a StateCell<T>,
}

impl<T> Drop for RunningUnitGuard<'_, T> {
    fn drop(&mut self) {
        self.cell.inner.lock().running_unit = None;
    }
}

/// Cheaply cloneable handle to a shared future/promise state.
pub struct SharedState<T> {
    cell: Arc<StateCell<T>>,
}

impl<T> Clone for SharedState<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Send + 'static> SharedState<T> {
    fn with_capability(
        scheduler: SchedulerHandle,
        config: CoreConfig,
        capability: Capability,
        task: Option<TaskFn<T>>,
    ) -> Self {
        Self {
            cell: Arc::new(StateCell {
                inner: Mutex::new(Inner {
                    slot: Slot::Empty,
                    on_completed: None,
                    waiters: 0,
                    task,
                    started: false,
                    running_unit: None,
                }),
                readers: Condvar::new(),
                scheduler,
                config,
                capability,
            }),
        }
    }

    /// Creates an empty state satisfied externally through `set_value` /
    /// `set_exception`.
    #[must_use]
    pub fn new(scheduler: SchedulerHandle, config: CoreConfig) -> Self {
        Self::with_capability(scheduler, config, Capability::Plain, None)
    }

    /// Creates a deferred state whose `task` runs on first observation.
    #[must_use]
    pub fn deferred(
        scheduler: SchedulerHandle,
        config: CoreConfig,
        task: impl FnOnce() -> Result<T> + Send + 'static,
    ) -> Self {
        Self::with_capability(scheduler, config, Capability::Deferred, Some(Box::new(task)))
    }

    /// Creates a deferred state that additionally supports cooperative
    /// cancellation of the running task.
    #[must_use]
    pub fn cancellable(
        scheduler: SchedulerHandle,
        config: CoreConfig,
        task: impl FnOnce() -> Result<T> + Send + 'static,
    ) -> Self {
        Self::with_capability(
            scheduler,
            config,
            Capability::Cancellable,
            Some(Box::new(task)),
        )
    }

    /// The scheduler this state dispatches re-spawned continuations through.
    #[must_use]
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.cell.scheduler
    }

    /// The configuration this state was built with.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.cell.config
    }

    // ------------------------------------------------------------------
    // Transition
    // ------------------------------------------------------------------

    /// Stores `value` and makes the state ready.
    ///
    /// Fails with `PromiseAlreadySatisfied` if the state is already ready;
    /// the first result is left untouched.
    pub fn set_value(&self, value: T) -> Result<()> {
        self.set_value_at(Chain::root(), value)
    }

    /// [`set_value`](Self::set_value) with an explicit chain-depth token, for
    /// callers already running inside a continuation dispatch.
    pub fn set_value_at(&self, chain: Chain, value: T) -> Result<()> {
        self.complete_at(chain, Ok(value))
    }

    /// Stores `error` and makes the state ready.
    pub fn set_exception(&self, error: Error) -> Result<()> {
        self.set_exception_at(Chain::root(), error)
    }

    /// [`set_exception`](Self::set_exception) with an explicit chain-depth
    /// token.
    pub fn set_exception_at(&self, chain: Chain, error: Error) -> Result<()> {
        self.complete_at(chain, Err(error))
    }

    fn complete_at(&self, chain: Chain, outcome: Result<T>) -> Result<()> {
        let callback = {
            let mut inner = self.cell.inner.lock();
            if inner.slot.is_ready() {
                return Err(Error::new(ErrorKind::PromiseAlreadySatisfied)
                    .with_message("data has already been set for this future"));
            }
            inner.slot = match outcome {
                Ok(value) => Slot::Value(value),
                Err(error) => Slot::Failed(error),
            };
            let callback = inner.on_completed.take();
            // Waiters are woken under the lock: the slot write above
            // happens-before any of them observes the ready state.
            self.cell.readers.notify_all();
            callback
        };
        if let Some(callback) = callback {
            self.dispatch_completed(chain, callback);
        }
        Ok(())
    }

    /// Invokes `callback`, re-dispatching through the scheduler once the
    /// chain is deeper than the configured limit.
    fn dispatch_completed(&self, chain: Chain, callback: CompletedCallback) {
        if chain.depth() < self.cell.config.max_chain_depth {
            callback(chain.deeper());
            return;
        }

        tracing::trace!(depth = chain.depth(), "re-dispatching continuation chain");
        let parked = Arc::new(Mutex::new(Some(callback)));
        let for_unit = Arc::clone(&parked);
        let spawned = self.cell.scheduler.spawn(Box::new(move || {
            if let Some(callback) = for_unit.lock().take() {
                callback(Chain::root());
            }
        }));
        if let Err(e) = spawned {
            // The unit never ran, so the callback is still parked; invoking
            // it inline never drops a continuation. Keep the current depth so
            // every further link past the bound also lands here and is
            // logged, instead of silently restarting the accounting.
            tracing::warn!(error = %e, depth = chain.depth(), "continuation re-dispatch failed, invoking inline");
            if let Some(callback) = parked.lock().take() {
                callback(chain.deeper());
            }
        }
    }

    // ------------------------------------------------------------------
    // Continuation support
    // ------------------------------------------------------------------

    /// Registers `callback` to run when the state becomes ready.
    ///
    /// If the state is already ready the callback is invoked before this call
    /// returns (through the recursion-guarded dispatch path). Otherwise it is
    /// composed with any previously registered callback; each registered
    /// callback runs exactly once, in unspecified relative order.
    pub fn set_on_completed(&self, callback: CompletedCallback) {
        let mut inner = self.cell.inner.lock();
        if inner.slot.is_ready() {
            debug_assert!(inner.on_completed.is_none());
            drop(inner);
            self.dispatch_completed(Chain::root(), callback);
            return;
        }
        let composed: CompletedCallback = match inner.on_completed.take() {
            None => callback,
            Some(previous) => Box::new(move |chain: Chain| {
                previous(chain);
                callback(chain);
            }),
        };
        inner.on_completed = Some(composed);
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Blocks the calling thread until the state is ready.
    ///
    /// First observation of a deferred state runs its task synchronously on
    /// this thread before waiting.
    pub fn wait(&self) -> Result<()> {
        self.start_if_deferred();
        let mut inner = self.cell.inner.lock();
        while !inner.slot.is_ready() {
            inner.waiters += 1;
            self.cell.readers.wait(&mut inner);
            inner.waiters -= 1;
        }
        Ok(())
    }

    /// Blocks until the state is ready or `deadline` passes.
    ///
    /// Probing a not-yet-started deferred state returns
    /// [`FutureStatus::Deferred`] immediately without starting it. A timeout
    /// stops only this wait; the producer is unaffected.
    pub fn wait_until(&self, deadline: Instant) -> FutureStatus {
        let mut inner = self.cell.inner.lock();
        if !inner.slot.is_ready()
            && !inner.started
            && !matches!(self.cell.capability, Capability::Plain)
        {
            return FutureStatus::Deferred;
        }
        while !inner.slot.is_ready() {
            inner.waiters += 1;
            let outcome = self.cell.readers.wait_until(&mut inner, deadline);
            inner.waiters -= 1;
            if outcome.timed_out() && !inner.slot.is_ready() {
                return FutureStatus::Timeout;
            }
        }
        FutureStatus::Ready
    }

    /// Waits for readiness and moves the stored value out.
    ///
    /// A stored error is cloned and returned on every observation; a value is
    /// handed out once, after which the slot reads as `NoState`.
    pub fn get(&self) -> Result<T> {
        self.wait()?;
        self.take_ready()
    }

    /// Waits for readiness and clones the stored value, leaving it in place
    /// for other observers.
    pub fn get_cloned(&self) -> Result<T>
    where
        T: Clone,
    {
        self.wait()?;
        let inner = self.cell.inner.lock();
        match &inner.slot {
            Slot::Value(value) => Ok(value.clone()),
            Slot::Failed(error) => Err(error.clone()),
            Slot::Empty | Slot::Taken => Err(Self::no_state()),
        }
    }

    /// Moves a ready payload out without waiting. Callers must have
    /// established readiness (e.g. from inside a completion callback).
    pub(crate) fn take_ready(&self) -> Result<T> {
        let mut inner = self.cell.inner.lock();
        if matches!(inner.slot, Slot::Value(_)) {
            if let Slot::Value(value) = mem::replace(&mut inner.slot, Slot::Taken) {
                return Ok(value);
            }
        }
        match &inner.slot {
            Slot::Failed(error) => Err(error.clone()),
            _ => Err(Self::no_state()),
        }
    }

    fn no_state() -> Error {
        Error::new(ErrorKind::NoState).with_message("this future has no valid shared state")
    }

    /// Point-in-time readiness check.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cell.inner.lock().slot.is_ready()
    }

    /// True if the state holds a value.
    #[must_use]
    pub fn has_value(&self) -> bool {
        matches!(self.cell.inner.lock().slot, Slot::Value(_))
    }

    /// True if the state holds an error.
    #[must_use]
    pub fn has_exception(&self) -> bool {
        matches!(self.cell.inner.lock().slot, Slot::Failed(_))
    }

    // ------------------------------------------------------------------
    // Deferred execution
    // ------------------------------------------------------------------

    /// Runs the deferred task now if it has not started; otherwise does
    /// nothing. No-op on plain states.
    pub fn execute_deferred(&self) {
        self.start_if_deferred();
    }

    /// Explicitly runs the deferred task synchronously on this thread.
    ///
    /// Unlike the idempotent [`execute_deferred`](Self::execute_deferred),
    /// fails with `TaskAlreadyStarted` if the task was started before.
    pub fn run(&self) -> Result<()> {
        if matches!(self.cell.capability, Capability::Plain) {
            return Err(Error::new(ErrorKind::OperationNotSupported)
                .with_message("this state has no deferred task to run"));
        }
        {
            let mut inner = self.cell.inner.lock();
            if inner.started {
                return Err(Error::new(ErrorKind::TaskAlreadyStarted)
                    .with_message("this task has already been started"));
            }
            inner.started = true;
        }
        self.run_task(Chain::root());
        Ok(())
    }

    fn start_if_deferred(&self) {
        if matches!(self.cell.capability, Capability::Plain) {
            return;
        }
        if self.claim_start() {
            self.run_task(Chain::root());
        }
    }

    /// Flips `started` and reports whether this caller won the right to run
    /// the task.
    fn claim_start(&self) -> bool {
        let mut inner = self.cell.inner.lock();
        if inner.started || inner.task.is_none() {
            return false;
        }
        inner.started = true;
        true
    }

    fn run_task(&self, chain: Chain) {
        let task = { self.cell.inner.lock().task.take() };
        let Some(task) = task else {
            return;
        };

        if matches!(self.cell.capability, Capability::Cancellable) {
            let unit = self.cell.scheduler.current_unit();
            self.cell.inner.lock().running_unit = unit;
        }
        let guard = RunningUnitGuard { cell: &self.cell };
        let outcome = catch_unwind(AssertUnwindSafe(task))
            .unwrap_or_else(|_| Err(Error::internal("deferred task panicked")));
        drop(guard);

        // A lost completion race means cancellation got there first; the
        // task's own result is discarded.
        if self.complete_at(chain, outcome).is_err() {
            tracing::trace!("task result dropped, state already satisfied");
        }
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Requests cancellation of the running task.
    ///
    /// Only meaningful on cancellable states, and only while the task is
    /// actually executing: a not-yet-started task reports `TaskNotRunning`,
    /// an already-ready state is a no-op success, and a running task whose
    /// execution unit refuses interruption reports `FutureCanNotBeCancelled`
    /// leaving the state untouched. On success the state completes with a
    /// `FutureCancelled` error.
    pub fn cancel(&self) -> Result<()> {
        if !matches!(self.cell.capability, Capability::Cancellable) {
            return Err(Error::new(ErrorKind::FutureDoesNotSupportCancellation)
                .with_message("this future does not support cancellation"));
        }
        let unit = {
            let inner = self.cell.inner.lock();
            if inner.slot.is_ready() {
                return Ok(());
            }
            if !inner.started {
                return Err(Error::new(ErrorKind::TaskNotRunning)
                    .with_message("cancellation requested before the task started"));
            }
            match inner.running_unit {
                Some(unit) => unit,
                None => {
                    return Err(Error::new(ErrorKind::FutureCanNotBeCancelled)
                        .with_message("task is not running on an interruptible unit"))
                }
            }
        };

        // The lock is released before signalling so an interruption that
        // synchronously unwinds back into this state cannot self-deadlock.
        if let Err(e) = self.cell.scheduler.interrupt(unit) {
            if self.is_ready() {
                return Ok(());
            }
            return Err(Error::new(ErrorKind::FutureCanNotBeCancelled)
                .with_message(format!("unit {unit} could not be interrupted"))
                .with_source(e));
        }
        tracing::debug!(%unit, "future cancelled");

        let cancelled =
            Error::new(ErrorKind::FutureCancelled).with_message("future has been cancelled");
        // Losing this race means the task completed naturally in the
        // meantime; there is nothing left to cancel.
        let _ = self.set_exception_at(Chain::root(), cancelled);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reuse
    // ------------------------------------------------------------------

    /// Returns the state to empty for reuse, dropping any stored payload and
    /// callback.
    ///
    /// Valid only with no concurrent observers; fails loudly if any thread is
    /// parked waiting on this state.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.cell.inner.lock();
        if inner.waiters > 0 {
            return Err(Error::internal("reset called with parked observers"));
        }
        inner.slot = Slot::Empty;
        inner.on_completed = None;
        inner.started = false;
        inner.running_unit = None;
        Ok(())
    }
}

impl<T> fmt::Debug for SharedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.cell.inner.lock();
        f.debug_struct("SharedState")
            .field("state", &inner.slot.name())
            .field("started", &inner.started)
            .field("waiters", &inner.waiters)
            .field("capability", &self.cell.capability)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, test_config, test_scheduler};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    fn plain<T: Send + 'static>() -> SharedState<T> {
        SharedState::new(test_scheduler(), test_config())
    }

    #[test]
    fn fresh_state_is_empty() {
        init_test_logging();
        let state = plain::<u32>();
        assert!(!state.is_ready());
        assert!(!state.has_value());
        assert!(!state.has_exception());
    }

    #[test]
    fn value_round_trips() {
        init_test_logging();
        let state = plain::<u32>();
        state.set_value(17).expect("first set");
        assert!(state.is_ready());
        assert!(state.has_value());
        assert!(!state.has_exception());
        assert_eq!(state.get().expect("get"), 17);
    }

    #[test]
    fn second_set_is_rejected_and_first_value_kept() {
        init_test_logging();
        let state = plain::<u32>();
        state.set_value(1).expect("first set");
        let err = state.set_value(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PromiseAlreadySatisfied);
        assert_eq!(state.get().expect("get"), 1);
    }

    #[test]
    fn error_is_observed_repeatedly() {
        init_test_logging();
        let state = plain::<u32>();
        state
            .set_exception(Error::internal("boom"))
            .expect("set error");
        assert!(state.has_exception());
        assert_eq!(state.get().unwrap_err().kind(), ErrorKind::Internal);
        // errors are not consumed
        assert_eq!(state.get().unwrap_err().kind(), ErrorKind::Internal);
    }

    #[test]
    fn value_taken_once_then_no_state() {
        init_test_logging();
        let state = plain::<String>();
        state.set_value("payload".to_string()).expect("set");
        assert_eq!(state.get().expect("get"), "payload");
        assert_eq!(state.get().unwrap_err().kind(), ErrorKind::NoState);
    }

    #[test]
    fn get_cloned_leaves_value_in_place() {
        init_test_logging();
        let state = plain::<String>();
        state.set_value("shared".to_string()).expect("set");
        assert_eq!(state.get_cloned().expect("first"), "shared");
        assert_eq!(state.get_cloned().expect("second"), "shared");
        assert_eq!(state.get().expect("move out"), "shared");
    }

    #[test]
    fn blocked_waiter_is_woken_by_producer() {
        init_test_logging();
        let state = plain::<u32>();
        let producer = state.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.set_value(7).expect("set");
        });
        assert_eq!(state.get().expect("get"), 7);
        assert!(start.elapsed() >= Duration::from_millis(10));
        handle.join().expect("join");
    }

    #[test]
    fn wait_until_times_out_without_cancelling_producer() {
        init_test_logging();
        let state = plain::<u32>();
        let status = state.wait_until(Instant::now() + Duration::from_millis(20));
        assert_eq!(status, FutureStatus::Timeout);
        // the producer is unaffected by the timed-out wait
        state.set_value(3).expect("set");
        assert_eq!(state.wait_until(Instant::now()), FutureStatus::Ready);
    }

    #[test]
    fn callback_registered_before_completion_fires_once() {
        init_test_logging();
        let state = plain::<u32>();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        state.set_on_completed(Box::new(move |_chain| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        state.set_value(1).expect("set");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_registered_after_completion_fires_before_return() {
        init_test_logging();
        let state = plain::<u32>();
        state.set_value(1).expect("set");
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        state.set_on_completed(Box::new(move |_chain| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_callbacks_compose_and_each_fires_once() {
        init_test_logging();
        let state = plain::<u32>();
        let fired = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&fired);
            state.set_on_completed(Box::new(move |_chain| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        state.set_value(9).expect("set");
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn reset_returns_state_to_empty() {
        init_test_logging();
        let state = plain::<u32>();
        state.set_value(5).expect("set");
        state.reset().expect("reset");
        assert!(!state.is_ready());
        state.set_value(6).expect("set after reset");
        assert_eq!(state.get().expect("get"), 6);
    }

    #[test]
    fn cancel_unsupported_on_plain_state() {
        init_test_logging();
        let state = plain::<u32>();
        let err = state.cancel().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FutureDoesNotSupportCancellation);
    }

    #[test]
    fn deferred_task_does_not_run_until_observed() {
        init_test_logging();
        let ran = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ran);
        let state = SharedState::deferred(test_scheduler(), test_config(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(5)
        });
        assert!(!state.is_ready());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(state.get().expect("get"), 5);
        assert!(state.is_ready());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deferred_probe_reports_deferred_without_starting() {
        init_test_logging();
        let state = SharedState::deferred(test_scheduler(), test_config(), || Ok(1));
        let status = state.wait_until(Instant::now() + Duration::from_millis(10));
        assert_eq!(status, FutureStatus::Deferred);
        assert!(!state.is_ready());
    }

    #[test]
    fn execute_deferred_is_idempotent() {
        init_test_logging();
        let ran = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ran);
        let state = SharedState::deferred(test_scheduler(), test_config(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        state.execute_deferred();
        state.execute_deferred();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_run_twice_reports_task_already_started() {
        init_test_logging();
        let state = SharedState::deferred(test_scheduler(), test_config(), || Ok(2));
        state.run().expect("first run");
        let err = state.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskAlreadyStarted);
        assert_eq!(state.get().expect("get"), 2);
    }

    #[test]
    fn task_error_is_stored_not_raised() {
        init_test_logging();
        let state: SharedState<u32> =
            SharedState::deferred(test_scheduler(), test_config(), || {
                Err(Error::internal("task failed"))
            });
        let err = state.get().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(state.has_exception());
    }

    #[test]
    fn task_panic_is_captured_as_error() {
        init_test_logging();
        let state: SharedState<u32> =
            SharedState::deferred(test_scheduler(), test_config(), || panic!("task panic"));
        let err = state.get().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    struct RefusingScheduler;

    impl crate::scheduler::Scheduler for RefusingScheduler {
        fn spawn(&self, _work: crate::scheduler::Work) -> Result<UnitId> {
            Err(Error::scheduling_failed("refused"))
        }

        fn spawn_at(&self, _at: Instant, _work: crate::scheduler::Work) -> Result<UnitId> {
            Err(Error::scheduling_failed("refused"))
        }

        fn interrupt(&self, _unit: UnitId) -> Result<()> {
            Err(Error::new(ErrorKind::InterruptFailed))
        }

        fn current_unit(&self) -> Option<UnitId> {
            None
        }

        fn interrupt_requested(&self, _unit: UnitId) -> bool {
            false
        }
    }

    #[test]
    fn completion_chain_survives_scheduler_refusal() {
        init_test_logging();
        let scheduler: SchedulerHandle = Arc::new(RefusingScheduler);
        let config = test_config().with_max_chain_depth(4);

        // link 32 states so the chain crosses the depth bound many times
        let head: SharedState<u32> = SharedState::new(scheduler.clone(), config.clone());
        let mut tail = head.clone();
        for _ in 0..32 {
            let next = SharedState::new(scheduler.clone(), config.clone());
            let downstream = next.clone();
            let source = tail.clone();
            tail.set_on_completed(Box::new(move |chain| {
                let value = source.take_ready().expect("source ready");
                downstream.set_value_at(chain, value + 1).expect("set");
            }));
            tail = next;
        }

        head.set_value(0).expect("set");
        assert_eq!(tail.get().expect("get"), 32);
    }

    #[test]
    fn cancel_before_start_fails() {
        init_test_logging();
        let state = SharedState::cancellable(test_scheduler(), test_config(), || Ok(1));
        let err = state.cancel().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskNotRunning);
    }

    #[test]
    fn cancel_after_completion_is_noop_success() {
        init_test_logging();
        let state = SharedState::cancellable(test_scheduler(), test_config(), || Ok(1));
        assert_eq!(state.get().expect("get"), 1);
        state.cancel().expect("cancel after ready");
    }
}
