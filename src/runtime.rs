//! The core context: explicit construction roots for futures and tasks.
//!
//! [`Core`] bundles the scheduler handle and configuration that every shared
//! state needs, so call sites never reach for process-global singletons. The
//! context is built explicitly at startup and cloned into whatever needs to
//! mint futures.

use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::handle::{Future, Promise};
use crate::scheduler::SchedulerHandle;
use crate::state::SharedState;
use crate::timed;
use std::time::Instant;

/// Factory context for futures, promises, and tasks.
#[derive(Clone)]
pub struct Core {
    scheduler: SchedulerHandle,
    config: CoreConfig,
}

impl Core {
    /// Creates a context over `scheduler` with `config`.
    #[must_use]
    pub fn new(scheduler: SchedulerHandle, config: CoreConfig) -> Self {
        Self { scheduler, config }
    }

    /// The scheduler this context dispatches through.
    #[must_use]
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// The configuration this context was built with.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Creates a fresh, externally satisfied shared state.
    #[must_use]
    pub fn shared_state<T: Send + 'static>(&self) -> SharedState<T> {
        SharedState::new(self.scheduler.clone(), self.config.clone())
    }

    /// Creates the producer handle of a new future/promise pair.
    #[must_use]
    pub fn promise<T: Send + 'static>(&self) -> Promise<T> {
        Promise::from_state(self.shared_state())
    }

    /// Creates a lazy task future: `task` runs on the first observing
    /// thread.
    #[must_use]
    pub fn deferred<T, F>(&self, task: F) -> Future<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Future::from_state(SharedState::deferred(
            self.scheduler.clone(),
            self.config.clone(),
            task,
        ))
    }

    /// Creates a lazy task future whose running task can be cancelled.
    #[must_use]
    pub fn cancellable<T, F>(&self, task: F) -> Future<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Future::from_state(SharedState::cancellable(
            self.scheduler.clone(),
            self.config.clone(),
            task,
        ))
    }

    /// Spawns `task` eagerly on the scheduler and returns its future.
    ///
    /// The future supports cancellation while the task runs. If the
    /// scheduler refuses the unit, the future is immediately satisfied with
    /// the scheduling error.
    #[must_use]
    pub fn spawn<T, F>(&self, task: F) -> Future<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let state = SharedState::cancellable(self.scheduler.clone(), self.config.clone(), task);
        let runner = state.clone();
        let spawned = self
            .scheduler
            .spawn(Box::new(move || runner.execute_deferred()));
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "task unit could not be scheduled");
            let _ = state.set_exception(e);
        }
        Future::from_state(state)
    }

    /// Creates a future that becomes ready with `value` at `at`.
    #[must_use]
    pub fn value_at<T: Send + 'static>(&self, at: Instant, value: T) -> Future<T> {
        timed::value_at(self.scheduler.clone(), self.config.clone(), at, value)
    }

    /// Creates a future that is already satisfied with `value`.
    #[must_use]
    pub fn ready<T: Send + 'static>(&self, value: T) -> Future<T> {
        let state = self.shared_state();
        // Infallible: the state was created empty one line up.
        let _ = state.set_value(value);
        Future::from_state(state)
    }

    /// Creates a future that is already satisfied with `error`.
    #[must_use]
    pub fn failed<T: Send + 'static>(&self, error: Error) -> Future<T> {
        let state = self.shared_state::<T>();
        let _ = state.set_exception(error);
        Future::from_state(state)
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core").field("config", &self.config).finish()
    }
}
