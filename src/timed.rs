//! Timed completion: satisfy a state at an absolute point in time.
//!
//! The helper hands a timer unit to the scheduler; if the unit cannot be
//! scheduled at all, the state is satisfied immediately with a scheduling
//! error so observers never hang on a timer that will not fire.

use crate::config::CoreConfig;
use crate::handle::Future;
use crate::scheduler::SchedulerHandle;
use crate::state::SharedState;
use std::time::Instant;

/// Arranges for `state` to be satisfied with `value` at `at`.
///
/// The completion can still lose a race against another producer; when that
/// happens the timer's value is discarded.
pub fn complete_at<T: Send + 'static>(state: &SharedState<T>, at: Instant, value: T) {
    let target = state.clone();
    let scheduled = state.scheduler().spawn_at(
        at,
        Box::new(move || {
            if let Err(e) = target.set_value(value) {
                tracing::trace!(error = %e, "timed value discarded, state already satisfied");
            }
        }),
    );
    if let Err(e) = scheduled {
        tracing::warn!(error = %e, "timer unit could not be scheduled");
        // Another producer may have satisfied the state in the meantime;
        // that supersedes the scheduling failure.
        let _ = state.set_exception(e.with_message("failed to schedule timed completion"));
    }
}

/// Creates a future that becomes ready with `value` at `at`.
#[must_use]
pub fn value_at<T: Send + 'static>(
    scheduler: SchedulerHandle,
    config: CoreConfig,
    at: Instant,
    value: T,
) -> Future<T> {
    let state = SharedState::new(scheduler, config);
    complete_at(&state, at, value);
    Future::from_state(state)
}
