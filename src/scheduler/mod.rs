//! The scheduler collaborator contract.
//!
//! The core never creates threads or fibers itself. Everything that needs a
//! new unit of work (respawned continuations, timed completions, eagerly
//! launched tasks) goes through the [`Scheduler`] trait, so a host runtime
//! can substitute its own lightweight-task scheduler. [`ThreadScheduler`] is
//! the bundled reference implementation backed by a pool of OS threads.

use crate::error::Result;
use crate::types::UnitId;
use std::sync::Arc;
use std::time::Instant;

mod thread_pool;

pub use thread_pool::ThreadScheduler;

/// A unit of work handed to the scheduler.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Contract consumed by the core for creating and controlling execution
/// units.
///
/// Interruption is cooperative: [`Scheduler::interrupt`] marks the unit, and
/// the unit's body is expected to poll [`Scheduler::interrupt_requested`] at
/// its own checkpoints. An interrupt request fails if the unit is not
/// currently known to the scheduler (never spawned, or already finished).
pub trait Scheduler: Send + Sync {
    /// Spawns `work` as a new unit, runnable immediately.
    fn spawn(&self, work: Work) -> Result<UnitId>;

    /// Spawns `work` as a suspended unit resumed at the absolute time `at`.
    fn spawn_at(&self, at: Instant, work: Work) -> Result<UnitId>;

    /// Requests cooperative interruption of `unit`.
    fn interrupt(&self, unit: UnitId) -> Result<()>;

    /// The unit currently executing on this thread, if the caller is running
    /// inside one of this scheduler's units.
    fn current_unit(&self) -> Option<UnitId>;

    /// Returns true if interruption has been requested for `unit`.
    fn interrupt_requested(&self, unit: UnitId) -> bool;
}

/// Shared handle to a scheduler implementation.
pub type SchedulerHandle = Arc<dyn Scheduler>;
