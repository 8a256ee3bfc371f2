//! Promissory: future/promise core with addressed continuations.
//!
//! # Overview
//!
//! Promissory is the concurrency core of a distributed asynchronous-computing
//! runtime. It provides a future/promise engine with continuation chaining,
//! deferred (lazy) task execution, cooperative cancellation, and routing of
//! results to either a local waiter or a named remote destination.
//!
//! The crate deliberately stops at narrow collaborator interfaces: the
//! low-level work scheduler is consumed through the [`scheduler::Scheduler`]
//! trait, and cross-process result delivery through the [`routing::Router`]
//! trait. Reference implementations of both (an OS-thread pool and an
//! in-process destination registry) are included so the core is usable and
//! testable on its own.
//!
//! # Core Guarantees
//!
//! - **Single transition**: a shared state moves from empty to ready at most
//!   once per generation; a second `set_value`/`set_exception` is rejected
//!   and the first result is preserved
//! - **No missed wakeups**: the payload write happens-before any waiter
//!   observes the ready state and before the completion callback runs
//! - **No lock over user code**: completion callbacks and task bodies run
//!   outside the state mutex
//! - **Bounded continuation recursion**: synchronous continuation chains are
//!   re-dispatched to the scheduler past a configurable depth, so arbitrarily
//!   long chains cannot overflow the stack
//! - **No abandoned waiters**: dropping an unsatisfied [`Promise`] poisons
//!   the state with a broken-promise error instead of leaving waiters parked
//!   forever
//!
//! # Module Structure
//!
//! - [`types`]: identifiers, future status, and the continuation chain-depth token
//! - [`error`]: error kinds, categories, and the crate [`Error`] type
//! - [`config`]: core configuration with environment overrides
//! - [`scheduler`]: the scheduler contract and a thread-pool reference implementation
//! - [`state`]: the shared future/promise state machine
//! - [`handle`]: user-facing [`Promise`] and [`Future`] handles
//! - [`runtime`]: the [`Core`] context bundling scheduler and configuration
//! - [`continuation`]: addressed continuations and their wire form
//! - [`routing`]: destination resolution and value delivery
//! - [`timed`]: scheduled completion at an absolute time
//!
//! # Example
//!
//! ```
//! use promissory::{Core, CoreConfig};
//! use promissory::scheduler::ThreadScheduler;
//!
//! let core = Core::new(ThreadScheduler::start(&CoreConfig::default()), CoreConfig::default());
//! let promise = core.promise::<u32>();
//! let future = promise.future();
//!
//! promise.set_value(7).unwrap();
//! assert_eq!(future.get().unwrap(), 7);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod continuation;
pub mod error;
pub mod handle;
pub mod routing;
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod timed;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::CoreConfig;
pub use continuation::{Continuation, WireContinuation};
pub use error::{Error, ErrorKind, Result};
pub use handle::{Future, Promise};
pub use routing::{LocalRouter, Router};
pub use runtime::Core;
pub use scheduler::{Scheduler, SchedulerHandle};
pub use state::SharedState;
pub use types::{Chain, FutureStatus};
