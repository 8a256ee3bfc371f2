//! Core types shared across the crate.
//!
//! - [`id`]: type-safe identifiers for destinations, execution units, and nodes
//! - [`Chain`]: the explicit continuation-depth token
//! - [`FutureStatus`]: the tri-state outcome of a timed wait

use std::fmt;

pub mod id;

pub use id::{Address, DestinationId, NodeId, UnitId};

/// Outcome of a [`wait_until`](crate::state::SharedState::wait_until) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FutureStatus {
    /// The state became ready before the deadline.
    Ready,
    /// The deadline passed while the state was still empty. The producer is
    /// unaffected; only this particular wait gave up.
    Timeout,
    /// The state is a deferred task that has not started yet. Probing it with
    /// a timed wait does not start it.
    Deferred,
}

/// Explicit continuation-chain depth token.
///
/// Completing a state invokes its completion callback synchronously, and that
/// callback may complete another state, and so on. To keep arbitrarily long
/// chains from overflowing the stack, the current depth is threaded through
/// every dispatch as a `Chain` value rather than hidden in thread-local
/// state. When the depth crosses the configured limit the dispatcher hands
/// the callback to the scheduler as a fresh unit and the chain restarts at
/// [`Chain::root`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Chain {
    depth: u32,
}

impl Chain {
    /// The start of a new logical call chain.
    #[must_use]
    pub const fn root() -> Self {
        Self { depth: 0 }
    }

    /// The chain one synchronous dispatch deeper.
    #[must_use]
    pub const fn deeper(self) -> Self {
        Self {
            depth: self.depth.saturating_add(1),
        }
    }

    /// Current synchronous dispatch depth.
    #[must_use]
    pub const fn depth(self) -> u32 {
        self.depth
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain@{}", self.depth)
    }
}
