//! Identifier types for destinations, execution units, and nodes.
//!
//! These wrap raw integers or strings with type safety, in the same way the
//! runtime distinguishes task and region identifiers. Destination and unit
//! identifiers are allocated from process-wide atomic counters; identifiers
//! received over the wire are reconstructed with `from_raw`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static DESTINATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a continuation recipient.
///
/// A destination may resolve to an object in this process or to a location
/// reachable only through the transport. The core never interprets the value
/// beyond equality; the [`Router`](crate::routing::Router) maps it to an
/// [`Address`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DestinationId(u64);

impl DestinationId {
    /// Allocates a new process-unique destination identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(DESTINATION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Reconstructs a destination identifier from its raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DestinationId({})", self.0)
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// Identifier of a scheduler-managed execution unit.
///
/// Unit identifiers are allocated by the scheduler implementation; the core
/// only stores and compares them (for cancellation bookkeeping and
/// current-unit queries).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(u64);

impl UnitId {
    /// Creates a unit identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitId({})", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U{}", self.0)
    }
}

/// Identifier for a node in the cluster.
///
/// Nodes are opaque names. The core does not interpret them beyond equality
/// and display; the transport layer maps a `NodeId` to a network address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new node identifier from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the node identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// A resolved location for a destination: the node holding it plus an opaque
/// per-node slot.
///
/// Addresses are a best-effort cache. Absence of an address only means
/// "resolve before send"; a stale address degrades to re-resolution at
/// delivery time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    node: NodeId,
    slot: u64,
}

impl Address {
    /// Creates an address from a node and slot.
    #[must_use]
    pub const fn new(node: NodeId, slot: u64) -> Self {
        Self { node, slot }
    }

    /// The node holding the destination.
    #[must_use]
    pub const fn node(&self) -> &NodeId {
        &self.node
    }

    /// The opaque per-node slot.
    #[must_use]
    pub const fn slot(&self) -> u64 {
        self.slot
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.slot)
    }
}
