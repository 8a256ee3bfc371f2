//! Destination resolution and result delivery.
//!
//! Continuations name their receiver by [`DestinationId`]; a [`Router`]
//! turns that name into an [`Address`] and carries the produced value or
//! error to whatever lives there. [`LocalRouter`] is the in-process
//! implementation: a registry of weak references to [`ValueTarget`]s, which
//! [`SharedState`] implements directly so a delivered result satisfies the
//! receiving future.
//!
//! Registrations are weak on purpose: a destination whose state has been
//! dropped resolves to `UnknownDestination` instead of keeping the state
//! alive forever.

use crate::error::{Error, Result};
use crate::state::SharedState;
use crate::types::{Address, Chain, DestinationId, NodeId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// A receiver of continuation results.
pub trait ValueTarget<T>: Send + Sync {
    /// Accepts the produced value.
    fn accept_value(&self, chain: Chain, value: T) -> Result<()>;

    /// Accepts the producer's error.
    fn accept_error(&self, chain: Chain, error: Error) -> Result<()>;
}

impl<T: Send + 'static> ValueTarget<T> for SharedState<T> {
    fn accept_value(&self, chain: Chain, value: T) -> Result<()> {
        self.set_value_at(chain, value)
    }

    fn accept_error(&self, chain: Chain, error: Error) -> Result<()> {
        self.set_exception_at(chain, error)
    }
}

/// Resolves destinations and delivers continuation results to them.
pub trait Router<T>: Send + Sync {
    /// Returns the address of `destination` if it is registered here.
    fn resolve_local(&self, destination: DestinationId) -> Option<Address>;

    /// Delivers `value` to `destination`. `hint` is a previously resolved
    /// address the router may use to skip its own lookup.
    fn deliver_value(
        &self,
        destination: DestinationId,
        hint: Option<&Address>,
        chain: Chain,
        value: T,
    ) -> Result<()>;

    /// Delivers `error` to `destination`.
    fn deliver_error(
        &self,
        destination: DestinationId,
        hint: Option<&Address>,
        chain: Chain,
        error: Error,
    ) -> Result<()>;
}

/// In-process router backed by a weak-reference registry.
pub struct LocalRouter<T> {
    node: NodeId,
    targets: RwLock<HashMap<DestinationId, Weak<dyn ValueTarget<T>>>>,
}

impl<T: Send + 'static> LocalRouter<T> {
    /// Creates an empty router for `node`.
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            targets: RwLock::new(HashMap::new()),
        }
    }

    /// The node this router serves.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Registers `target` under a fresh destination id and returns the id.
    pub fn register(&self, target: &Arc<dyn ValueTarget<T>>) -> DestinationId {
        let destination = DestinationId::next();
        self.targets
            .write()
            .insert(destination, Arc::downgrade(target));
        destination
    }

    /// Registers a shared state as a delivery target.
    pub fn register_state(&self, state: &SharedState<T>) -> (DestinationId, Arc<SharedState<T>>) {
        let shared = Arc::new(state.clone());
        let target: Arc<dyn ValueTarget<T>> = Arc::clone(&shared) as Arc<dyn ValueTarget<T>>;
        let destination = self.register(&target);
        (destination, shared)
    }

    /// Removes `destination` from the registry.
    pub fn unregister(&self, destination: DestinationId) {
        self.targets.write().remove(&destination);
    }

    fn lookup(&self, destination: DestinationId) -> Result<Arc<dyn ValueTarget<T>>> {
        let targets = self.targets.read();
        targets
            .get(&destination)
            .and_then(Weak::upgrade)
            .ok_or_else(|| Error::unknown_destination(destination))
    }
}

impl<T: Send + 'static> Router<T> for LocalRouter<T> {
    fn resolve_local(&self, destination: DestinationId) -> Option<Address> {
        let targets = self.targets.read();
        targets
            .get(&destination)
            .and_then(Weak::upgrade)
            .map(|_| Address::new(self.node.clone(), destination.raw()))
    }

    fn deliver_value(
        &self,
        destination: DestinationId,
        _hint: Option<&Address>,
        chain: Chain,
        value: T,
    ) -> Result<()> {
        tracing::trace!(%destination, %chain, "delivering value");
        self.lookup(destination)?.accept_value(chain, value)
    }

    fn deliver_error(
        &self,
        destination: DestinationId,
        _hint: Option<&Address>,
        chain: Chain,
        error: Error,
    ) -> Result<()> {
        tracing::trace!(%destination, %chain, "delivering error");
        self.lookup(destination)?.accept_error(chain, error)
    }
}

impl<T> fmt::Debug for LocalRouter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRouter")
            .field("node", &self.node)
            .field("targets", &self.targets.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{init_test_logging, test_config, test_scheduler};

    fn router() -> LocalRouter<u32> {
        LocalRouter::new(NodeId::new("test-node"))
    }

    #[test]
    fn registered_state_receives_delivered_value() {
        init_test_logging();
        let router = router();
        let state = SharedState::new(test_scheduler(), test_config());
        let (destination, _keep) = router.register_state(&state);
        router
            .deliver_value(destination, None, Chain::root(), 42)
            .expect("deliver");
        assert_eq!(state.get().expect("get"), 42);
    }

    #[test]
    fn delivered_error_satisfies_state_with_error() {
        init_test_logging();
        let router = router();
        let state = SharedState::new(test_scheduler(), test_config());
        let (destination, _keep) = router.register_state(&state);
        router
            .deliver_error(destination, None, Chain::root(), Error::internal("remote boom"))
            .expect("deliver error");
        assert_eq!(state.get().unwrap_err().kind(), ErrorKind::Internal);
    }

    #[test]
    fn unknown_destination_is_reported() {
        init_test_logging();
        let router = router();
        let err = router
            .deliver_value(DestinationId::next(), None, Chain::root(), 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownDestination);
    }

    #[test]
    fn dropped_target_resolves_to_unknown() {
        init_test_logging();
        let router = router();
        let state = SharedState::new(test_scheduler(), test_config());
        let (destination, keep) = router.register_state(&state);
        assert!(router.resolve_local(destination).is_some());
        drop(keep);
        drop(state);
        assert!(router.resolve_local(destination).is_none());
        let err = router
            .deliver_value(destination, None, Chain::root(), 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownDestination);
    }

    #[test]
    fn resolve_local_reports_node_and_slot() {
        init_test_logging();
        let router = router();
        let state = SharedState::new(test_scheduler(), test_config());
        let (destination, _keep) = router.register_state(&state);
        let addr = router.resolve_local(destination).expect("resolve");
        assert_eq!(addr.node(), &NodeId::new("test-node"));
        assert_eq!(addr.slot(), destination.raw());
    }
}
