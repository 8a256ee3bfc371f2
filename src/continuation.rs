//! Addressed continuations.
//!
//! A [`Continuation`] names the destination that must receive a produced
//! value, plus what to do with the value on arrival:
//!
//! - `Deliver`: hand the raw value to the destination through the router
//! - `Callback`: run a local closure instead of routing the value
//! - `Chained`: transform the value locally, then trigger the next link
//!
//! Every continuation is exactly-once: a second `trigger` or `trigger_error`
//! reports `ContinuationAlreadyTriggered` and has no effect. Errors bypass
//! any local handling and are always routed to the destination, so a failed
//! producer surfaces at the receiver no matter what the continuation would
//! have done with a value.
//!
//! [`WireContinuation`] is the serializable form: an explicit tag plus the
//! addressing fields. Local callbacks cannot cross the wire and degrade to
//! plain delivery on encode.

use crate::error::{Error, ErrorKind, Result};
use crate::routing::Router;
use crate::types::{Address, Chain, DestinationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem;

/// What a continuation does with an arriving value.
pub enum ContinuationKind<T> {
    /// Route the value to the destination unchanged.
    Deliver,
    /// Invoke a local closure with the destination and value.
    Callback(Box<dyn FnOnce(DestinationId, T) + Send>),
    /// Transform the value locally, then trigger the next link.
    Chained {
        /// Local transformation applied before the next link fires.
        handler: Box<dyn FnOnce(DestinationId, T) -> T + Send>,
        /// The continuation triggered with the transformed value.
        next: Box<Continuation<T>>,
    },
}

impl<T> fmt::Debug for ContinuationKind<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deliver => f.write_str("Deliver"),
            Self::Callback(_) => f.write_str("Callback"),
            Self::Chained { next, .. } => f
                .debug_struct("Chained")
                .field("next_destination", &next.destination)
                .finish(),
        }
    }
}

/// An addressed, exactly-once receiver of one produced value.
pub struct Continuation<T> {
    destination: DestinationId,
    addr: Option<Address>,
    kind: ContinuationKind<T>,
    fired: bool,
}

// The boxed `next` links would otherwise drop recursively, overflowing the
// stack for a long untriggered chain; unlink them iteratively instead.
impl<T> Drop for Continuation<T> {
    fn drop(&mut self) {
        let mut kind = mem::replace(&mut self.kind, ContinuationKind::Deliver);
        while let ContinuationKind::Chained { next, .. } = kind {
            let mut link = *next;
            kind = mem::replace(&mut link.kind, ContinuationKind::Deliver);
        }
    }
}

impl<T> fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("destination", &self.destination)
            .field("addr", &self.addr)
            .field("kind", &self.kind)
            .field("fired", &self.fired)
            .finish()
    }
}

impl<T: Send + 'static> Continuation<T> {
    /// Creates a plain delivery continuation, caching the destination's
    /// address if the router can resolve it locally.
    #[must_use]
    pub fn deliver(destination: DestinationId, router: &dyn Router<T>) -> Self {
        Self {
            destination,
            addr: router.resolve_local(destination),
            kind: ContinuationKind::Deliver,
            fired: false,
        }
    }

    /// Creates a delivery continuation from raw addressing data, e.g. as
    /// decoded from the wire. `addr` is an optional resolution hint.
    #[must_use]
    pub fn deliver_raw(destination: DestinationId, addr: Option<Address>) -> Self {
        Self {
            destination,
            addr,
            kind: ContinuationKind::Deliver,
            fired: false,
        }
    }

    /// Creates a continuation that runs `callback` locally with the value.
    #[must_use]
    pub fn callback(
        destination: DestinationId,
        callback: impl FnOnce(DestinationId, T) + Send + 'static,
    ) -> Self {
        Self {
            destination,
            addr: None,
            kind: ContinuationKind::Callback(Box::new(callback)),
            fired: false,
        }
    }

    /// Creates a continuation that transforms the value with `handler` and
    /// then triggers `next`.
    #[must_use]
    pub fn chained(
        destination: DestinationId,
        handler: impl FnOnce(DestinationId, T) -> T + Send + 'static,
        next: Continuation<T>,
    ) -> Self {
        Self {
            destination,
            addr: None,
            kind: ContinuationKind::Chained {
                handler: Box::new(handler),
                next: Box::new(next),
            },
            fired: false,
        }
    }

    /// The destination this continuation addresses.
    #[must_use]
    pub fn destination(&self) -> DestinationId {
        self.destination
    }

    /// The cached address hint, if any.
    #[must_use]
    pub fn addr(&self) -> Option<&Address> {
        self.addr.as_ref()
    }

    /// True once the continuation has been triggered.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    fn claim_fire(&mut self) -> Result<()> {
        if self.fired {
            return Err(Error::new(ErrorKind::ContinuationAlreadyTriggered)
                .with_message(format!("continuation for {} already triggered", self.destination)));
        }
        self.fired = true;
        Ok(())
    }

    /// Triggers the continuation with the produced `value`.
    ///
    /// The chain of links is walked iteratively, so arbitrarily long chains
    /// use constant stack. Each link still deepens `chain` by one, so the
    /// final delivery carries an honest depth into the receiving state's
    /// completion dispatch.
    pub fn trigger(&mut self, chain: Chain, value: T, router: &dyn Router<T>) -> Result<()> {
        self.claim_fire()?;
        tracing::trace!(destination = %self.destination, %chain, "triggering continuation");
        let mut chain = chain;
        let mut value = value;
        let mut destination = self.destination;
        let mut addr = self.addr.take();
        let mut kind = mem::replace(&mut self.kind, ContinuationKind::Deliver);
        loop {
            match kind {
                ContinuationKind::Deliver => {
                    return router.deliver_value(destination, addr.as_ref(), chain, value);
                }
                ContinuationKind::Callback(callback) => {
                    callback(destination, value);
                    return Ok(());
                }
                ContinuationKind::Chained { handler, next } => {
                    value = handler(destination, value);
                    chain = chain.deeper();
                    let mut link = *next;
                    link.claim_fire()?;
                    destination = link.destination;
                    addr = link.addr.take();
                    kind = mem::replace(&mut link.kind, ContinuationKind::Deliver);
                }
            }
        }
    }

    /// Triggers the continuation with the producer's `error`.
    ///
    /// The error always goes to the destination through the router; local
    /// callbacks and chain handlers are skipped, since they only know how to
    /// handle values.
    pub fn trigger_error(&mut self, chain: Chain, error: Error, router: &dyn Router<T>) -> Result<()> {
        self.claim_fire()?;
        tracing::trace!(destination = %self.destination, %chain, "routing continuation error");
        router.deliver_error(self.destination, self.addr.as_ref(), chain, error)
    }
}

/// Failures while encoding or decoding a [`WireContinuation`].
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The JSON payload was malformed.
    #[error("malformed continuation payload: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A chained continuation arrived without its next link.
    #[error("chained continuation for {destination} has no next link")]
    MissingNext {
        /// The destination of the truncated link.
        destination: DestinationId,
    },
}

/// Serializable tag naming a continuation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationTag {
    /// Plain delivery to the destination.
    Deliver,
    /// A chained link followed by `next`.
    Chained,
}

/// The wire form of a [`Continuation`]: tag plus addressing data.
///
/// Closures do not cross the wire, so `Callback` continuations encode as
/// plain `Deliver` and `Chained` links decode with an identity handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireContinuation {
    /// Which variant this record is.
    pub tag: ContinuationTag,
    /// The addressed destination.
    pub destination: DestinationId,
    /// Cached address hint, if the sender had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<Address>,
    /// The next link of a chained continuation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<WireContinuation>>,
}

impl WireContinuation {
    /// Encodes a continuation for transport.
    #[must_use]
    pub fn encode<T>(continuation: &Continuation<T>) -> Self {
        match &continuation.kind {
            ContinuationKind::Deliver | ContinuationKind::Callback(_) => Self {
                tag: ContinuationTag::Deliver,
                destination: continuation.destination,
                addr: continuation.addr.clone(),
                next: None,
            },
            ContinuationKind::Chained { next, .. } => Self {
                tag: ContinuationTag::Chained,
                destination: continuation.destination,
                addr: continuation.addr.clone(),
                next: Some(Box::new(Self::encode(next))),
            },
        }
    }

    /// Reconstructs a live continuation from its wire form.
    ///
    /// Chained links get an identity handler; the sender's local transform
    /// already ran before encoding.
    pub fn decode<T: Send + 'static>(&self) -> std::result::Result<Continuation<T>, WireError> {
        match self.tag {
            ContinuationTag::Deliver => Ok(Continuation::deliver_raw(
                self.destination,
                self.addr.clone(),
            )),
            ContinuationTag::Chained => {
                let next = self.next.as_ref().ok_or(WireError::MissingNext {
                    destination: self.destination,
                })?;
                let mut decoded = Continuation::chained(
                    self.destination,
                    |_destination, value| value,
                    next.decode()?,
                );
                decoded.addr = self.addr.clone();
                Ok(decoded)
            }
        }
    }

    /// Serializes to a JSON string.
    pub fn to_json(&self) -> std::result::Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes from a JSON string.
    pub fn from_json(payload: &str) -> std::result::Result<Self, WireError> {
        Ok(serde_json::from_str(payload)?)
    }
}
