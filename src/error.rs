//! Error types and error handling strategy for Promissory.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Every fallible operation returns [`Result`]; errors raised inside a
//!   deferred task body are captured into the owning state, never propagated
//!   out of the observer's call frame
//! - There is exactly one process-wide [`ErrorKind`] enumeration; no lazily
//!   initialized error-category singletons
//!
//! # Error Categories
//!
//! - **Promise**: shared-state lifecycle violations (double set, abandonment)
//! - **Task**: deferred task start/run protocol violations
//! - **Cancellation**: cancellation outcomes and refusals
//! - **Continuation**: addressed continuation protocol violations
//! - **Routing**: destination resolution and delivery failures
//! - **Scheduling**: collaborator scheduler failures
//! - **Internal**: runtime bugs and invalid states
//! - **User**: errors originating in user task bodies

use std::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Promise / shared state ===
    /// `set_value` or `set_exception` called on an already-satisfied state.
    PromiseAlreadySatisfied,
    /// The producer was destroyed before satisfying the state.
    BrokenPromise,
    /// The state's payload has already been extracted.
    NoState,

    // === Deferred tasks ===
    /// Explicit `run()` called on a task that was already started.
    TaskAlreadyStarted,
    /// Cancellation requested before the task ever started running.
    TaskNotRunning,

    // === Cancellation ===
    /// The future was cancelled; stored as the future's error on success.
    FutureCancelled,
    /// Cancellation was attempted but is not possible right now.
    FutureCanNotBeCancelled,
    /// The state does not support cancellation at all.
    FutureDoesNotSupportCancellation,

    // === Continuations ===
    /// A continuation was triggered more than once.
    ContinuationAlreadyTriggered,

    // === Routing ===
    /// No route to the named destination.
    UnknownDestination,

    // === Scheduling ===
    /// The scheduler collaborator failed to create or schedule a unit.
    SchedulingFailed,
    /// An interruption request was rejected by the scheduler.
    InterruptFailed,
    /// The requested operation is not supported by this state.
    OperationNotSupported,

    // === Internal / user ===
    /// Internal runtime error (bug).
    Internal,
    /// Error raised by a user-supplied task or callback.
    User,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::PromiseAlreadySatisfied | Self::BrokenPromise | Self::NoState => {
                ErrorCategory::Promise
            }
            Self::TaskAlreadyStarted | Self::TaskNotRunning => ErrorCategory::Task,
            Self::FutureCancelled
            | Self::FutureCanNotBeCancelled
            | Self::FutureDoesNotSupportCancellation => ErrorCategory::Cancellation,
            Self::ContinuationAlreadyTriggered => ErrorCategory::Continuation,
            Self::UnknownDestination => ErrorCategory::Routing,
            Self::SchedulingFailed | Self::InterruptFailed | Self::OperationNotSupported => {
                ErrorCategory::Scheduling
            }
            Self::Internal => ErrorCategory::Internal,
            Self::User => ErrorCategory::User,
        }
    }

    /// Returns true if observing this kind means the operation may succeed
    /// if re-attempted later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::FutureCanNotBeCancelled | Self::TaskNotRunning)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Shared-state lifecycle failures.
    Promise,
    /// Deferred task protocol failures.
    Task,
    /// Cancellation outcomes and refusals.
    Cancellation,
    /// Continuation protocol failures.
    Continuation,
    /// Destination resolution and delivery failures.
    Routing,
    /// Scheduler collaborator failures.
    Scheduling,
    /// Internal runtime errors.
    Internal,
    /// User-originated errors.
    User,
}

/// The main error type for Promissory operations.
///
/// Errors carry a [`ErrorKind`], an optional human-readable message, and an
/// optional source chain. They are cheaply cloneable so a stored error can be
/// observed by any number of future handles.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns true if this error records a successful cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::FutureCancelled)
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates an internal error (runtime bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Creates a user error from any error value.
    #[must_use]
    pub fn user(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::User).with_source(source)
    }

    /// Creates a broken-promise error naming the abandoned producer.
    #[must_use]
    pub fn broken_promise() -> Self {
        Self::new(ErrorKind::BrokenPromise)
            .with_message("promise dropped before the shared state was satisfied")
    }

    /// Creates an unknown-destination routing error.
    #[must_use]
    pub fn unknown_destination(destination: impl fmt::Display) -> Self {
        Self::new(ErrorKind::UnknownDestination)
            .with_message(format!("no route to destination {destination}"))
    }

    /// Creates a scheduling failure error.
    #[must_use]
    pub fn scheduling_failed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchedulingFailed).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach a context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for Promissory operations.
pub type Result<T> = std::result::Result<T, Error>;
