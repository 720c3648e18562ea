//! Error types for onio.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`OnioError`] - Top-level error type for all onio operations
//! - [`DispatchError`] - Errors that terminate a dispatch
//! - [`ListenerFault`] - A failure isolated to one listener
//! - [`TransportError`] - Errors from the transport collaborator
//! - [`PanicError`] - A caught panic, converted into an ordinary fault

use std::any::Any;
use thiserror::Error;

/// A boxed error type for dynamic error handling.
///
/// This is the fault type returned by middleware and listeners.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all onio operations.
#[derive(Error, Debug)]
pub enum OnioError {
    /// A dispatch was aborted.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The transport collaborator reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A custom error occurred.
    #[error(transparent)]
    Custom(BoxError),
}

/// Errors that abort the dispatch of one event occurrence.
///
/// When a dispatch ends with one of these, none of the listeners for that
/// event were invoked.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A middleware invoked its `next` continuation more than once.
    #[error("next() called more than once by middleware at position {position}")]
    DuplicateNextInvocation {
        /// Position of the offending middleware in the chain.
        position: usize,
    },

    /// A middleware body returned an error or panicked.
    #[error("middleware at position {position} failed")]
    Middleware {
        /// Position of the innermost middleware that returned the fault.
        position: usize,
        /// The underlying fault.
        #[source]
        source: BoxError,
    },
}

impl DispatchError {
    /// Returns `true` for [`DispatchError::DuplicateNextInvocation`].
    pub fn is_duplicate_next(&self) -> bool {
        matches!(self, DispatchError::DuplicateNextInvocation { .. })
    }

    /// Position of the middleware this error is attributed to.
    pub fn position(&self) -> usize {
        match self {
            DispatchError::DuplicateNextInvocation { position }
            | DispatchError::Middleware { position, .. } => *position,
        }
    }
}

/// A failure raised by a single listener.
///
/// Listener faults never abort a dispatch; they are collected in the
/// dispatch report and logged.
#[derive(Error, Debug)]
#[error("listener #{index} for event `{event}` failed")]
pub struct ListenerFault {
    /// The event name being dispatched.
    pub event: String,
    /// Position of the listener in registration order.
    pub index: usize,
    /// The underlying fault.
    #[source]
    pub source: BoxError,
}

impl ListenerFault {
    /// Create a new listener fault.
    pub fn new(event: impl Into<String>, index: usize, source: BoxError) -> Self {
        Self {
            event: event.into(),
            index,
            source,
        }
    }
}

/// Errors reported by a transport collaborator.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection is no longer alive.
    #[error("connection {0} is disconnected")]
    Disconnected(String),

    /// The transport has been shut down.
    #[error("transport is closed")]
    Closed,

    /// A transport specific error.
    #[error(transparent)]
    Custom(BoxError),
}

/// A panic caught while running a middleware or listener.
#[derive(Error, Debug, Clone)]
#[error("panicked: {message}")]
pub struct PanicError {
    message: String,
}

impl PanicError {
    /// Build from the payload returned by `catch_unwind`.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self { message }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

// Convenience conversions
impl From<BoxError> for OnioError {
    fn from(err: BoxError) -> Self {
        OnioError::Custom(err)
    }
}

impl From<BoxError> for TransportError {
    fn from(err: BoxError) -> Self {
        TransportError::Custom(err)
    }
}
