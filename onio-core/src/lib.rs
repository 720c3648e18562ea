//! # onio-core
//!
//! Core traits and data types for the onio realtime middleware engine.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! middleware and transport adapters that don't need the full `onio`
//! application type.
//!
//! # Dispatch Model
//!
//! Every inbound event occurrence goes through the same three stages:
//!
//! ## Stage 1: Context ([`Context`])
//!
//! A fresh, exclusively owned carrier of the event name, its arguments, a
//! weak reference to the originating [`Connection`] and a typed, string-keyed
//! [`State`] store that middleware and listeners share.
//!
//! ## Stage 2: Middleware ([`Middleware`])
//!
//! An ordered chain composed into a single entry point by [`compose`].
//! Execution follows the onion model: each middleware runs its downstream
//! phase, hands control to the rest of the chain through [`Next::run`], then
//! runs its upstream phase once everything beneath it has finished.
//!
//! - **Exactly once**: every middleware is entered at most once per dispatch
//! - **Guarded**: a second [`Next::run`] fails with
//!   [`DispatchError::DuplicateNextInvocation`]
//! - **Fail fast**: a fault stops the chain and reaches the caller
//!
//! ## Stage 3: Listeners ([`Listener`])
//!
//! Terminal handlers bound to an event name. They observe the same context
//! after the chain completed and are independent of each other: one failing
//! listener is reported as a [`ListenerFault`] without affecting its siblings.
//!
//! # Error Types
//!
//! - [`OnioError`] - Top-level error type
//! - [`DispatchError`] - Middleware chain errors
//! - [`ListenerFault`] - A single listener failure
//! - [`TransportError`] - Errors reported by a transport collaborator

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod compose;
mod context;
mod error;
mod listener;
mod middleware;
mod transport;

// Re-exports
pub use compose::{Composed, Next, compose};
pub use context::{Context, State};
pub use error::{
    BoxError, DispatchError, ListenerFault, OnioError, PanicError, TransportError,
};
pub use listener::{DynListener, Listener, ListenerFn, SyncListenerFn, listener_fn, sync_listener};
pub use middleware::{DynMiddleware, Middleware, MiddlewareFn, middleware_fn};
pub use transport::{Connection, ConnectionCallback, ConnectionId, EventCallback, Transport};

/// A pinned, boxed future as returned by the object-safe traits.
pub use futures::future::BoxFuture;

/// Opaque event argument value.
pub use serde_json::Value;
