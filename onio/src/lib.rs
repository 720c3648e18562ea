//! # onio - Realtime Event Middleware
//!
//! `onio` dispatches events arriving on realtime socket connections through a
//! koa-style middleware chain and then to the listeners registered for the
//! event name.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use onio::prelude::*;
//!
//! let app = App::new();
//!
//! app.use_fn(|ctx, next| {
//!     Box::pin(async move {
//!         ctx.insert("user", "anonymous".to_owned());
//!         next.run(ctx).await
//!     })
//! });
//!
//! app.on_fn("chat", |ctx| {
//!     Box::pin(async move {
//!         let text = ctx.arg(0).cloned().unwrap_or(Value::Null);
//!         ctx.emit("chat", vec![text])?;
//!         Ok(())
//!     })
//! });
//!
//! app.attach(&transport)?;
//! ```
//!
//! ## Dispatch
//!
//! For every inbound event a fresh [`Context`] is built and the middleware
//! chain runs to completion. If it succeeded, each listener for the event
//! name runs in registration order against that same context. Listener
//! failures are isolated from each other and collected in a
//! [`DispatchReport`]; middleware failures abort the dispatch.
//!
//! ## Feature Flags
//!
//! - `timeout` (default): [`middleware::TimeoutMiddleware`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod app;
mod attach;
mod config;
mod report;

pub use app::App;
pub use config::{AppBuilder, AppConfig, Delivery};
pub use report::DispatchReport;

pub use onio_core::{
    // Futures
    BoxFuture,
    // Errors
    BoxError,
    // Composition
    Composed,
    // Transport
    Connection,
    ConnectionCallback,
    ConnectionId,
    // Context
    Context,
    DispatchError,
    // Middleware
    DynListener,
    DynMiddleware,
    EventCallback,
    // Listener
    Listener,
    ListenerFault,
    ListenerFn,
    Middleware,
    MiddlewareFn,
    Next,
    OnioError,
    PanicError,
    State,
    SyncListenerFn,
    Transport,
    TransportError,
    // JSON payloads
    Value,
    compose,
    listener_fn,
    middleware_fn,
    sync_listener,
};
pub use onio_std::{ListenerEntry, ListenerHandle, ListenerRegistry, ListenerSnapshot};
pub use serde_json::json;

/// Standard middleware implementations.
pub mod middleware {
    pub use onio_std::middleware::LoggingMiddleware;
    #[cfg(feature = "timeout")]
    pub use onio_std::middleware::{TimeoutError, TimeoutMiddleware};
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use onio_std::testing::*;
}

/// Prelude module - common imports for onio.
///
/// # Usage
///
/// ```rust,ignore
/// use onio::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        App, BoxError, BoxFuture, Context, Delivery, DispatchError, DispatchReport, Listener,
        ListenerHandle, Middleware, Next, Value, json,
    };
}
