//! # Listener
//!
//! Terminal handlers bound to an event name. Listeners run after the
//! middleware chain completed, in registration order, against the same
//! [`Context`]. Unlike middleware they do not form a pipeline: each one is an
//! independent observer and a failing listener does not stop its siblings.
//!
//! # Usage Patterns
//!
//! 1. **Struct implementation**: `impl Listener for MyListener`
//! 2. **Async closure**: `listener_fn(|ctx| Box::pin(async move { ... }))`
//! 3. **Sync closure**: `sync_listener(|ctx| { ...; Ok(()) })`

use crate::{context::Context, error::BoxError};
use futures::future::BoxFuture;
use std::future::Future;

/// A terminal handler for one event name.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Listener`",
    label = "missing `Listener` implementation",
    note = "Implement `Listener`, or wrap a closure with `listener_fn` / `sync_listener`."
)]
pub trait Listener: Send + Sync + 'static {
    /// Handle one dispatched event.
    fn call(&self, ctx: &mut Context) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Dynamic object-safe version of [`Listener`].
pub trait DynListener: Send + Sync + 'static {
    /// Handle one dispatched event (dynamic dispatch version).
    fn call_dyn<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), BoxError>>;
}

impl<L: Listener> DynListener for L {
    fn call_dyn<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.call(ctx))
    }
}

/// A [`Listener`] built from an async closure. See [`listener_fn`].
#[derive(Clone)]
pub struct ListenerFn<F> {
    func: F,
}

/// Wrap a closure returning a boxed future as a [`Listener`].
pub fn listener_fn<F>(func: F) -> ListenerFn<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), BoxError>> + Send + Sync + 'static,
{
    ListenerFn { func }
}

impl<F> Listener for ListenerFn<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), BoxError>> + Send + Sync + 'static,
{
    fn call(&self, ctx: &mut Context) -> impl Future<Output = Result<(), BoxError>> + Send {
        (self.func)(ctx)
    }
}

/// A [`Listener`] built from a synchronous closure. See [`sync_listener`].
#[derive(Clone)]
pub struct SyncListenerFn<F> {
    func: F,
}

/// Wrap a synchronous closure as a [`Listener`].
pub fn sync_listener<F>(func: F) -> SyncListenerFn<F>
where
    F: Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static,
{
    SyncListenerFn { func }
}

impl<F> Listener for SyncListenerFn<F>
where
    F: Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &mut Context) -> Result<(), BoxError> {
        (self.func)(ctx)
    }
}
